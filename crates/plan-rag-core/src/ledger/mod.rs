//! URL ledger: the durable set of pages already ingested.
//!
//! The ledger only answers membership questions. Entries are created once,
//! after a crawl's documents have been stored, and are never updated or
//! removed.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// Durable visited-URL set.
#[async_trait]
pub trait UrlLedger: Send + Sync {
    async fn contains(&self, url: &str) -> Result<bool>;

    /// Record a batch of URLs as one unit.
    ///
    /// URLs already present are ignored. Any other failure rejects the whole
    /// batch, leaving the ledger unchanged.
    async fn append_batch(&self, urls: &[String]) -> Result<()>;

    /// Snapshot of every recorded URL.
    async fn visited(&self) -> Result<HashSet<String>>;
}
