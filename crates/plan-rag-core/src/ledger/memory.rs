use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::UrlLedger;

/// In-memory [`UrlLedger`] used by tests and dry runs.
#[derive(Default)]
pub struct InMemoryLedger {
    urls: RwLock<HashSet<String>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger pre-populated with `urls`.
    pub fn with_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: RwLock::new(urls.into_iter().map(Into::into).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.urls.read().map(|u| u.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UrlLedger for InMemoryLedger {
    async fn contains(&self, url: &str) -> Result<bool> {
        let urls = self
            .urls
            .read()
            .map_err(|_| anyhow::anyhow!("ledger lock poisoned"))?;
        Ok(urls.contains(url))
    }

    async fn append_batch(&self, batch: &[String]) -> Result<()> {
        let mut urls = self
            .urls
            .write()
            .map_err(|_| anyhow::anyhow!("ledger lock poisoned"))?;
        urls.extend(batch.iter().cloned());
        Ok(())
    }

    async fn visited(&self) -> Result<HashSet<String>> {
        let urls = self
            .urls
            .read()
            .map_err(|_| anyhow::anyhow!("ledger lock poisoned"))?;
        Ok(urls.clone())
    }
}
