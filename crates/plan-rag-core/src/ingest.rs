//! Crawl-and-ingest orchestration.
//!
//! [`IngestPipeline::ingest_seed`] runs the whole ingestion path for one
//! seed URL:
//!
//! ```text
//! ledger.visited() ─► scraper.scrape(visited, seed) ─► drop visited/duplicate URLs
//!        ─► synthesizer.enrich (per plan, best-effort)
//!        ─► store.upsert(documents) ─► ledger.append_batch(urls)
//! ```
//!
//! # Consistency
//!
//! The read of the visited set and the final ledger append are not guarded
//! by any lock. Two crawls that overlap in time may both ingest the same
//! page, so ingestion is at-least-once.
//!
//! The document upsert and the ledger append are independent commits. If the
//! upsert succeeds and the append fails, the documents stay in the store and
//! the error is returned; a later crawl will store those pages again. No
//! content is ever lost, but duplicates are possible.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::error::{RagError, Result, UpstreamContext};
use crate::ledger::UrlLedger;
use crate::models::{Document, META_URL};
use crate::scrape::Scraper;
use crate::store::DocumentStore;
use crate::synth::MetadataSynthesizer;

/// Outcome of a successful crawl.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// Ids of the stored documents, in crawl order.
    pub ids: Vec<String>,
    /// URLs recorded in the ledger.
    pub urls: Vec<String>,
    /// Plans whose metadata enrichment succeeded.
    pub enriched: usize,
}

pub struct IngestPipeline {
    scraper: Arc<dyn Scraper>,
    ledger: Arc<dyn UrlLedger>,
    store: DocumentStore,
    synthesizer: MetadataSynthesizer,
}

impl IngestPipeline {
    pub fn new(
        scraper: Arc<dyn Scraper>,
        ledger: Arc<dyn UrlLedger>,
        store: DocumentStore,
        synthesizer: MetadataSynthesizer,
    ) -> Self {
        Self {
            scraper,
            ledger,
            store,
            synthesizer,
        }
    }

    /// Crawl from `seed` and store every new plan found.
    ///
    /// A seed that is not an absolute http(s) URL is a validation error.
    /// When the crawl yields nothing new, neither the store nor the ledger is
    /// written.
    pub async fn ingest_seed(&self, seed: &str) -> Result<IngestReport> {
        let seed = validate_seed(seed)?;

        let visited = self.ledger.visited().await.upstream("load visited urls")?;
        let scraped = self
            .scraper
            .scrape(&visited, seed)
            .await
            .upstream("scrape")?;
        tracing::info!(seed, found = scraped.len(), visited = visited.len(), "crawl finished");

        let mut seen: HashSet<String> = HashSet::new();
        let mut urls = Vec::new();
        let mut documents: Vec<Document> = Vec::new();
        let mut enriched = 0;

        for item in scraped {
            if visited.contains(&item.url) || !seen.insert(item.url.clone()) {
                tracing::debug!(url = %item.url, "skipping already ingested url");
                continue;
            }

            let mut doc = item.plan.to_document();
            doc.metadata.insert(META_URL, item.url.clone());
            if self.synthesizer.enrich(&item.plan, &mut doc.metadata).await {
                enriched += 1;
            }

            urls.push(item.url);
            documents.push(doc);
        }

        if documents.is_empty() {
            tracing::info!(seed, "nothing new to ingest");
            return Ok(IngestReport::default());
        }

        let ids = self.store.upsert(documents).await?;

        if let Err(e) = self.ledger.append_batch(&urls).await {
            tracing::warn!(
                stored = ids.len(),
                error = %e,
                "documents stored but urls not recorded; they will be ingested again"
            );
            return Err(RagError::upstream(
                format!("record urls ({} documents already stored)", ids.len()),
                e,
            ));
        }

        tracing::info!(seed, documents = ids.len(), enriched, "ingestion committed");
        Ok(IngestReport {
            ids,
            urls,
            enriched,
        })
    }
}

/// Accept only absolute http(s) URLs with a host.
fn validate_seed(seed: &str) -> Result<&str> {
    let seed = seed.trim();
    if seed.is_empty() {
        return Err(RagError::validation("url is required"));
    }
    let parsed =
        Url::parse(seed).map_err(|e| RagError::validation(format!("invalid url {}: {}", seed, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(RagError::validation(format!(
            "invalid url {}: scheme must be http or https",
            seed
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(RagError::validation(format!("invalid url {}: missing host", seed)));
    }
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_seed() {
        assert_eq!(validate_seed(" https://example.test/plan1 ").unwrap(), "https://example.test/plan1");
        assert!(validate_seed("http://example.test").is_ok());
        assert!(validate_seed("").unwrap_err().is_validation());
        assert!(validate_seed("ftp://example.test").is_err());
        assert!(validate_seed("https://").is_err());
        assert!(validate_seed("https://exa mple.test").is_err());
        assert!(validate_seed("example.test/plan1").unwrap_err().is_validation());
    }

    #[test]
    fn test_malformed_seed_is_validation_error() {
        for seed in [
            "https://example.test:99999/",
            "http://[::1/",
            "https://exa%zzmple.test/",
            "mailto:coach@example.test",
        ] {
            let err = validate_seed(seed).unwrap_err();
            assert!(err.is_validation(), "{} -> {}", seed, err);
        }
    }
}
