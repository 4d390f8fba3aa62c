//! In-memory [`VectorStore`] implementation for tests and local runs.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over the records that pass the filter.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;

use super::{MetadataFilter, ScoredDocument, VectorRecord, VectorStore};

/// In-memory vector index.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<Vec<VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of everything stored, in insertion order.
    pub fn records(&self) -> Vec<VectorRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| anyhow::anyhow!("vector store lock poisoned"))?;
        stored.extend_from_slice(records);
        Ok(())
    }

    async fn search(
        &self,
        query_vec: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredDocument>> {
        let stored = self
            .records
            .read()
            .map_err(|_| anyhow::anyhow!("vector store lock poisoned"))?;
        let mut hits: Vec<ScoredDocument> = stored
            .iter()
            .filter(|r| r.document.metadata.matches(filter))
            .map(|r| ScoredDocument {
                id: r.id.clone(),
                document: r.document.clone(),
                score: cosine_similarity(query_vec, &r.vector) as f64,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }
}
