//! Document store: embedding plus vector index.
//!
//! The [`VectorStore`] trait is the pluggable index backend (SQLite,
//! in-memory). [`DocumentStore`] composes it with an [`Embedder`] and
//! exposes the two operations the pipeline needs:
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](DocumentStore::upsert) | Embed and insert documents, returning new ids |
//! | [`add`](DocumentStore::add) | Validate caller-supplied documents, then upsert |
//! | [`similarity_search`](DocumentStore::similarity_search) | Embed a query and return the k nearest matching documents |
//!
//! Upserts are not idempotent on content: submitting the same text twice
//! stores two entries. Duplicate suppression happens upstream in the URL
//! ledger.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::error::{RagError, UpstreamContext};
use crate::models::Document;

/// Equality predicates over metadata keys. Empty means unrestricted.
pub type MetadataFilter = HashMap<String, String>;

/// Body of a direct document insert: `{"documents": [{"text", "metadata"}]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddDocumentsRequest {
    pub documents: Vec<Document>,
}

/// A document with its id and embedding, ready to be indexed.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub document: Document,
    pub vector: Vec<f32>,
}

/// A search hit. Higher `score` is closer.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub id: String,
    pub document: Document,
    pub score: f64,
}

/// Abstract vector index.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert records. Ids are unique and chosen by the caller.
    async fn insert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Return up to `k` records whose metadata matches `filter`, ordered by
    /// cosine similarity to `query_vec` (best first).
    async fn search(
        &self,
        query_vec: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredDocument>>;
}

/// Embedding-aware document store used by ingestion and querying.
#[derive(Clone)]
pub struct DocumentStore {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorStore>,
}

impl DocumentStore {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorStore>) -> Self {
        Self { embedder, index }
    }

    /// Embed each document's text and insert it with a fresh UUID.
    pub async fn upsert(&self, documents: Vec<Document>) -> crate::Result<Vec<String>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await.upstream("embed documents")?;
        if vectors.len() != documents.len() {
            return Err(RagError::upstream_msg(
                "embed documents",
                format!(
                    "embedder returned {} vectors for {} documents",
                    vectors.len(),
                    documents.len()
                ),
            ));
        }

        let records: Vec<VectorRecord> = documents
            .into_iter()
            .zip(vectors)
            .map(|(document, vector)| VectorRecord {
                id: Uuid::new_v4().to_string(),
                document,
                vector,
            })
            .collect();

        self.index.insert(&records).await.upstream("store documents")?;
        tracing::debug!(count = records.len(), "documents upserted");

        Ok(records.into_iter().map(|r| r.id).collect())
    }

    /// Insert caller-supplied documents. Every document needs non-blank
    /// text; metadata is stored as given, extra keys included.
    pub async fn add(&self, documents: Vec<Document>) -> crate::Result<Vec<String>> {
        if let Some(pos) = documents.iter().position(|d| d.text.trim().is_empty()) {
            return Err(RagError::validation(format!(
                "documents[{}].text is required",
                pos
            )));
        }
        self.upsert(documents).await
    }

    /// Embed `query` and return the `k` nearest documents satisfying `filter`.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: &MetadataFilter,
    ) -> crate::Result<Vec<ScoredDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut vectors = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .upstream("embed query")?;
        let query_vec = vectors
            .pop()
            .ok_or_else(|| RagError::upstream_msg("embed query", "empty embedding response"))?;

        self.index
            .search(&query_vec, k, filter)
            .await
            .upstream("similarity search")
    }
}
