//! SQLite-backed [`VectorStore`] implementation.
//!
//! Vectors are stored as little-endian f32 BLOBs next to the document text
//! and its metadata JSON. Search is brute force: every row is decoded, the
//! metadata filter applied, and the survivors ranked by cosine similarity.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use plan_rag_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use plan_rag_core::metadata::Metadata;
use plan_rag_core::models::Document;
use plan_rag_core::store::{MetadataFilter, ScoredDocument, VectorRecord, VectorStore};

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert(&self, records: &[VectorRecord]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for record in records {
            let metadata_json = serde_json::to_string(&record.document.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO documents (id, text, metadata_json, embedding, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&record.document.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.vector))
            .bind(record.vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        query_vec: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredDocument>> {
        let rows = sqlx::query("SELECT id, text, metadata_json, embedding FROM documents")
            .fetch_all(&self.pool)
            .await?;

        let mut hits = Vec::new();
        for row in rows {
            let id: String = row.get("id");
            let metadata_json: String = row.get("metadata_json");
            let metadata: Metadata = serde_json::from_str(&metadata_json)
                .with_context(|| format!("Corrupt metadata for document {}", id))?;
            if !metadata.matches(filter) {
                continue;
            }
            let blob: Vec<u8> = row.get("embedding");
            let score = cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64;
            hits.push(ScoredDocument {
                id,
                document: Document {
                    text: row.get("text"),
                    metadata,
                },
                score,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }
}
