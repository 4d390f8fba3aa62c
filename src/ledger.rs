//! SQLite-backed [`UrlLedger`].

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashSet;

use plan_rag_core::ledger::UrlLedger;

pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UrlLedger for SqliteLedger {
    async fn contains(&self, url: &str) -> Result<bool> {
        let found: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM urls WHERE url = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    /// One transaction per batch; a failed insert rolls back the lot.
    async fn append_batch(&self, urls: &[String]) -> Result<()> {
        if urls.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for url in urls {
            sqlx::query("INSERT INTO urls (url, created_at) VALUES (?, ?) ON CONFLICT(url) DO NOTHING")
                .bind(url)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn visited(&self) -> Result<HashSet<String>> {
        let urls: Vec<String> = sqlx::query_scalar("SELECT url FROM urls")
            .fetch_all(&self.pool)
            .await?;
        Ok(urls.into_iter().collect())
    }
}
