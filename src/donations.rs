//! SQLite-backed [`DonationStore`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use plan_rag_core::donate::DonationStore;
use plan_rag_core::models::{DonatedPlan, Table};

pub struct SqliteDonationStore {
    pool: SqlitePool,
}

impl SqliteDonationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All plans donated by `user_id`, oldest first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<DonatedPlan>> {
        let rows = sqlx::query(
            "SELECT plan_id, user_id, created_at, title, description, table_json \
             FROM donated_plans WHERE user_id = ? ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_plan).collect()
    }
}

fn row_to_plan(row: &sqlx::sqlite::SqliteRow) -> Result<DonatedPlan> {
    let plan_id: String = row.get("plan_id");
    let created_at: String = row.get("created_at");
    let table_json: String = row.get("table_json");
    Ok(DonatedPlan {
        user_id: row.get("user_id"),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .with_context(|| format!("Bad created_at for plan {}", plan_id))?
            .with_timezone(&Utc),
        title: row.get("title"),
        description: row.get("description"),
        table: serde_json::from_str::<Table>(&table_json)
            .with_context(|| format!("Bad table for plan {}", plan_id))?,
        plan_id,
    })
}

#[async_trait]
impl DonationStore for SqliteDonationStore {
    async fn add(&self, plan: &DonatedPlan) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO donated_plans (plan_id, user_id, created_at, title, description, table_json)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&plan.plan_id)
        .bind(&plan.user_id)
        .bind(plan.created_at.to_rfc3339())
        .bind(&plan.title)
        .bind(&plan.description)
        .bind(plan.table.to_json())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, plan_id: &str) -> Result<Option<DonatedPlan>> {
        let row = sqlx::query(
            "SELECT plan_id, user_id, created_at, title, description, table_json \
             FROM donated_plans WHERE plan_id = ?",
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_plan).transpose()
    }
}
