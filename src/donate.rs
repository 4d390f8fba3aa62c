//! `prag donate <file>`: donate a plan from a JSON file.
//!
//! The file has the same shape as the `/donate-plan` request body:
//! `{"userId": "...", "title": "...", "description": "...", "table": [...]}`
//! with `title` and `description` optional.

use anyhow::{Context, Result};
use std::path::Path;

use plan_rag_core::donate::DonatePlanRequest;

use crate::app::App;
use crate::config::Config;

pub async fn run_donate(config: &Config, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let request: DonatePlanRequest = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a donation request", file.display()))?;

    let app = App::from_config(config).await?;
    let receipt = app.donations.donate(request).await?;

    println!("donated plan {}", receipt.plan_id);
    for id in &receipt.ids {
        println!("  document: {}", id);
    }
    Ok(())
}
