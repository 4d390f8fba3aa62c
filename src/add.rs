//! `prag add <file>`: index documents from a JSON file without crawling.
//!
//! The file has the same shape as the `/documents` request body:
//! `{"documents": [{"text": "...", "metadata": {"coach": "kim"}}]}`.

use anyhow::{Context, Result};
use std::path::Path;

use plan_rag_core::store::AddDocumentsRequest;

use crate::app::App;
use crate::config::Config;

pub async fn run_add(config: &Config, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let request: AddDocumentsRequest = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a documents request", file.display()))?;

    let app = App::from_config(config).await?;
    let ids = app.store.add(request.documents).await?;

    println!("added {} documents", ids.len());
    for id in &ids {
        println!("  document: {}", id);
    }
    Ok(())
}
