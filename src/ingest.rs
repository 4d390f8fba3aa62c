//! `prag scrape <url>`: crawl a seed and ingest new plans.

use anyhow::Result;

use crate::app::App;
use crate::config::Config;

pub async fn run_scrape(config: &Config, seed: &str) -> Result<()> {
    let app = App::from_config(config).await?;
    let report = app.ingest.ingest_seed(seed).await?;

    println!("scrape {}", seed);
    println!("  documents stored: {}", report.ids.len());
    println!("  urls recorded: {}", report.urls.len());
    println!("  enriched: {}", report.enriched);
    for url in &report.urls {
        println!("  + {}", url);
    }
    println!("ok");
    Ok(())
}
