//! Scraper capability.
//!
//! A scraper walks outward from a seed URL and returns the plans it finds.
//! The app crate ships an HTTP implementation; tests use canned ones.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

use crate::models::ScrapedPlan;

#[async_trait]
pub trait Scraper: Send + Sync {
    /// Crawl from `seed`, skipping every URL in `visited`.
    ///
    /// Returns a finite list with no URL repeated. An empty list is a valid
    /// result. Implementations neither retry nor resume.
    async fn scrape(&self, visited: &HashSet<String>, seed: &str) -> Result<Vec<ScrapedPlan>>;
}
