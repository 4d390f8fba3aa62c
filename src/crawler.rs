//! HTTP scraper: breadth-first, same-host crawl that turns HTML tables
//! into plans.
//!
//! For each fetched page:
//! - title: first `<h1>`, falling back to `<title>`
//! - description: first non-empty `<p>`
//! - table: first `<table>`; header columns named "sum" or "total" are
//!   dropped and rows whose first cell is "total" are skipped, since sums
//!   are recomputed from the cells
//!
//! Pages without a usable table contribute links but no plan. URLs in the
//! visited set are never fetched, except the seed itself, which is fetched
//! for its links but not emitted.

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};
use url::Url;

use plan_rag_core::models::{Cell, Plan, Row, ScrapedPlan, Table};
use plan_rag_core::scrape::Scraper;

use crate::config::ScraperConfig;

pub struct HttpScraper {
    client: reqwest::Client,
    max_pages: usize,
}

impl HttpScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            max_pages: config.max_pages,
        })
    }

    async fn fetch_html(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, url);
        }

        response
            .text()
            .await
            .context("Failed to read response body")
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn scrape(&self, visited: &HashSet<String>, seed: &str) -> Result<Vec<ScrapedPlan>> {
        let seed_url = normalize(Url::parse(seed).context("Invalid seed URL")?);
        let host = seed_url.host_str().map(str::to_string);

        let mut queue = VecDeque::from([seed_url.clone()]);
        let mut queued: HashSet<String> = HashSet::from([seed_url.to_string()]);
        let mut plans = Vec::new();
        let mut fetched = 0usize;

        while let Some(url) = queue.pop_front() {
            if fetched >= self.max_pages {
                debug!(max_pages = self.max_pages, "page limit reached");
                break;
            }
            let is_seed = url == seed_url;
            if !is_seed && visited.contains(url.as_str()) {
                continue;
            }

            fetched += 1;
            let html = match self.fetch_html(&url).await {
                Ok(html) => html,
                Err(e) if is_seed => return Err(e),
                Err(e) => {
                    warn!(url = %url, error = %e, "skipping page");
                    continue;
                }
            };

            let page = parse_page(&html, &url);
            for link in page.links {
                if link.host_str().map(str::to_string) != host {
                    continue;
                }
                if queued.insert(link.to_string()) {
                    queue.push_back(link);
                }
            }

            if let Some(plan) = page.plan {
                if !visited.contains(url.as_str()) {
                    debug!(url = %url, rows = plan.table.len(), "found plan");
                    plans.push(ScrapedPlan {
                        url: url.to_string(),
                        plan,
                    });
                }
            }
        }

        info!(seed, pages = fetched, plans = plans.len(), "scrape complete");
        Ok(plans)
    }
}

fn normalize(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

struct ParsedPage {
    plan: Option<Plan>,
    links: Vec<Url>,
}

/// `Html` is not `Send`, so all DOM work happens here, off the await points.
fn parse_page(html: &str, base: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    ParsedPage {
        plan: extract_plan(&document),
        links: extract_links(&document, base),
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    document
        .select(&sel)
        .map(element_text)
        .find(|t| !t.is_empty())
}

fn extract_plan(document: &Html) -> Option<Plan> {
    let table_el = document.select(&selector("table")?).next()?;
    let table = extract_table(table_el)?;
    let title = first_text(document, "h1")
        .or_else(|| first_text(document, "title"))
        .unwrap_or_default();
    let description = first_text(document, "p").unwrap_or_default();
    Some(Plan {
        title,
        description,
        table,
    })
}

fn is_total_label(text: &str) -> bool {
    matches!(text.to_lowercase().as_str(), "sum" | "total")
}

fn extract_table(table_el: ElementRef<'_>) -> Option<Table> {
    let tr = selector("tr")?;
    let th = selector("th")?;
    let td = selector("td")?;

    let mut dropped_columns: Vec<usize> = Vec::new();
    let mut rows = Vec::new();

    for row_el in table_el.select(&tr) {
        let headers: Vec<String> = row_el.select(&th).map(element_text).collect();
        if !headers.is_empty() && row_el.select(&td).next().is_none() {
            dropped_columns = headers
                .iter()
                .enumerate()
                .filter(|(_, h)| is_total_label(h))
                .map(|(i, _)| i)
                .collect();
            continue;
        }

        let texts: Vec<String> = row_el.select(&td).map(element_text).collect();
        if texts.iter().all(|t| t.is_empty()) {
            continue;
        }
        if texts.first().map(|t| is_total_label(t)).unwrap_or(false) {
            continue;
        }

        let cells: Vec<Cell> = texts
            .iter()
            .enumerate()
            .filter(|(i, _)| !dropped_columns.contains(i))
            .map(|(_, t)| Cell::parse(t))
            .collect();
        rows.push(Row::new(cells));
    }

    if rows.is_empty() {
        None
    } else {
        Some(Table(rows))
    }
}

fn extract_links(document: &Html, base: &Url) -> Vec<Url> {
    let Some(link_selector) = selector("a[href]") else {
        return Vec::new();
    };
    document
        .select(&link_selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
        .map(normalize)
        .collect()
}
