//! # Plan RAG
//!
//! Retrieval-augmented generation over tabular training plans.
//!
//! Plans are crawled from the web, enriched with model-generated metadata,
//! embedded, and stored in SQLite. Queries either pick the best stored plan
//! (`choose`) or have the model write a new one from the closest matches
//! (`generate`). Every table that leaves the system has its row sums
//! recomputed from the cells.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ HttpScraper  │──▶│ IngestPipeline   │──▶│   SQLite     │
//! │ (seed URL)   │   │ enrich + embed   │   │ docs + urls  │
//! └──────────────┘   └──────────────────┘   └──────┬───────┘
//!                                                  │
//!                    ┌─────────────────────────────┤
//!                    ▼                             ▼
//!              ┌──────────┐                  ┌──────────┐
//!              │   CLI    │                  │   HTTP   │
//!              │  (prag)  │                  │  (axum)  │
//!              └──────────┘                  └──────────┘
//! ```
//!
//! The pipelines themselves live in `plan-rag-core`; this crate supplies
//! configuration, storage, model clients, crawling, PDF export, and the
//! transports.
//!
//! ## Quick Start
//!
//! ```bash
//! prag init
//! prag scrape https://example.test/plans
//! prag query "easy 30 minute session" --method choose --filter difficulty=beginner
//! prag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`app`] | Pipeline wiring |
//! | [`add`] / [`donate`] / [`ingest`] / [`query`] | CLI commands |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] / [`ledger`] / [`donations`] | SQLite adapters |
//! | [`embedding`] / [`generation`] | Model providers |
//! | [`crawler`] | HTTP scraper |
//! | [`export`] | PDF rendering and upload |
//! | [`server`] | HTTP server |

pub mod add;
pub mod app;
pub mod config;
pub mod crawler;
pub mod db;
pub mod donate;
pub mod donations;
pub mod embedding;
pub mod export;
pub mod generation;
pub mod ingest;
pub mod ledger;
pub mod logging;
pub mod migrate;
pub mod query;
pub mod server;
pub mod sqlite_store;
