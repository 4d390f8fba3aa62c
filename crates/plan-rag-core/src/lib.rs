//! # Plan RAG Core
//!
//! Retrieval-augmented generation over tabular "plan" documents: data
//! models, metadata schema, capability traits, in-memory adapters, and the
//! ingestion, query and donation pipelines.
//!
//! This crate contains no tokio runtime, sqlx, HTTP client, or filesystem
//! I/O. Concrete model clients and storage live in the `plan-rag` crate and
//! plug in through the traits below.
//!
//! | Trait | Role |
//! |-------|------|
//! | [`embedding::Embedder`] | text → vectors |
//! | [`generation::Generator`] | prompt → reply |
//! | [`store::VectorStore`] | vector index with metadata filters |
//! | [`ledger::UrlLedger`] | visited URL set |
//! | [`scrape::Scraper`] | seed URL → plans |
//! | [`donate::DonationStore`] | donated plan archive |

pub mod answer;
pub mod donate;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod ledger;
pub mod metadata;
pub mod models;
pub mod prompts;
pub mod router;
pub mod scrape;
pub mod store;
pub mod synth;

pub use error::{RagError, Result};
