//! Wiring: builds the pipelines from configuration or from explicit parts.

use anyhow::{Context, Result};
use std::sync::Arc;

use plan_rag_core::donate::{DonationService, DonationStore};
use plan_rag_core::embedding::Embedder;
use plan_rag_core::generation::Generator;
use plan_rag_core::ingest::IngestPipeline;
use plan_rag_core::ledger::UrlLedger;
use plan_rag_core::metadata::MetadataSchema;
use plan_rag_core::router::{QueryRouter, DEFAULT_TOP_K};
use plan_rag_core::scrape::Scraper;
use plan_rag_core::store::{DocumentStore, VectorStore};
use plan_rag_core::synth::MetadataSynthesizer;

use crate::config::Config;
use crate::crawler::HttpScraper;
use crate::db;
use crate::donations::SqliteDonationStore;
use crate::embedding::create_embedder;
use crate::export::{LocalUploader, PdfRenderer, PlanRenderer, PlanUploader};
use crate::generation::create_generator;
use crate::ledger::SqliteLedger;
use crate::migrate;
use crate::sqlite_store::SqliteVectorStore;

/// Every collaborator the pipelines need.
pub struct AppParts {
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub index: Arc<dyn VectorStore>,
    pub ledger: Arc<dyn UrlLedger>,
    pub scraper: Arc<dyn Scraper>,
    pub archive: Arc<dyn DonationStore>,
    pub renderer: Arc<dyn PlanRenderer>,
    pub uploader: Arc<dyn PlanUploader>,
    pub schema: MetadataSchema,
    pub top_k: usize,
    pub temperature: Option<f32>,
}

/// The assembled application shared by the HTTP server and the CLI.
pub struct App {
    pub store: DocumentStore,
    pub ingest: IngestPipeline,
    pub router: QueryRouter,
    pub donations: DonationService,
    pub renderer: Arc<dyn PlanRenderer>,
    pub uploader: Arc<dyn PlanUploader>,
}

impl App {
    pub fn from_parts(parts: AppParts) -> Self {
        let store = DocumentStore::new(parts.embedder, parts.index);
        let synthesizer = MetadataSynthesizer::new(parts.generator.clone(), parts.schema)
            .with_temperature(parts.temperature);

        Self {
            ingest: IngestPipeline::new(
                parts.scraper,
                parts.ledger,
                store.clone(),
                synthesizer.clone(),
            ),
            router: QueryRouter::new(store.clone(), parts.generator)
                .with_top_k(parts.top_k)
                .with_temperature(parts.temperature),
            donations: DonationService::new(synthesizer, parts.archive, store.clone()),
            store,
            renderer: parts.renderer,
            uploader: parts.uploader,
        }
    }

    /// Connect to SQLite, apply migrations, and build the configured providers.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await.context("Failed to apply migrations")?;

        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        if !config.generation.is_enabled() {
            tracing::warn!("generation disabled: enrichment is skipped and queries will fail");
        }
        tracing::info!(
            embedding = embedder.model_name(),
            generation = generator.model_name(),
            db = %config.db.path.display(),
            "providers ready"
        );

        Ok(Self::from_parts(AppParts {
            embedder,
            generator,
            index: Arc::new(SqliteVectorStore::new(pool.clone())),
            ledger: Arc::new(SqliteLedger::new(pool.clone())),
            scraper: Arc::new(HttpScraper::new(&config.scraper)?),
            archive: Arc::new(SqliteDonationStore::new(pool)),
            renderer: Arc::new(PdfRenderer::new()),
            uploader: Arc::new(LocalUploader::new(&config.export.dir)),
            schema: config.metadata.schema(),
            top_k: config.retrieval.top_k,
            temperature: config.generation.temperature,
        }))
    }
}

impl Default for AppParts {
    /// In-memory adapters, offline embedder, disabled generator.
    fn default() -> Self {
        use plan_rag_core::donate::InMemoryDonationStore;
        use plan_rag_core::embedding::HashEmbedder;
        use plan_rag_core::ledger::memory::InMemoryLedger;
        use plan_rag_core::store::memory::InMemoryVectorStore;

        Self {
            embedder: Arc::new(HashEmbedder::new(256)),
            generator: Arc::new(crate::generation::DisabledGenerator),
            index: Arc::new(InMemoryVectorStore::new()),
            ledger: Arc::new(InMemoryLedger::new()),
            scraper: Arc::new(NoopScraper),
            archive: Arc::new(InMemoryDonationStore::new()),
            renderer: Arc::new(PdfRenderer::new()),
            uploader: Arc::new(LocalUploader::new(std::env::temp_dir().join("plan-rag-exports"))),
            schema: MetadataSchema::default(),
            top_k: DEFAULT_TOP_K,
            temperature: None,
        }
    }
}

/// Scraper that finds nothing.
struct NoopScraper;

#[async_trait::async_trait]
impl Scraper for NoopScraper {
    async fn scrape(
        &self,
        _visited: &std::collections::HashSet<String>,
        _seed: &str,
    ) -> Result<Vec<plan_rag_core::models::ScrapedPlan>> {
        Ok(Vec::new())
    }
}
