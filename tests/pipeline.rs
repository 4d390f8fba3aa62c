//! End-to-end pipeline tests with canned scrapers and scripted models,
//! over both the in-memory and SQLite adapters.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use plan_rag::app::{App, AppParts};
use plan_rag::db;
use plan_rag::donations::SqliteDonationStore;
use plan_rag::ledger::SqliteLedger;
use plan_rag::migrate;
use plan_rag::sqlite_store::SqliteVectorStore;
use plan_rag_core::donate::DonatePlanRequest;
use plan_rag_core::embedding::HashEmbedder;
use plan_rag_core::generation::{GenerateOptions, Generator};
use plan_rag_core::ledger::memory::InMemoryLedger;
use plan_rag_core::ledger::UrlLedger;
use plan_rag_core::metadata::MetadataValue;
use plan_rag_core::models::{Cell, Plan, Row, ScrapedPlan, Table};
use plan_rag_core::scrape::Scraper;
use plan_rag_core::store::memory::InMemoryVectorStore;
use plan_rag_core::store::{DocumentStore, MetadataFilter, ScoredDocument, VectorRecord, VectorStore};
use plan_rag_core::RagError;

// ============ Fakes ============

struct CannedScraper {
    plans: Vec<ScrapedPlan>,
}

#[async_trait]
impl Scraper for CannedScraper {
    async fn scrape(&self, _visited: &HashSet<String>, _seed: &str) -> Result<Vec<ScrapedPlan>> {
        Ok(self.plans.clone())
    }
}

/// Replies by prompt kind; `None` makes that kind of call fail.
#[derive(Default)]
struct ScriptedGenerator {
    enrich: Option<String>,
    describe: Option<String>,
    answer: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, _options: &GenerateOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = if prompt.starts_with("You classify") {
            &self.enrich
        } else if prompt.starts_with("You name and describe") {
            &self.describe
        } else {
            &self.answer
        };
        reply
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model unavailable"))
    }
}

struct CountingIndex {
    inner: InMemoryVectorStore,
    searches: AtomicUsize,
}

#[async_trait]
impl VectorStore for CountingIndex {
    async fn insert(&self, records: &[VectorRecord]) -> Result<()> {
        self.inner.insert(records).await
    }

    async fn search(&self, query_vec: &[f32], k: usize, filter: &MetadataFilter) -> Result<Vec<ScoredDocument>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.search(query_vec, k, filter).await
    }
}

/// Ledger whose writes always fail.
struct ReadOnlyLedger;

#[async_trait]
impl UrlLedger for ReadOnlyLedger {
    async fn contains(&self, _url: &str) -> Result<bool> {
        Ok(false)
    }

    async fn append_batch(&self, _urls: &[String]) -> Result<()> {
        anyhow::bail!("database is locked")
    }

    async fn visited(&self) -> Result<HashSet<String>> {
        Ok(HashSet::new())
    }
}

// ============ Fixtures ============

const PLAN1_URL: &str = "https://example.test/plan1";
const PLAN2_URL: &str = "https://example.test/plan2";

fn text(s: &str) -> Cell {
    Cell::Text(s.to_string())
}

fn num(n: f64) -> Cell {
    Cell::Number(n)
}

fn ladder() -> Plan {
    Plan {
        title: "Ladder".into(),
        description: "Build up the distance".into(),
        table: Table(vec![
            Row::new(vec![text("warm up"), num(200.0), num(100.0)]),
            Row::new(vec![text("main"), num(400.0), num(400.0), num(400.0)]),
            Row::new(vec![text("cool down"), num(100.0)]),
        ]),
    }
}

fn sprints() -> Plan {
    Plan {
        title: "Sprints".into(),
        description: "Short fast repeats".into(),
        table: Table(vec![
            Row::new(vec![text("warm up"), num(300.0)]),
            Row::new(vec![text("sprint"), num(25.0), num(25.0), num(25.0), num(25.0)]),
        ]),
    }
}

fn scraped() -> Vec<ScrapedPlan> {
    vec![
        ScrapedPlan {
            url: PLAN1_URL.into(),
            plan: ladder(),
        },
        ScrapedPlan {
            url: PLAN2_URL.into(),
            plan: sprints(),
        },
    ]
}

/// The ladder table as a model would echo it, with made-up sums.
const LADDER_REPLY: &str = r#"{
    "title": "Renamed by the model",
    "description": "ignored",
    "table": [
        {"cells": ["warm up", 200, 100], "sum": 1},
        {"cells": ["main", 400, 400, 400], "sum": 2},
        {"cells": ["cool down", 100], "sum": 3}
    ]
}"#;

const ENRICH_REPLY: &str =
    r#"{"category": "endurance", "difficulty": "Beginner", "duration_minutes": 45}"#;

struct Harness {
    app: App,
    index: Arc<InMemoryVectorStore>,
    ledger: Arc<InMemoryLedger>,
    generator: Arc<ScriptedGenerator>,
}

fn in_memory(plans: Vec<ScrapedPlan>, ledger: InMemoryLedger, generator: ScriptedGenerator) -> Harness {
    let index = Arc::new(InMemoryVectorStore::new());
    let ledger = Arc::new(ledger);
    let generator = Arc::new(generator);
    let app = App::from_parts(AppParts {
        embedder: Arc::new(HashEmbedder::new(128)),
        generator: generator.clone(),
        index: index.clone(),
        ledger: ledger.clone(),
        scraper: Arc::new(CannedScraper { plans }),
        ..AppParts::default()
    });
    Harness {
        app,
        index,
        ledger,
        generator,
    }
}

// ============ Ingestion ============

#[tokio::test]
async fn test_ingest_then_choose_returns_stored_plan_with_sums() {
    let h = in_memory(
        scraped(),
        InMemoryLedger::new(),
        ScriptedGenerator {
            enrich: Some(ENRICH_REPLY.into()),
            answer: Some(LADDER_REPLY.into()),
            ..Default::default()
        },
    );

    let report = h.app.ingest.ingest_seed(PLAN1_URL).await.unwrap();
    assert_eq!(report.ids.len(), 2);
    assert_eq!(report.urls, vec![PLAN1_URL.to_string(), PLAN2_URL.to_string()]);
    assert_eq!(report.enriched, 2);
    assert_eq!(h.index.len(), 2);
    assert_eq!(h.ledger.len(), 2);

    let record = h
        .index
        .records()
        .into_iter()
        .find(|r| r.document.metadata.get("url") == Some(&MetadataValue::from(PLAN1_URL)))
        .unwrap();
    assert_eq!(record.document.metadata.get("difficulty"), Some(&MetadataValue::from("beginner")));
    assert_eq!(record.document.metadata.get("duration_minutes"), Some(&MetadataValue::Integer(45)));
    assert_eq!(record.document.metadata.get("title"), Some(&MetadataValue::from("Ladder")));

    let answer = h
        .app
        .router
        .query("a ladder set that builds distance", &HashMap::new(), "choose")
        .await
        .unwrap();
    assert_eq!(answer.title, "Ladder");
    assert_eq!(answer.description, "Build up the distance");
    let sums: Vec<f64> = answer.table.rows().iter().map(|r| r.sum).collect();
    assert_eq!(sums, vec![300.0, 1200.0, 100.0]);
    assert_eq!(answer.total, 1600.0);

    let prompts = h.generator.prompts.lock().unwrap();
    let query_prompt = prompts.last().unwrap();
    assert!(query_prompt.contains("Request: a ladder set that builds distance"));
    assert!(query_prompt.contains("--- plan 1 ---"));
}

#[tokio::test]
async fn test_fully_visited_seed_writes_nothing() {
    let h = in_memory(
        scraped(),
        InMemoryLedger::with_urls([PLAN1_URL, PLAN2_URL]),
        ScriptedGenerator {
            enrich: Some(ENRICH_REPLY.into()),
            ..Default::default()
        },
    );

    let report = h.app.ingest.ingest_seed(PLAN1_URL).await.unwrap();
    assert!(report.ids.is_empty());
    assert!(report.urls.is_empty());
    assert!(h.index.is_empty());
    assert_eq!(h.ledger.len(), 2);
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn test_duplicate_urls_in_one_crawl_are_stored_once() {
    let mut plans = scraped();
    plans.push(ScrapedPlan {
        url: PLAN1_URL.into(),
        plan: sprints(),
    });
    let h = in_memory(plans, InMemoryLedger::new(), ScriptedGenerator::default());

    let report = h.app.ingest.ingest_seed(PLAN1_URL).await.unwrap();
    assert_eq!(report.ids.len(), 2);
    assert_eq!(h.index.len(), 2);
}

#[tokio::test]
async fn test_invalid_metadata_reply_leaves_document_untouched() {
    let h = in_memory(
        scraped(),
        InMemoryLedger::new(),
        ScriptedGenerator {
            enrich: Some("I think this is an endurance plan".into()),
            ..Default::default()
        },
    );

    let report = h.app.ingest.ingest_seed(PLAN1_URL).await.unwrap();
    assert_eq!(report.ids.len(), 2);
    assert_eq!(report.enriched, 0);

    for record in h.index.records() {
        let keys: Vec<&String> = record.document.metadata.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["description", "table", "title", "url"]);
    }
}

#[tokio::test]
async fn test_enrichment_never_renames_plans() {
    let h = in_memory(
        scraped(),
        InMemoryLedger::new(),
        ScriptedGenerator {
            enrich: Some(
                r#"{"category": "sprint", "difficulty": "advanced", "title": "Hijacked"}"#.into(),
            ),
            ..Default::default()
        },
    );

    h.app.ingest.ingest_seed(PLAN1_URL).await.unwrap();
    let titles: HashSet<String> = h
        .index
        .records()
        .iter()
        .filter_map(|r| r.document.metadata.get("title").and_then(|v| v.as_text()).map(str::to_string))
        .collect();
    assert_eq!(titles, HashSet::from(["Ladder".to_string(), "Sprints".to_string()]));
}

#[tokio::test]
async fn test_ledger_failure_after_upsert_is_upstream_error() {
    let index = Arc::new(InMemoryVectorStore::new());
    let app = App::from_parts(AppParts {
        index: index.clone(),
        ledger: Arc::new(ReadOnlyLedger),
        scraper: Arc::new(CannedScraper { plans: scraped() }),
        ..AppParts::default()
    });

    let err = app.ingest.ingest_seed(PLAN1_URL).await.unwrap_err();
    assert!(matches!(err, RagError::Upstream { .. }));
    assert!(err.to_string().contains("2 documents already stored"), "{}", err);
    assert!(err.to_string().contains("database is locked"));
    assert_eq!(index.len(), 2);
}

#[tokio::test]
async fn test_invalid_seed_is_rejected_before_crawling() {
    let h = in_memory(scraped(), InMemoryLedger::new(), ScriptedGenerator::default());
    let err = h.app.ingest.ingest_seed("example.test/plan1").await.unwrap_err();
    assert!(err.is_validation());
    assert!(h.index.is_empty());
}

// ============ Querying ============

#[tokio::test]
async fn test_unknown_method_touches_nothing() {
    let index = Arc::new(CountingIndex {
        inner: InMemoryVectorStore::new(),
        searches: AtomicUsize::new(0),
    });
    let generator = Arc::new(ScriptedGenerator {
        answer: Some(LADDER_REPLY.into()),
        ..Default::default()
    });
    let app = App::from_parts(AppParts {
        generator: generator.clone(),
        index: index.clone(),
        ..AppParts::default()
    });

    let err = app
        .router
        .query("anything", &HashMap::new(), "summarize")
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.to_string(), "invalid argument: unsupported method: summarize");
    assert_eq!(index.searches.load(Ordering::SeqCst), 0);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_choose_with_empty_store_skips_model() {
    let h = in_memory(
        Vec::new(),
        InMemoryLedger::new(),
        ScriptedGenerator {
            answer: Some(LADDER_REPLY.into()),
            ..Default::default()
        },
    );
    let err = h
        .app
        .router
        .query("ladder", &HashMap::new(), "choose")
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Upstream { .. }));
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn test_choose_rejects_table_not_in_context() {
    let h = in_memory(
        scraped(),
        InMemoryLedger::new(),
        ScriptedGenerator {
            answer: Some(r#"{"title": "x", "description": "y", "table": [{"cells": [1, 2]}]}"#.into()),
            ..Default::default()
        },
    );
    h.app.ingest.ingest_seed(PLAN1_URL).await.unwrap();
    let err = h
        .app
        .router
        .query("ladder", &HashMap::new(), "choose")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does not match"));
}

#[tokio::test]
async fn test_generate_recomputes_sums() {
    let h = in_memory(
        Vec::new(),
        InMemoryLedger::new(),
        ScriptedGenerator {
            answer: Some(
                r#"```json
{"title": "Pyramid", "description": "Up and down", "table": [
    {"cells": ["up", 100, 200], "sum": 0},
    {"cells": ["down", 200, 100], "sum": 0}
]}
```"#
                    .into(),
            ),
            ..Default::default()
        },
    );
    let answer = h
        .app
        .router
        .query("a pyramid", &HashMap::new(), "generate")
        .await
        .unwrap();
    assert_eq!(answer.title, "Pyramid");
    assert_eq!(answer.total, 600.0);
    assert!(answer.table.rows().iter().all(|r| r.sum == 300.0));
}

#[tokio::test]
async fn test_generate_rejects_malformed_reply() {
    let h = in_memory(
        Vec::new(),
        InMemoryLedger::new(),
        ScriptedGenerator {
            answer: Some("here is your plan!".into()),
            ..Default::default()
        },
    );
    let err = h
        .app
        .router
        .query("a pyramid", &HashMap::new(), "generate")
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Upstream { .. }));
}

// ============ SQLite adapters ============

async fn sqlite_pool(tmp: &TempDir) -> sqlx::SqlitePool {
    let pool = db::connect_path(&tmp.path().join("data/prag.sqlite")).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    pool
}

#[tokio::test]
async fn test_sqlite_ledger_append_and_contains() {
    let tmp = TempDir::new().unwrap();
    let ledger = SqliteLedger::new(sqlite_pool(&tmp).await);

    assert!(!ledger.contains(PLAN1_URL).await.unwrap());
    ledger
        .append_batch(&[PLAN1_URL.to_string(), PLAN2_URL.to_string()])
        .await
        .unwrap();
    // Re-recording is ignored.
    ledger.append_batch(&[PLAN1_URL.to_string()]).await.unwrap();
    ledger.append_batch(&[]).await.unwrap();

    assert!(ledger.contains(PLAN1_URL).await.unwrap());
    assert!(!ledger.contains("https://example.test/other").await.unwrap());
    assert_eq!(ledger.visited().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_sqlite_ledger_batch_is_all_or_nothing() {
    let tmp = TempDir::new().unwrap();
    let pool = sqlite_pool(&tmp).await;
    sqlx::query(
        "CREATE TRIGGER reject_blocked BEFORE INSERT ON urls \
         WHEN NEW.url = 'https://example.test/blocked' \
         BEGIN SELECT RAISE(ABORT, 'blocked url'); END",
    )
    .execute(&pool)
    .await
    .unwrap();
    let ledger = SqliteLedger::new(pool);

    let result = ledger
        .append_batch(&[PLAN1_URL.to_string(), "https://example.test/blocked".to_string()])
        .await;
    assert!(result.is_err());
    // The first insert succeeded before the abort but was rolled back.
    assert!(!ledger.contains(PLAN1_URL).await.unwrap());
    assert!(ledger.visited().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sqlite_filter_is_exact_equality() {
    let tmp = TempDir::new().unwrap();
    let store = DocumentStore::new(
        Arc::new(HashEmbedder::new(256)),
        Arc::new(SqliteVectorStore::new(sqlite_pool(&tmp).await)),
    );

    let mut easy = ladder().to_document();
    easy.metadata.insert("difficulty", "beginner");
    easy.metadata.insert("duration_minutes", MetadataValue::Integer(45));
    let mut hard = sprints().to_document();
    hard.metadata.insert("difficulty", "advanced");
    let ids = store.upsert(vec![easy, hard]).await.unwrap();
    assert_eq!(ids.len(), 2);

    let filter: MetadataFilter = HashMap::from([("difficulty".to_string(), "beginner".to_string())]);
    let hits = store.similarity_search("sprint repeats", 10, &filter).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, ids[0]);

    let filter: MetadataFilter = HashMap::from([("duration_minutes".to_string(), "45".to_string())]);
    assert_eq!(store.similarity_search("x", 10, &filter).await.unwrap().len(), 1);

    let filter: MetadataFilter = HashMap::from([("difficulty".to_string(), "Beginner".to_string())]);
    assert!(store.similarity_search("x", 10, &filter).await.unwrap().is_empty());

    let all = store.similarity_search("sprint repeats", 10, &HashMap::new()).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, ids[1]);
    assert!(all[0].score >= all[1].score);
}

#[tokio::test]
async fn test_sqlite_ingest_and_donate() {
    let tmp = TempDir::new().unwrap();
    let pool = sqlite_pool(&tmp).await;
    let index = Arc::new(SqliteVectorStore::new(pool.clone()));
    let archive = Arc::new(SqliteDonationStore::new(pool.clone()));
    let app = App::from_parts(AppParts {
        generator: Arc::new(ScriptedGenerator {
            enrich: Some(ENRICH_REPLY.into()),
            describe: Some(
                r#"{"title": "Model title", "description": "Model description", "metadata": {"category": "technique", "difficulty": "intermediate"}}"#
                    .into(),
            ),
            ..Default::default()
        }),
        index: index.clone(),
        ledger: Arc::new(SqliteLedger::new(pool.clone())),
        scraper: Arc::new(CannedScraper { plans: scraped() }),
        archive: archive.clone(),
        ..AppParts::default()
    });

    app.ingest.ingest_seed(PLAN1_URL).await.unwrap();
    assert_eq!(index.count().await.unwrap(), 2);
    // Second crawl finds only pages already in the ledger.
    let again = app.ingest.ingest_seed(PLAN1_URL).await.unwrap();
    assert!(again.ids.is_empty());
    assert_eq!(index.count().await.unwrap(), 2);

    let receipt = app
        .donations
        .donate(DonatePlanRequest {
            user_id: "u-7".into(),
            title: Some("My drill set".into()),
            description: None,
            table: ladder().table,
        })
        .await
        .unwrap();
    assert_eq!(receipt.ids.len(), 1);
    assert_eq!(index.count().await.unwrap(), 3);

    let archived = archive.list_for_user("u-7").await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].plan_id, receipt.plan_id);
    assert_eq!(archived[0].title, "My drill set");
    assert_eq!(archived[0].description, "Model description");

    let store = DocumentStore::new(Arc::new(HashEmbedder::new(256)), index);
    let filter: MetadataFilter = HashMap::from([("plan_id".to_string(), receipt.plan_id.clone())]);
    let hits = store.similarity_search("drill", 10, &filter).await.unwrap();
    assert_eq!(hits.len(), 1);
    let meta = &hits[0].document.metadata;
    assert_eq!(meta.get("user_id"), Some(&MetadataValue::from("u-7")));
    assert_eq!(meta.get("source"), Some(&MetadataValue::from("donation")));
    assert_eq!(meta.get("difficulty"), Some(&MetadataValue::from("intermediate")));
    assert_eq!(meta.get("title"), Some(&MetadataValue::from("My drill set")));
}
