//! Crawls a small site served from memory.

use axum::{http::StatusCode, response::Html, routing::get, Router};
use std::collections::HashSet;

use plan_rag::config::ScraperConfig;
use plan_rag::crawler::HttpScraper;
use plan_rag_core::scrape::Scraper;

const INDEX: &str = r#"<html><body>
    <h1>All plans</h1>
    <a href="/plan1">one</a>
    <a href="/plan2">two</a>
    <a href="/missing">gone</a>
    <a href="https://elsewhere.test/plan9">external</a>
</body></html>"#;

const PLAN1: &str = r#"<html><body>
    <h1>Ladder</h1><p>Build up the distance.</p>
    <table>
      <tr><th>Part</th><th>Distance</th><th>Sum</th></tr>
      <tr><td>warm up</td><td>200</td><td>200</td></tr>
      <tr><td>main</td><td>1200</td><td>1200</td></tr>
    </table>
    <a href="/plan2">next</a>
</body></html>"#;

const PLAN2: &str = r#"<html><head><title>Sprints</title></head><body>
    <table><tr><td>sprint</td><td>25</td><td>25</td></tr></table>
    <a href="/">back</a>
</body></html>"#;

async fn serve() -> String {
    let app = Router::new()
        .route("/", get(|| async { Html(INDEX) }))
        .route("/plan1", get(|| async { Html(PLAN1) }))
        .route("/plan2", get(|| async { Html(PLAN2) }))
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn scraper(max_pages: usize) -> HttpScraper {
    HttpScraper::new(&ScraperConfig {
        max_pages,
        ..ScraperConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_crawl_finds_every_plan_once() {
    let base = serve().await;
    let plans = scraper(50)
        .scrape(&HashSet::new(), &format!("{}/", base))
        .await
        .unwrap();

    let urls: Vec<&str> = plans.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec![format!("{}/plan1", base), format!("{}/plan2", base)]);

    let ladder = &plans[0].plan;
    assert_eq!(ladder.title, "Ladder");
    assert_eq!(ladder.description, "Build up the distance.");
    assert_eq!(ladder.table.len(), 2);
    assert_eq!(ladder.table.rows()[1].sum, 1200.0);
    assert_eq!(plans[1].plan.title, "Sprints");
}

#[tokio::test]
async fn test_crawl_skips_visited_pages() {
    let base = serve().await;
    let visited = HashSet::from([format!("{}/plan1", base)]);
    let plans = scraper(50)
        .scrape(&visited, &format!("{}/", base))
        .await
        .unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].url, format!("{}/plan2", base));
}

#[tokio::test]
async fn test_visited_seed_is_followed_but_not_returned() {
    let base = serve().await;
    let seed = format!("{}/plan1", base);
    let visited = HashSet::from([seed.clone()]);
    let plans = scraper(50).scrape(&visited, &seed).await.unwrap();
    let urls: Vec<&str> = plans.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec![format!("{}/plan2", base)]);
}

#[tokio::test]
async fn test_page_limit() {
    let base = serve().await;
    let plans = scraper(1)
        .scrape(&HashSet::new(), &format!("{}/plan1", base))
        .await
        .unwrap();
    assert_eq!(plans.len(), 1);
}

#[tokio::test]
async fn test_unreachable_seed_fails() {
    let base = serve().await;
    let result = scraper(5)
        .scrape(&HashSet::new(), &format!("{}/missing", base))
        .await;
    assert!(result.is_err());
}
