//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/scrape?url=<seed>` | Crawl from a seed and ingest new plans |
//! | `POST` | `/documents` | Embed and index caller-supplied documents |
//! | `POST` | `/query` | Answer a request with `choose` or `generate` |
//! | `POST` | `/donate-plan` | Archive and index a user-supplied plan |
//! | `POST` | `/plan-to-pdf` | Render a plan to PDF and return its URI |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid argument: unsupported method: summarize" } }
//! ```
//!
//! Error codes: `bad_request` (400), `upstream_error` (500).
//!
//! Requests are independent. There is no cross-request lock around
//! crawling, so two overlapping `/scrape` calls may ingest the same page
//! twice.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use plan_rag_core::donate::DonatePlanRequest;
use plan_rag_core::models::{Answer, Plan};
use plan_rag_core::store::AddDocumentsRequest;
use plan_rag_core::RagError;

use crate::app::App;
use crate::config::Config;
use crate::export::export_plan;

/// Starts the HTTP server on `[server].bind`. Runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = Arc::new(App::from_config(config).await?);
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(app)).await?;

    Ok(())
}

/// Build the route table around an assembled [`App`].
pub fn router(app: Arc<App>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/scrape", post(handle_scrape))
        .route("/documents", post(handle_add_documents))
        .route("/query", post(handle_query))
        .route("/donate-plan", post(handle_donate))
        .route("/plan-to-pdf", post(handle_plan_to_pdf))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn upstream_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "upstream_error".to_string(),
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Validation(_) => bad_request(err.to_string()),
            RagError::Upstream { .. } | RagError::SchemaMismatch(_) => {
                tracing::error!(error = %err, "request failed");
                upstream_error(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /scrape ============

#[derive(Deserialize)]
struct ScrapeParams {
    url: Option<String>,
}

#[derive(Serialize)]
struct IdsResponse {
    status: String,
    ids: Vec<String>,
}

async fn handle_scrape(
    State(app): State<Arc<App>>,
    params: Result<Query<ScrapeParams>, QueryRejection>,
) -> Result<Json<IdsResponse>, AppError> {
    let Query(params) = params?;
    let seed = params
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| bad_request("missing url parameter"))?;

    let report = app.ingest.ingest_seed(&seed).await?;
    Ok(Json(IdsResponse {
        status: "ok".to_string(),
        ids: report.ids,
    }))
}

// ============ POST /documents ============

async fn handle_add_documents(
    State(app): State<Arc<App>>,
    payload: Result<Json<AddDocumentsRequest>, JsonRejection>,
) -> Result<Json<IdsResponse>, AppError> {
    let Json(req) = payload?;
    let ids = app.store.add(req.documents).await?;
    tracing::info!(count = ids.len(), "documents added");
    Ok(Json(IdsResponse {
        status: "ok".to_string(),
        ids,
    }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    content: String,
    #[serde(default)]
    filter: HashMap<String, serde_json::Value>,
    method: String,
}

/// Filter values may be any JSON scalar; they are compared as strings.
fn filter_strings(
    filter: HashMap<String, serde_json::Value>,
) -> Result<HashMap<String, String>, AppError> {
    filter
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(bad_request(format!(
                        "filter value for '{}' must be a scalar, got {}",
                        key, other
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}

async fn handle_query(
    State(app): State<Arc<App>>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let Json(request) = body?;
    let filter = filter_strings(request.filter)?;
    let answer = app
        .router
        .query(&request.content, &filter, &request.method)
        .await?;
    Ok(Json(answer))
}

// ============ POST /donate-plan ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DonateResponse {
    status: String,
    plan_id: String,
    ids: Vec<String>,
}

async fn handle_donate(
    State(app): State<Arc<App>>,
    body: Result<Json<DonatePlanRequest>, JsonRejection>,
) -> Result<Json<DonateResponse>, AppError> {
    let Json(request) = body?;
    let receipt = app.donations.donate(request).await?;
    Ok(Json(DonateResponse {
        status: "ok".to_string(),
        plan_id: receipt.plan_id,
        ids: receipt.ids,
    }))
}

// ============ POST /plan-to-pdf ============

#[derive(Serialize)]
struct PdfResponse {
    uri: String,
}

async fn handle_plan_to_pdf(
    State(app): State<Arc<App>>,
    body: Result<Json<Plan>, JsonRejection>,
) -> Result<Json<PdfResponse>, AppError> {
    let Json(plan) = body?;
    let uri = export_plan(app.renderer.as_ref(), app.uploader.as_ref(), &plan)
        .await
        .map_err(|e| upstream_error(format!("{:#}", e)))?;
    Ok(Json(PdfResponse { uri }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_strings() {
        let mut filter = HashMap::new();
        filter.insert("difficulty".to_string(), json!("beginner"));
        filter.insert("duration_minutes".to_string(), json!(45));
        filter.insert("for_competition".to_string(), json!(false));
        let out = filter_strings(filter).unwrap();
        assert_eq!(out["difficulty"], "beginner");
        assert_eq!(out["duration_minutes"], "45");
        assert_eq!(out["for_competition"], "false");

        let mut bad = HashMap::new();
        bad.insert("tags".to_string(), json!(["a"]));
        assert!(filter_strings(bad).is_err());
    }

    #[test]
    fn test_rag_error_mapping() {
        let e: AppError = RagError::validation("unsupported method: x").into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "bad_request");

        let e: AppError = RagError::upstream_msg("similarity search", "down").into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.code, "upstream_error");
        assert_eq!(e.message, "similarity search: down");
    }
}
