//! HTTP surface
//!
//! - POST /topics/:id/agent-query          - Ask the planning loop, returns `{answer}`
//! - POST /topics/:id/query-data           - Single-shot planner report (plan, SQL, rows); optional `limit`
//! - GET  /topics/:id/tables               - Uploaded tables, most recent first
//! - POST /topics/:id/upload-csv?name=...  - Ingest the raw request body
//! - GET  /health                          - Liveness

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::agentic_loop::{run_agent, AgentHandles, AgentLoopConfig};
use crate::error::StoreError;
use crate::ingest::ingest_bytes;
use crate::query_planner::{plan_and_run, PlannerError};
use crate::schema_registry::SchemaRegistry;

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub handles: AgentHandles,
    pub config: AgentLoopConfig,
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    #[serde(default)]
    pub question: String,
    /// Row ceiling for `query-data`, capped at the configured `row_limit`.
    #[serde(default)]
    pub limit: Option<u32>,
}

impl QuestionRequest {
    /// Requested ceiling clamped to `1..=configured`; absent means `configured`.
    pub fn row_limit(&self, configured: u32) -> u32 {
        let configured = configured.max(1);
        self.limit
            .map(|limit| limit.clamp(1, configured))
            .unwrap_or(configured)
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub name: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/topics/:id/agent-query", post(agent_query))
        .route("/topics/:id/query-data", post(query_data))
        .route("/topics/:id/tables", get(list_tables))
        .route(
            "/topics/:id/upload-csv",
            post(upload_csv).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("[Server] Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn store_error_response(e: &StoreError) -> Response {
    tracing::warn!("[Server] store error: {}", e);
    match e {
        StoreError::Ingest(reason) => error_response(StatusCode::BAD_REQUEST, reason.clone()),
        StoreError::Unavailable => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "table store unavailable")
        }
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, "table store error"),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn agent_query(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Json(body): Json<QuestionRequest>,
) -> Response {
    let question = body.question.trim();
    if question.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "question is required");
    }

    let answer = run_agent(&state.handles, &state.config, &topic_id, question).await;
    Json(answer).into_response()
}

async fn query_data(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Json(body): Json<QuestionRequest>,
) -> Response {
    let question = body.question.trim();
    if question.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "question is required");
    }

    let row_limit = body.row_limit(state.config.row_limit);
    match plan_and_run(&state.handles, row_limit, &topic_id, question).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            tracing::info!("[Server] query-data for '{}' failed: {:?}", topic_id, e);
            let status = match &e {
                PlannerError::NoTables => StatusCode::NOT_FOUND,
                PlannerError::Reasoning(_) => StatusCode::BAD_GATEWAY,
                PlannerError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            error_response(status, e.to_string())
        }
    }
}

async fn list_tables(State(state): State<AppState>, Path(topic_id): Path<String>) -> Response {
    let registry = SchemaRegistry::new(state.handles.store_tx.clone());
    match registry.manifests(&topic_id).await {
        Ok(tables) => Json(tables).into_response(),
        Err(e) => store_error_response(&e),
    }
}

async fn upload_csv(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "empty upload");
    }
    let file_name = params
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "upload.csv".to_string());

    match ingest_bytes(&state.handles.store_tx, &topic_id, &file_name, body.to_vec()).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => store_error_response(&e),
    }
}
