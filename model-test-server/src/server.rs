//! Model Test Server for data-agent (dev edition)
//!
//! - Serves an OpenAI-compatible `POST /v1/chat/completions`
//! - Replies come from a queue of scripted replies (text, tool call or HTTP error)
//! - Records every request for inspection (`GET /api/requests`)

use axum::{
    extract::State as AxumState,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

// -----------------------------------------------------------------------------
// Constants
// -----------------------------------------------------------------------------

pub const DEFAULT_HOST: &str = "127.0.0.1";
// Use a less common default port to reduce clashes with local services.
pub const DEFAULT_PORT: u16 = 43031;

const MAX_RECORDED_REQUESTS: usize = 500;

// -----------------------------------------------------------------------------
// CLI
// -----------------------------------------------------------------------------

#[derive(Parser, Debug, Clone)]
#[command(
    name = "model-test-server",
    about = "Scripted OpenAI-compatible chat completions server"
)]
pub struct CliArgs {
    /// Host interface to bind
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,
    /// Port to bind (0 picks a free port)
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// JSON file holding an array of scripted replies to preload
    #[arg(long, value_name = "FILE")]
    pub script: Option<PathBuf>,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            script: None,
        }
    }
}

// -----------------------------------------------------------------------------
// State
// -----------------------------------------------------------------------------

/// One queued reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptedReply {
    /// Plain assistant text.
    Text { content: String },
    /// Native tool call; `content` is optional accompanying text.
    ToolCall {
        name: String,
        #[serde(default)]
        arguments: Value,
        #[serde(default)]
        content: String,
    },
    /// Non-2xx response.
    Error { status: u16, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedRequest {
    pub received_at: String,
    pub body: Value,
}

#[derive(Debug, Default)]
pub struct SharedState {
    script: Mutex<VecDeque<ScriptedReply>>,
    requests: RwLock<Vec<RecordedRequest>>,
    call_counter: AtomicU64,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append replies to the end of the queue.
    pub async fn push_script(&self, replies: Vec<ScriptedReply>) {
        let mut script = self.script.lock().await;
        script.extend(replies);
    }

    pub async fn clear_script(&self) {
        self.script.lock().await.clear();
    }

    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }

    /// Request bodies received so far, oldest first.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    async fn record(&self, body: Value) {
        let mut requests = self.requests.write().await;
        if requests.len() >= MAX_RECORDED_REQUESTS {
            requests.drain(0..100);
        }
        requests.push(RecordedRequest {
            received_at: Utc::now().to_rfc3339(),
            body,
        });
    }

    async fn next_reply(&self, body: &Value) -> ScriptedReply {
        if let Some(reply) = self.script.lock().await.pop_front() {
            return reply;
        }
        ScriptedReply::Text {
            content: format!(
                "No scripted reply queued. Last user message: {}",
                last_user_message(body).unwrap_or_default()
            ),
        }
    }

    fn next_id(&self) -> u64 {
        self.call_counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn last_user_message(body: &Value) -> Option<String> {
    body.get("messages")?
        .as_array()?
        .iter()
        .rev()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

// -----------------------------------------------------------------------------
// HTTP
// -----------------------------------------------------------------------------

pub fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/chat/completions", post(completions_handler))
        .route("/api/script", post(script_handler).delete(clear_script_handler))
        .route("/api/requests", get(requests_handler))
        .with_state(state)
}

/// Bind `host:port` and serve in a background task. Returns the bound address.
pub async fn spawn(
    host: &str,
    port: u16,
    state: Arc<SharedState>,
) -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    let app = router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("[model-test-server] server error: {}", e);
        }
    });

    tracing::info!("[model-test-server] Listening on http://{}", actual_addr);
    Ok(actual_addr)
}

pub async fn run_with_args(args: CliArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = Arc::new(SharedState::new());

    if let Some(path) = &args.script {
        let raw = tokio::fs::read_to_string(path).await?;
        let replies: Vec<ScriptedReply> = serde_json::from_str(&raw)?;
        tracing::info!(
            "[model-test-server] Preloaded {} scripted replies from {}",
            replies.len(),
            path.display()
        );
        state.push_script(replies).await;
    }

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!(
        "[model-test-server] OpenAI-compatible endpoint: http://{}/v1/chat/completions",
        listener.local_addr()?
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn completions_handler(
    AxumState(state): AxumState<Arc<SharedState>>,
    Json(body): Json<Value>,
) -> Response {
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("scripted")
        .to_string();
    let reply = state.next_reply(&body).await;
    state.record(body).await;

    tracing::debug!("[model-test-server] completion reply: {:?}", reply);

    let id = state.next_id();
    let (message, finish_reason) = match reply {
        ScriptedReply::Text { content } => (
            json!({"role": "assistant", "content": content}),
            "stop",
        ),
        ScriptedReply::ToolCall {
            name,
            arguments,
            content,
        } => (
            json!({
                "role": "assistant",
                "content": content,
                "tool_calls": [{
                    "id": format!("call_{}", id),
                    "type": "function",
                    "function": {"name": name, "arguments": arguments.to_string()}
                }]
            }),
            "tool_calls",
        ),
        ScriptedReply::Error { status, message } => {
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (code, Json(json!({"error": {"message": message}}))).into_response();
        }
    };

    Json(json!({
        "id": format!("chatcmpl-{}", id),
        "object": "chat.completion",
        "created": Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish_reason
        }]
    }))
    .into_response()
}

async fn script_handler(
    AxumState(state): AxumState<Arc<SharedState>>,
    Json(replies): Json<Vec<ScriptedReply>>,
) -> Json<Value> {
    let count = replies.len();
    state.push_script(replies).await;
    Json(json!({"queued": count, "remaining": state.remaining().await}))
}

async fn clear_script_handler(AxumState(state): AxumState<Arc<SharedState>>) -> Json<Value> {
    state.clear_script().await;
    Json(json!({"remaining": 0}))
}

async fn requests_handler(AxumState(state): AxumState<Arc<SharedState>>) -> Json<Value> {
    let requests = state.requests().await;
    Json(json!({"requests": requests}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_reply_serde() {
        let replies: Vec<ScriptedReply> = serde_json::from_str(
            r#"[
                {"type": "text", "content": "hi"},
                {"type": "tool_call", "name": "get_schema", "arguments": {"topicId": "t"}},
                {"type": "error", "status": 503, "message": "down"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            replies[1],
            ScriptedReply::ToolCall {
                name: "get_schema".to_string(),
                arguments: json!({"topicId": "t"}),
                content: String::new(),
            }
        );
        assert_eq!(replies.len(), 3);
    }

    #[test]
    fn test_last_user_message() {
        let body = json!({"messages": [
            {"role": "system", "content": "s"},
            {"role": "user", "content": "first"},
            {"role": "assistant", "content": "a"},
            {"role": "user", "content": "second"}
        ]});
        assert_eq!(last_user_message(&body).as_deref(), Some("second"));
        assert_eq!(last_user_message(&json!({})), None);
    }

    #[tokio::test]
    async fn test_queue_order_and_default_reply() {
        let state = SharedState::new();
        state
            .push_script(vec![ScriptedReply::Text {
                content: "one".to_string(),
            }])
            .await;
        let body = json!({"messages": [{"role": "user", "content": "q"}]});
        assert_eq!(
            state.next_reply(&body).await,
            ScriptedReply::Text {
                content: "one".to_string()
            }
        );
        match state.next_reply(&body).await {
            ScriptedReply::Text { content } => assert!(content.ends_with("q")),
            other => panic!("unexpected reply {:?}", other),
        }
    }
}
