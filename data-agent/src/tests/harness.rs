//! Shared fixtures: a scripted reasoning component and a temporary table store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::actors::table_store_actor::{IngestReport, TableStoreActor, TableStoreMsg};
use crate::agentic_loop::{AgentHandles, AgentLoopConfig};
use crate::error::ReasoningError;
use crate::ingest::ingest_bytes;
use crate::protocol::{ChatMessage, MessageRole, OpenAITool, ParsedToolCall};
use crate::reasoning::ReasoningComponent;

pub const SALES_CSV: &str = "region,revenue,units\nNorth,100,3\nSouth,50,1\nNorth,25,2\n";

/// Replays queued replies in order and records every request it receives.
///
/// An empty queue answers with plain text, so a run that asks more often than
/// scripted still terminates.
#[derive(Default)]
pub struct ScriptedReasoner {
    replies: Mutex<VecDeque<Result<Vec<ChatMessage>, ReasoningError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    delay: Option<Duration>,
}

impl ScriptedReasoner {
    pub fn new(replies: Vec<Result<Vec<ChatMessage>, ReasoningError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ReasoningComponent for ScriptedReasoner {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        _tools: &[OpenAITool],
    ) -> Result<Vec<ChatMessage>, ReasoningError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(vec![text("Nothing more to add.")]))
    }
}

pub fn text(content: &str) -> ChatMessage {
    ChatMessage {
        role: MessageRole::Assistant,
        content: content.to_string(),
        tool_calls: Vec::new(),
        tool_call_id: None,
    }
}

pub fn tool_call(name: &str, arguments: Value) -> ChatMessage {
    ChatMessage {
        role: MessageRole::Assistant,
        content: String::new(),
        tool_calls: vec![ParsedToolCall {
            id: None,
            name: name.to_string(),
            arguments,
            raw: String::new(),
        }],
        tool_call_id: None,
    }
}

/// A running table store over a temporary SQLite file.
pub struct TestStore {
    pub tx: mpsc::Sender<TableStoreMsg>,
    _dir: TempDir,
}

impl TestStore {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let tx = TableStoreActor::start(dir.path().join("data.sqlite"))
            .await
            .unwrap();
        Self { tx, _dir: dir }
    }

    pub async fn ingest(&self, topic: &str, file_name: &str, contents: &str) -> IngestReport {
        ingest_bytes(&self.tx, topic, file_name, contents.as_bytes().to_vec())
            .await
            .unwrap()
    }

    /// Ingest `SALES_CSV` into `topic` and return the generated table name.
    pub async fn ingest_sales(&self, topic: &str) -> String {
        self.ingest(topic, "sales.csv", SALES_CSV)
            .await
            .table
            .unwrap()
    }

    pub fn handles(&self, reasoner: Arc<ScriptedReasoner>) -> AgentHandles {
        AgentHandles {
            reasoning: reasoner,
            store_tx: self.tx.clone(),
        }
    }
}

pub fn test_config() -> AgentLoopConfig {
    AgentLoopConfig {
        max_tool_calls: 8,
        timeout: Duration::from_secs(30),
        row_limit: 100,
    }
}

/// Tool-result messages of one request, in order.
pub fn tool_results(request: &[ChatMessage]) -> Vec<&ChatMessage> {
    request
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .collect()
}
