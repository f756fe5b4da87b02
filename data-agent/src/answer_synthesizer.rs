//! Answer Synthesizer
//!
//! Reduces a finished loop run to the one string the user sees. Tool payloads,
//! plans, SQL and raw rows never pass through: they are stripped from model text
//! and the structural fallback only reports counts.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::agentic_state::Termination;
use crate::protocol::{ChatMessage, MessageRole};
use crate::tool_registry::AgentTool;

pub const NO_DATA_ANSWER: &str = "No data is available for this conversation yet, so I cannot answer from uploaded tables. \
Upload a CSV or Excel file and ask again.";

pub const BUDGET_EXHAUSTED_ANSWER: &str = "I wasn't able to finish answering within the allowed number of data lookups. \
Try asking a narrower question, for example about a single table or metric.";

pub const TIMEOUT_ANSWER: &str = "Answering took too long and was stopped. Please try again, or ask a simpler question.";

pub const FAILURE_ANSWER: &str = "Sorry, I couldn't answer that right now because the language model was unavailable. Please try again.";

pub const STORE_FAILURE_ANSWER: &str = "Sorry, I couldn't read the uploaded data right now. Please try again.";

pub const EMPTY_ANSWER: &str = "I couldn't produce an answer to that question from the uploaded data.";

lazy_static! {
    static ref TOOL_CALL_BLOCK_RE: Regex =
        Regex::new(r"(?s)<tool_call>.*?(</tool_call>|$)").expect("static regex");
    static ref THINK_BLOCK_RE: Regex = Regex::new(r"(?s)<think>.*?</think>").expect("static regex");
    static ref INTERNAL_FENCE_RE: Regex =
        Regex::new(r"(?is)```(sql|json)\b.*?(```|$)").expect("static regex");
}

/// Final user-facing text for a run that ended with `termination`.
pub fn synthesize(messages: &[ChatMessage], termination: &Termination) -> String {
    match termination {
        Termination::Answered => latest_assistant_text(messages)
            .unwrap_or_else(|| structural_summary(messages)),
        Termination::BudgetExhausted => BUDGET_EXHAUSTED_ANSWER.to_string(),
        Termination::TimedOut => TIMEOUT_ANSWER.to_string(),
        Termination::ReasoningFailed(_) => FAILURE_ANSWER.to_string(),
        Termination::StoreUnavailable => STORE_FAILURE_ANSWER.to_string(),
    }
}

/// Most recent assistant message without tool calls whose cleaned text is non-empty.
pub fn latest_assistant_text(messages: &[ChatMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .filter(|m| m.role == MessageRole::Assistant && !m.has_tool_calls())
        .map(|m| strip_internal_payloads(&m.content))
        .find(|text| !text.is_empty())
}

/// Remove tool-call tags, reasoning blocks, SQL/JSON fences and bare JSON payloads.
pub fn strip_internal_payloads(content: &str) -> String {
    let text = THINK_BLOCK_RE.replace_all(content, "");
    let text = TOOL_CALL_BLOCK_RE.replace_all(&text, "");
    let text = INTERNAL_FENCE_RE.replace_all(&text, "");
    let text = text.trim();

    let looks_like_payload = (text.starts_with('{') || text.starts_with('['))
        && serde_json::from_str::<Value>(text).is_ok();
    if looks_like_payload {
        return String::new();
    }

    text.to_string()
}

/// Describe what the run did when the model left no usable text.
fn structural_summary(messages: &[ChatMessage]) -> String {
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    for msg in messages.iter().filter(|m| m.role == MessageRole::Assistant) {
        for call in &msg.tool_calls {
            if let Some(id) = call.id.as_deref() {
                call_names.insert(id, call.name.as_str());
            }
        }
    }

    let mut tables_seen: Option<usize> = None;
    let mut last_result: Option<(String, u64)> = None;

    for msg in messages.iter().filter(|m| m.role == MessageRole::Tool) {
        let Some(name) = msg.tool_call_id.as_deref().and_then(|id| call_names.get(id)) else {
            continue;
        };
        let Ok(payload) = serde_json::from_str::<Value>(&msg.content) else {
            continue;
        };
        match AgentTool::from_name(name) {
            Some(AgentTool::GetSchema) => {
                tables_seen = payload
                    .get("schema")
                    .and_then(Value::as_array)
                    .map(|s| s.len());
            }
            Some(AgentTool::ExecuteQuery) => {
                let table = payload
                    .get("table")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let rows = payload.get("row_count").and_then(Value::as_u64).unwrap_or(0);
                last_result = Some((table, rows));
            }
            None => {}
        }
    }

    match (last_result, tables_seen) {
        (Some((table, rows)), _) => format!(
            "I ran a query against table '{}' and it returned {} row(s), but I couldn't summarize the result. \
            Please rephrase the question.",
            table, rows
        ),
        (None, Some(tables)) => format!(
            "I looked up the {} uploaded table(s) for this conversation but couldn't build a query for the question. \
            Please rephrase it using the column names of your data.",
            tables
        ),
        (None, None) => EMPTY_ANSWER.to_string(),
    }
}
