//! Pure JSON tool call parser.
//!
//! Handles replies that consist of nothing but a JSON object or array of calls,
//! which is how Llama-family models usually print tool calls when native calling
//! is not honoured.

use serde_json::Value;

use super::common::tool_call_from_json;
use super::json_fixer::parse_json_lenient;
use crate::protocol::ParsedToolCall;

/// Parse pure JSON object/array tool calls without tags.
pub fn parse_pure_json_tool_calls(content: &str) -> Vec<ParsedToolCall> {
    let trimmed = content.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return Vec::new();
    }

    let Some(value) = parse_json_lenient(trimmed) else {
        return Vec::new();
    };

    let entries: Vec<&Value> = match &value {
        Value::Array(arr) => arr.iter().collect(),
        other => vec![other],
    };

    entries
        .into_iter()
        .filter_map(|entry| tool_call_from_json(entry, trimmed))
        .collect()
}
