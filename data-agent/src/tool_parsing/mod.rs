//! Tool Parsing Module
//!
//! Recovers tool calls that a model printed as text instead of returning them in
//! the native `tool_calls` field. Small local models do this often.
//!
//! ## Module Structure
//! - `json_fixer`: JSON repair utilities for malformed LLM output
//! - `common`: Shared utilities (tool name extraction, argument parsing)
//! - `hermes_parser`: `<tool_call>` tags, fenced and embedded JSON
//! - `json_parser`: replies that are a bare JSON call

pub mod common;
pub mod hermes_parser;
pub mod json_fixer;
pub mod json_parser;

use crate::protocol::ParsedToolCall;

pub use hermes_parser::parse_hermes_tool_calls;
pub use json_fixer::{first_json_object, parse_json_lenient};
pub use json_parser::parse_pure_json_tool_calls;

/// Recover tool calls from assistant text.
///
/// Only calls naming one of `known_tools` are returned, so a final answer that
/// happens to contain a JSON record is not mistaken for a tool request.
pub fn parse_text_tool_calls(content: &str, known_tools: &[&str]) -> Vec<ParsedToolCall> {
    if known_tools.is_empty() || content.trim().is_empty() {
        return Vec::new();
    }

    let mut calls = parse_pure_json_tool_calls(content);
    if calls.is_empty() {
        calls = parse_hermes_tool_calls(content);
    }

    calls.retain(|call| known_tools.contains(&call.name.as_str()));
    if !calls.is_empty() {
        tracing::debug!(
            "[ToolParsing] Recovered {} text tool call(s): {:?}",
            calls.len(),
            calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
        );
    }
    calls
}
