//! Hermes-style tool call parser.
//!
//! Parses tool calls in the format: `<tool_call>{"name": "...", "arguments": {...}}</tool_call>`
//!
//! Also handles:
//! - `parameters` as alias for `arguments` (Llama)
//! - Case-insensitive tags and tags with attributes
//! - Common typos (<toolcall>, <tool-call>, <tool_calls>)
//! - Unclosed tags
//! - ```json fenced blocks and bare JSON objects in prose

use lazy_static::lazy_static;
use regex::Regex;

use super::common::{extract_tool_call_by_regex, tool_call_from_json};
use super::json_fixer::{
    extract_balanced_json_braces, find_json_objects_in_content, parse_json_lenient,
};
use crate::protocol::ParsedToolCall;

lazy_static! {
    static ref TAGGED_RE: Regex = Regex::new(
        r"(?si)<\s*(tool_call|toolcall|tool-call|tool_calls)\s*[^>]*>\s*(.*?)\s*</\s*(tool_call|toolcall|tool-call|tool_calls)\s*>"
    )
    .expect("static regex");
    static ref UNCLOSED_RE: Regex =
        Regex::new(r"(?si)<\s*(tool_call|toolcall|tool-call|tool_calls)\s*[^>]*>\s*(\{.*)")
            .expect("static regex");
    static ref FENCED_RE: Regex =
        Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("static regex");
}

/// Parse Hermes-style tool calls, falling back to fenced and bare JSON.
pub fn parse_hermes_tool_calls(content: &str) -> Vec<ParsedToolCall> {
    let mut calls = Vec::new();

    for cap in TAGGED_RE.captures_iter(content) {
        let Some(json_match) = cap.get(2) else {
            continue;
        };
        // Strip stray `>` or `/` left by malformed closing tags
        let json_str = json_match
            .as_str()
            .trim()
            .trim_end_matches(|c: char| c == '>' || c == '/');
        let raw = cap.get(0).map(|m| m.as_str()).unwrap_or_default();

        if let Some(call) = parse_json_lenient(json_str).and_then(|v| tool_call_from_json(&v, raw)) {
            calls.push(call);
        }
    }

    if calls.is_empty() {
        if let Some(json_str) = UNCLOSED_RE
            .captures(content)
            .and_then(|cap| cap.get(2))
            .map(|m| m.as_str().trim())
        {
            if let Some(balanced) = extract_balanced_json_braces(json_str) {
                if let Some(call) =
                    parse_json_lenient(&balanced).and_then(|v| tool_call_from_json(&v, &balanced))
                {
                    calls.push(call);
                }
            }
        }
    }

    if calls.is_empty() {
        for cap in FENCED_RE.captures_iter(content) {
            if let Some(block) = cap.get(1) {
                if let Some(call) = parse_json_lenient(block.as_str())
                    .and_then(|v| tool_call_from_json(&v, block.as_str()))
                {
                    calls.push(call);
                }
            }
        }
    }

    if calls.is_empty() {
        for json_str in find_json_objects_in_content(content) {
            if let Some(call) = parse_json_lenient(&json_str).and_then(|v| tool_call_from_json(&v, &json_str)) {
                calls.push(call);
            }
        }
    }

    if calls.is_empty() {
        if let Some(call) = extract_tool_call_by_regex(content) {
            calls.push(call);
        }
    }

    calls
}
