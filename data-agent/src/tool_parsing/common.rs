//! Common utilities for tool call parsing.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::json_fixer::parse_json_lenient;
use crate::protocol::ParsedToolCall;

lazy_static! {
    static ref NAME_RE: Regex =
        Regex::new(r#"["']?(name|tool_name)["']?\s*:\s*["']([^"']+)["']"#).expect("static regex");
    static ref ARGS_RE: Regex =
        Regex::new(r#"["']?(arguments|parameters|tool_args)["']?\s*:\s*(\{[^{}]*\})"#)
            .expect("static regex");
}

fn plausible_name(name: &str) -> bool {
    !name.is_empty() && name.len() < 200 && !name.contains('\n')
}

/// Normalize a tool name: trim and drop namespace prefixes like `functions.`.
pub fn normalize_tool_name(name: &str) -> String {
    let trimmed = name.trim();
    trimmed
        .rsplit(|c| c == '.' || c == '/')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

/// Extract tool name from parsed JSON, supporting multiple formats:
/// - `name` (standard)
/// - `tool_name`, `function`, `tool` as string values
/// - nested `function.name`, `tool.name`, `call.name`
pub fn extract_tool_name_from_json(parsed: &Value) -> Option<String> {
    let name_fields = ["name", "tool_name", "function", "tool"];

    for field in name_fields {
        if let Some(name) = parsed.get(field).and_then(|v| v.as_str()) {
            if plausible_name(name) {
                return Some(normalize_tool_name(name));
            }
        }
    }

    let nested_paths = [("function", "name"), ("tool", "name"), ("call", "name")];
    for (outer, inner) in nested_paths {
        if let Some(name) = parsed
            .get(outer)
            .and_then(|o| o.get(inner))
            .and_then(|v| v.as_str())
        {
            if plausible_name(name) {
                return Some(normalize_tool_name(name));
            }
        }
    }

    None
}

/// Extract arguments from parsed JSON, supporting multiple formats:
/// - `arguments` (standard)
/// - `parameters` (Llama format)
/// - `tool_args`, `args`
/// - `function.arguments`
///
/// Arguments given as a JSON-encoded string are decoded when possible.
pub fn extract_tool_arguments_from_json(parsed: &Value) -> Value {
    let found = ["arguments", "parameters", "tool_args", "args"]
        .iter()
        .find_map(|key| parsed.get(*key))
        .or_else(|| parsed.get("function").and_then(|f| f.get("arguments")));

    match found {
        Some(Value::String(encoded)) => {
            parse_json_lenient(encoded).unwrap_or_else(|| Value::String(encoded.clone()))
        }
        Some(args) => args.clone(),
        None => Value::Object(serde_json::Map::new()),
    }
}

/// Build a call from a parsed JSON object, if it names a tool.
pub fn tool_call_from_json(parsed: &Value, raw: &str) -> Option<ParsedToolCall> {
    let name = extract_tool_name_from_json(parsed)?;
    Some(ParsedToolCall {
        id: parsed
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        name,
        arguments: extract_tool_arguments_from_json(parsed),
        raw: raw.to_string(),
    })
}

/// Last-resort extraction: use regex to extract tool name and arguments directly.
pub fn extract_tool_call_by_regex(content: &str) -> Option<ParsedToolCall> {
    let name_cap = NAME_RE.captures(content)?;
    let name = name_cap.get(2)?.as_str();

    if name.len() > 100 || !plausible_name(name) {
        return None;
    }

    let arguments = ARGS_RE
        .captures(content)
        .and_then(|cap| cap.get(2))
        .and_then(|m| parse_json_lenient(m.as_str()))
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    Some(ParsedToolCall {
        id: None,
        name: normalize_tool_name(name),
        arguments,
        raw: content.to_string(),
    })
}
