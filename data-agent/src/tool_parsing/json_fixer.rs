//! JSON repair utilities for handling malformed LLM output.
//!
//! Small models often produce JSON with common issues:
//! - Python booleans (True/False instead of true/false)
//! - Python None instead of null
//! - Trailing commas
//! - Comments
//! - Single-quoted strings and unquoted keys

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref LINE_COMMENT_RE: Regex = Regex::new(r"(?m)^\s*//.*$").expect("static regex");
    static ref BLOCK_COMMENT_RE: Regex = Regex::new(r"(?s)/\*.*?\*/").expect("static regex");
    static ref TRUE_RE: Regex = Regex::new(r"\bTrue\b").expect("static regex");
    static ref FALSE_RE: Regex = Regex::new(r"\bFalse\b").expect("static regex");
    static ref NONE_RE: Regex = Regex::new(r"\bNone\b").expect("static regex");
    static ref TRAILING_COMMA_RE: Regex = Regex::new(r",(\s*[}\]])").expect("static regex");
}

/// Repair common JSON issues from LLMs.
pub fn repair_malformed_json(json_str: &str) -> String {
    let result = json_str
        .trim_start_matches('\u{feff}')
        .trim_start_matches('\u{fffe}')
        .to_string();

    let result = LINE_COMMENT_RE.replace_all(&result, "");
    let result = BLOCK_COMMENT_RE.replace_all(&result, "");
    let result = TRUE_RE.replace_all(&result, "true");
    let result = FALSE_RE.replace_all(&result, "false");
    let result = NONE_RE.replace_all(&result, "null");
    let result = TRAILING_COMMA_RE.replace_all(&result, "$1");

    result.into_owned()
}

/// Parse JSON with lenient fallbacks.
///
/// Fallback chain:
/// 1. Direct serde_json parse
/// 2. `repair_malformed_json` + serde_json
/// 3. Single quote replacement + serde_json
/// 4. json5 (unquoted keys, single quotes)
/// 5. Balanced brace extraction + retry
pub fn parse_json_lenient(raw: &str) -> Option<Value> {
    if let Ok(val) = serde_json::from_str::<Value>(raw) {
        return Some(unwrap_json_structure(val));
    }

    let fixed = repair_malformed_json(raw);
    if let Ok(val) = serde_json::from_str::<Value>(&fixed) {
        return Some(unwrap_json_structure(val));
    }

    let single_to_double = fixed.replace('\'', "\"");
    if let Ok(val) = serde_json::from_str::<Value>(&single_to_double) {
        return Some(unwrap_json_structure(val));
    }

    if let Ok(val) = json5::from_str::<Value>(&fixed) {
        return Some(unwrap_json_structure(val));
    }

    if let Some(balanced) = extract_balanced_json_braces(raw.trim()) {
        if balanced != raw {
            let fixed_balanced = repair_malformed_json(&balanced);
            if let Ok(val) = serde_json::from_str::<Value>(&fixed_balanced) {
                return Some(unwrap_json_structure(val));
            }
            if let Ok(val) = json5::from_str::<Value>(&fixed_balanced) {
                return Some(unwrap_json_structure(val));
            }
        }
    }

    None
}

/// Unwrap structural wrappers around a tool call.
///
/// - Single-element arrays: `[{"name": ...}]` -> `{"name": ...}`
/// - Nested wrappers: `{"tool_call": {"name": ...}}` -> `{"name": ...}`
pub fn unwrap_json_structure(value: Value) -> Value {
    if let Value::Array(arr) = &value {
        if arr.len() == 1 {
            return unwrap_json_structure(arr[0].clone());
        }
    }

    if let Value::Object(map) = &value {
        let wrapper_keys = ["tool_call", "function_call", "call", "function"];
        for key in wrapper_keys {
            if let Some(inner) = map.get(key) {
                if inner.get("name").is_some() {
                    return unwrap_json_structure(inner.clone());
                }
            }
        }
    }

    value
}

/// Extract a balanced `{}` block from the start of a string.
pub fn extract_balanced_json_braces(s: &str) -> Option<String> {
    if !s.starts_with('{') {
        return None;
    }

    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(s[..=i].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// All top-level balanced `{...}` blocks in `content`, in order.
pub fn find_json_objects(content: &str) -> Vec<String> {
    let mut objects = Vec::new();
    let mut offset = 0;

    while let Some(pos) = content[offset..].find('{') {
        let start = offset + pos;
        match extract_balanced_json_braces(&content[start..]) {
            Some(block) => {
                offset = start + block.len();
                objects.push(block);
            }
            None => offset = start + 1,
        }
    }

    objects
}

/// Balanced JSON objects that look like tool calls (carry a `name`-like key).
pub fn find_json_objects_in_content(content: &str) -> Vec<String> {
    find_json_objects(content)
        .into_iter()
        .filter(|block| {
            block.contains("\"name\"")
                || block.contains("'name'")
                || block.contains("\"tool_name\"")
                || block.contains("'tool_name'")
        })
        .collect()
}

/// First JSON object in free text that parses (leniently) to an object.
pub fn first_json_object(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    find_json_objects(content)
        .iter()
        .filter_map(|block| parse_json_lenient(block))
        .find(Value::is_object)
}
