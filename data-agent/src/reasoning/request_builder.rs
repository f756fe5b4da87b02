//! Request body construction and response decoding for OpenAI-compatible
//! `/v1/chat/completions` endpoints (Ollama, llama.cpp server, vLLM, ...).

use serde_json::{json, Value};

use crate::error::ReasoningError;
use crate::protocol::{ChatMessage, MessageRole, OpenAITool, ParsedToolCall};
use crate::tool_parsing::{parse_json_lenient, parse_text_tool_calls};

/// Resolve the completions URL from a base URL with or without a `/v1` suffix.
pub fn chat_completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

/// Build a non-streaming chat request body.
pub fn build_chat_request_body(
    model: &str,
    temperature: f32,
    messages: &[ChatMessage],
    tools: &[OpenAITool],
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages.iter().map(message_to_wire).collect::<Vec<_>>(),
        "stream": false,
        "temperature": temperature,
    });

    if !tools.is_empty() {
        body["tools"] = json!(tools);
    }

    body
}

/// Convert a conversation message to the OpenAI wire shape.
///
/// Tool call arguments are sent as JSON-encoded strings, as the API expects.
pub fn message_to_wire(msg: &ChatMessage) -> Value {
    let mut wire = json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    });

    if msg.role == MessageRole::Assistant && !msg.tool_calls.is_empty() {
        let calls: Vec<Value> = msg
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id.clone().unwrap_or_default(),
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    }
                })
            })
            .collect();
        wire["tool_calls"] = json!(calls);
    }

    if let Some(id) = &msg.tool_call_id {
        wire["tool_call_id"] = json!(id);
    }

    wire
}

/// Decode the assistant messages of a completion response.
///
/// Native `tool_calls` win; otherwise tool calls printed in the text are
/// recovered for the names in `tool_names`. Missing call ids are generated.
pub fn parse_chat_response(
    response: &Value,
    tool_names: &[&str],
) -> Result<Vec<ChatMessage>, ReasoningError> {
    let choices = response
        .get("choices")
        .and_then(|c| c.as_array())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            ReasoningError::MalformedResponse("response has no choices".to_string())
        })?;

    let mut messages = Vec::with_capacity(choices.len());
    for choice in choices {
        let message = choice.get("message").ok_or_else(|| {
            ReasoningError::MalformedResponse("choice has no message".to_string())
        })?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        let mut tool_calls: Vec<ParsedToolCall> = message
            .get("tool_calls")
            .and_then(|c| c.as_array())
            .map(|calls| calls.iter().filter_map(native_tool_call).collect())
            .unwrap_or_default();

        if tool_calls.is_empty() {
            tool_calls = parse_text_tool_calls(&content, tool_names);
        }

        for call in tool_calls.iter_mut() {
            if call.id.as_deref().map(str::is_empty).unwrap_or(true) {
                call.id = Some(format!("call_{}", uuid::Uuid::new_v4().simple()));
            }
        }

        messages.push(ChatMessage {
            role: MessageRole::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        });
    }

    Ok(messages)
}

fn native_tool_call(call: &Value) -> Option<ParsedToolCall> {
    let function = call.get("function")?;
    let name = function.get("name")?.as_str()?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    let arguments = match function.get("arguments") {
        Some(Value::String(encoded)) if encoded.trim().is_empty() => json!({}),
        Some(Value::String(encoded)) => {
            parse_json_lenient(encoded).unwrap_or_else(|| Value::String(encoded.clone()))
        }
        Some(other) => other.clone(),
        None => json!({}),
    };

    Some(ParsedToolCall {
        id: call.get("id").and_then(|v| v.as_str()).map(|s| s.to_string()),
        name,
        arguments,
        raw: String::new(),
    })
}
