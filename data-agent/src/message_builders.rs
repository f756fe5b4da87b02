//! Message construction utilities for the planning loop.

use crate::protocol::{ChatMessage, MessageRole, ParsedToolCall};

/// Tool call id of the schema result injected by the fallback run.
pub const PRELOADED_SCHEMA_CALL_ID: &str = "preloaded_get_schema";

pub fn system_message(content: impl Into<String>) -> ChatMessage {
    ChatMessage {
        role: MessageRole::System,
        content: content.into(),
        tool_calls: Vec::new(),
        tool_call_id: None,
    }
}

pub fn user_message(content: impl Into<String>) -> ChatMessage {
    ChatMessage {
        role: MessageRole::User,
        content: content.into(),
        tool_calls: Vec::new(),
        tool_call_id: None,
    }
}

/// Assistant message carrying exactly the tool call the loop is about to execute.
///
/// Extra calls in the same turn are dropped so every request sent back to the
/// model pairs one call with one result.
pub fn create_assistant_message_with_tool_call(content: &str, call: &ParsedToolCall) -> ChatMessage {
    ChatMessage {
        role: MessageRole::Assistant,
        content: content.to_string(),
        tool_calls: vec![call.clone()],
        tool_call_id: None,
    }
}

/// Create a tool result message associated with `tool_call_id`.
pub fn create_tool_result_message(tool_call_id: &str, content: &str) -> ChatMessage {
    ChatMessage {
        role: MessageRole::Tool,
        content: content.to_string(),
        tool_calls: Vec::new(),
        tool_call_id: Some(tool_call_id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assistant_message_keeps_single_call() {
        let call = ParsedToolCall {
            id: Some("call_1".to_string()),
            name: "get_schema".to_string(),
            arguments: json!({"topicId": "t"}),
            raw: String::new(),
        };
        let msg = create_assistant_message_with_tool_call("", &call);
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.tool_calls, vec![call]);
    }

    #[test]
    fn test_tool_result_message() {
        let msg = create_tool_result_message(PRELOADED_SCHEMA_CALL_ID, "{}");
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("preloaded_get_schema"));
    }
}
