//! HTTP reasoning component speaking the OpenAI chat-completions protocol.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::request_builder::{build_chat_request_body, chat_completions_url, parse_chat_response};
use super::ReasoningComponent;
use crate::error::ReasoningError;
use crate::protocol::{ChatMessage, OpenAITool};
use crate::settings::ModelSettings;

/// Longest response body excerpt kept in a `Status` error.
const ERROR_BODY_LIMIT: usize = 500;

pub struct OpenAICompatibleClient {
    http: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl OpenAICompatibleClient {
    pub fn new(settings: &ModelSettings) -> Result<Self, ReasoningError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            url: chat_completions_url(&settings.base_url),
            model: settings.model.clone(),
            temperature: settings.temperature,
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReasoningComponent for OpenAICompatibleClient {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        tools: &[OpenAITool],
    ) -> Result<Vec<ChatMessage>, ReasoningError> {
        let body = build_chat_request_body(&self.model, self.temperature, messages, tools);

        tracing::debug!(
            "[ReasoningClient] POST {} model={} messages={} tools={}",
            self.url,
            self.model,
            messages.len(),
            tools.len()
        );

        let mut request = self.http.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ReasoningError::Timeout
            } else {
                ReasoningError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ReasoningError::Timeout
            } else {
                ReasoningError::Transport(e.to_string())
            }
        })?;

        if !status.is_success() {
            let excerpt: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(ReasoningError::Status {
                code: status.as_u16(),
                body: excerpt,
            });
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| ReasoningError::MalformedResponse(e.to_string()))?;

        let tool_names: Vec<&str> = tools.iter().map(|t| t.function.name.as_str()).collect();
        let replies = parse_chat_response(&json, &tool_names)?;

        for reply in &replies {
            tracing::debug!(
                "[ReasoningClient] reply: {} chars, {} tool call(s)",
                reply.content.len(),
                reply.tool_calls.len()
            );
        }

        Ok(replies)
    }
}
