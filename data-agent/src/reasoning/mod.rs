//! Reasoning component boundary.
//!
//! The loop only sees `ReasoningComponent`: hand it the conversation and the tool
//! definitions, get back one or more assistant messages, each optionally carrying
//! tool calls. Everything it returns is untrusted.

pub mod openai_client;
pub mod request_builder;

use async_trait::async_trait;

use crate::error::ReasoningError;
use crate::protocol::{ChatMessage, OpenAITool};

pub use openai_client::OpenAICompatibleClient;

#[async_trait]
pub trait ReasoningComponent: Send + Sync {
    /// One model turn. `tools` may be empty for plain completions.
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        tools: &[OpenAITool],
    ) -> Result<Vec<ChatMessage>, ReasoningError>;
}
