//! LLM provider integration

mod error;
mod ollama;
mod types;

pub use error::LlmError;
pub use ollama::{OllamaModelInfo, OllamaProvider};
pub use types::*;

use anyhow::Result;
use async_trait::async_trait;

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Send a chat completion request (non-streaming)
    ///
    /// Transport and HTTP failures should surface as [`LlmError`] inside the
    /// `anyhow::Error` so callers can downcast them.
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<LlmResponse>;
}
