//! # Helpdesk Providers
//!
//! LLM access for livechat answers and reply suggestions.
//!
//! Any OpenAI-compatible endpoint (OpenAI, Groq, DeepSeek, OpenRouter, Ollama,
//! llama.cpp) is served by a single `OpenAiCompatibleClient`; only the base URL
//! and key differ. Failures come back as a typed [`LlmError`] whose kind maps
//! to a visitor-friendly fallback message.

pub mod classify;
pub mod openai_compatible;

use async_trait::async_trait;
use helpdesk_core::config::LlmConfig;
use helpdesk_core::error::Result;
use helpdesk_core::types::Message;
use std::sync::Arc;

pub use classify::{LlmError, LlmErrorKind, classify_failure};
pub use openai_compatible::OpenAiCompatibleClient;

/// A chat-completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    /// Send `messages` and return the assistant reply text.
    async fn chat(&self, messages: &[Message]) -> std::result::Result<String, LlmError>;
}

/// Create the configured client.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    Ok(Arc::new(OpenAiCompatibleClient::new(config)?))
}
