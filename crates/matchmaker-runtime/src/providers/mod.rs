//! Chat-completion providers.
//!
//! [`LlmProvider`] is the only seam through which the runtime reaches a
//! text-generation endpoint. Providers classify failures into
//! [`ProviderError`] and never retry on their own: retry belongs to the
//! structured caller.
//!
//! ## Security
//!
//! All providers hold their API key in an [`ApiCredential`], which never
//! shows the key in `Debug` or `Display` output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "openai")]
pub use openai::{OpenAiProvider, OpenAiProviderFactory};

/// Model used when neither configuration nor `OPENAI_MODEL` names one.
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";

/// Environment variable overriding the default model.
pub const MODEL_ENV: &str = "OPENAI_MODEL";

/// Errors from chat-completion providers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("authentication rejected by the provider (HTTP {status}): check the API key")]
    Auth { status: u16 },

    #[error("quota or rate limit exhausted, retry after {retry_after:?}")]
    Quota { retry_after: Option<Duration> },

    #[error("provider server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("provider returned no content")]
    EmptyResponse,

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("could not decode provider response: {0}")]
    Parse(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Map a non-success HTTP status to the error taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => ProviderError::Auth { status },
            429 => ProviderError::Quota { retry_after },
            500..=599 => ProviderError::Server {
                status,
                message: message.into(),
            },
            _ => ProviderError::Api {
                status,
                message: message.into(),
            },
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Auth { .. } => "auth",
            ProviderError::Quota { .. } => "quota",
            ProviderError::Server { .. } => "server",
            ProviderError::EmptyResponse => "empty_response",
            ProviderError::Http(_) => "http",
            ProviderError::Api { .. } => "api",
            ProviderError::Parse(_) => "parse",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::NotConfigured(_) => "not_configured",
        }
    }
}

/// Configuration for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate; provider default when unset
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: None,
            temperature: 0.7,
            timeout: Duration::from_secs(60),
        }
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    /// Token usage
    pub usage: TokenUsage,

    /// Model used
    pub model: String,

    /// Finish reason reported by the provider
    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider abstraction allows swapping LLM backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if provider is usable.
    async fn health_check(&self) -> bool;

    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Estimate tokens for a prompt.
    fn estimate_tokens(&self, text: &str) -> u32 {
        // ~4 chars per token
        (text.len() / 4) as u32
    }
}
