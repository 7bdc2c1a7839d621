//! Single-shot access to the text-generation endpoint.

use std::sync::Arc;
use std::time::Duration;

use crate::providers::{
    ChatMessage, CompletionConfig, LlmProvider, ProviderError, TokenUsage, DEFAULT_MODEL,
};
use crate::usage::{LlmUsage, UsageMeter};

/// One prompt pair plus generation parameters.
///
/// Built per call and consumed by [`ModelClient::complete`].
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    /// Model override; the client's default when `None`.
    pub model: Option<String>,
}

impl PromptRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: 0.7,
            model: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Generated text with the usage it cost.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
}

/// Explicitly constructed handle to the generation endpoint.
///
/// Cheap to clone; clones share the provider and the usage meter. No retry
/// happens here.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn LlmProvider>,
    default_model: String,
    timeout: Duration,
    meter: Arc<UsageMeter>,
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("provider", &self.provider.name())
            .field("default_model", &self.default_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ModelClient {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            default_model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            meter: Arc::new(UsageMeter::new()),
        }
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Send one prompt pair and return the generated text.
    ///
    /// Blank output is an [`ProviderError::EmptyResponse`], whatever the
    /// provider itself reported.
    pub async fn complete(&self, prompt: PromptRequest) -> Result<ModelReply, ProviderError> {
        let model = prompt.model.unwrap_or_else(|| self.default_model.clone());
        let config = CompletionConfig {
            model: model.clone(),
            max_tokens: None,
            temperature: prompt.temperature,
            timeout: self.timeout,
        };
        let messages = vec![
            ChatMessage::system(prompt.system_prompt),
            ChatMessage::user(prompt.user_prompt),
        ];

        tracing::debug!(
            provider = self.provider.name(),
            model = %model,
            temperature = prompt.temperature,
            "calling model"
        );

        let response = self.provider.complete(messages, &config).await?;
        self.meter.record(&response.usage, &model);

        if response.content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        tracing::debug!(chars = response.content.len(), "model replied");

        let reply_model = if response.model.is_empty() {
            model
        } else {
            response.model
        };

        Ok(ModelReply {
            text: response.content,
            usage: response.usage,
            model: reply_model,
        })
    }

    /// Usage of every call made through this client and its clones.
    pub fn total_usage(&self) -> LlmUsage {
        self.meter.snapshot()
    }

    pub async fn health_check(&self) -> bool {
        self.provider.health_check().await
    }
}
