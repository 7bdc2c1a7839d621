//! Structured calls: generate, validate, retry.
//!
//! Each call runs a small state machine:
//!
//! ```text
//! Attempting(n) --conformant--> Success
//! Attempting(n) --failure, n < max--> (sleep n * base_delay) --> Attempting(n + 1)
//! Attempting(n) --failure, n = max--> Failed
//! ```
//!
//! Provider failures and validation failures are treated the same way. The
//! backoff is linear and each call keeps its own attempt count: two calls
//! running side by side never share retry state.

use std::time::Duration;

use matchmaker_core::{ExpectedSchema, ResponseValidator, StructuredResult, ValidationError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::client::{ModelClient, PromptRequest};
use crate::providers::ProviderError;
use crate::usage::LlmUsage;

/// Attempts per call when nothing else is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Backoff unit when nothing else is configured.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Why a single attempt failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttemptError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Terminal failure of a structured call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructuredCallError {
    #[error("no conformant response after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: AttemptError },

    #[error("structured call cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("invalid call options: {0}")]
    InvalidOptions(String),
}

impl AttemptError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::Provider(e) => e.kind(),
            AttemptError::Validation(_) => "validation",
        }
    }
}

impl StructuredCallError {
    pub fn attempts(&self) -> u32 {
        match self {
            StructuredCallError::Exhausted { attempts, .. }
            | StructuredCallError::Cancelled { attempts } => *attempts,
            StructuredCallError::InvalidOptions(_) => 0,
        }
    }

    /// The error of the final attempt, if the budget ran out.
    pub fn last_error(&self) -> Option<&AttemptError> {
        match self {
            StructuredCallError::Exhausted { last, .. } => Some(last),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StructuredCallError::Cancelled { .. })
    }
}

/// Per-call-site settings.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Name used in logs and as the result's producer tag.
    pub label: String,
    pub temperature: f32,
    /// Model override; the client's default when `None`.
    pub model: Option<String>,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            label: "structured".to_string(),
            temperature: 0.7,
            model: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl CallOptions {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn backoff(&self) -> LinearBackoff {
        LinearBackoff::new(self.base_delay)
    }
}

/// `n × base` after the n-th failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    base: Duration,
}

impl LinearBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.base.saturating_mul(failed_attempt)
    }

    /// Total time slept before the `attempts`-th attempt starts.
    pub fn total_before(&self, attempts: u32) -> Duration {
        (1..attempts).map(|n| self.delay_after(n)).sum()
    }
}

/// State of one structured call.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState<T> {
    Attempting(u32),
    Success { value: T, attempts: u32 },
    Failed { attempts: u32, last: AttemptError },
}

impl<T> AttemptState<T> {
    /// Transition out of `Attempting(attempt)` given its outcome.
    pub fn after(attempt: u32, max_attempts: u32, outcome: Result<T, AttemptError>) -> Self {
        match outcome {
            Ok(value) => AttemptState::Success {
                value,
                attempts: attempt,
            },
            Err(_) if attempt < max_attempts => AttemptState::Attempting(attempt + 1),
            Err(last) => AttemptState::Failed {
                attempts: attempt,
                last,
            },
        }
    }
}

/// A successful call with what it cost.
#[derive(Debug, Clone)]
pub struct StructuredOutcome<T> {
    pub value: T,
    pub attempts: u32,
    /// Usage summed over every attempt of this call.
    pub usage: LlmUsage,
}

/// Retry + validate wrapper around a [`ModelClient`].
#[derive(Debug, Clone)]
pub struct StructuredCaller {
    client: ModelClient,
}

impl StructuredCaller {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ModelClient {
        &self.client
    }

    /// Obtain a response conforming to `schema`.
    pub async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &ExpectedSchema,
        options: &CallOptions,
    ) -> Result<StructuredOutcome<StructuredResult>, StructuredCallError> {
        self.call_with_cancel(system_prompt, user_prompt, schema, options, &CancellationToken::new())
            .await
    }

    pub async fn call_with_cancel(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &ExpectedSchema,
        options: &CallOptions,
        cancel: &CancellationToken,
    ) -> Result<StructuredOutcome<StructuredResult>, StructuredCallError> {
        self.call_decoded(system_prompt, user_prompt, schema, options, cancel, Ok)
            .await
    }

    /// Like [`call_with_cancel`](Self::call_with_cancel), with a typed
    /// decoding step. A decoding failure counts as a failed attempt.
    pub async fn call_decoded<T, F>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &ExpectedSchema,
        options: &CallOptions,
        cancel: &CancellationToken,
        decode: F,
    ) -> Result<StructuredOutcome<T>, StructuredCallError>
    where
        F: Fn(StructuredResult) -> Result<T, ValidationError>,
    {
        if options.max_attempts == 0 {
            return Err(StructuredCallError::InvalidOptions(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let span = tracing::info_span!("structured_call", label = %options.label);
        self.run(system_prompt, user_prompt, schema, options, cancel, decode)
            .instrument(span)
            .await
    }

    async fn run<T, F>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &ExpectedSchema,
        options: &CallOptions,
        cancel: &CancellationToken,
        decode: F,
    ) -> Result<StructuredOutcome<T>, StructuredCallError>
    where
        F: Fn(StructuredResult) -> Result<T, ValidationError>,
    {
        let backoff = options.backoff();
        let mut usage = LlmUsage::default();
        let mut state = AttemptState::Attempting(1);

        loop {
            state = match state {
                AttemptState::Attempting(attempt) => {
                    if cancel.is_cancelled() {
                        return Err(StructuredCallError::Cancelled {
                            attempts: attempt - 1,
                        });
                    }
                    tracing::debug!(attempt, max_attempts = options.max_attempts, "attempt started");

                    let prompt = PromptRequest {
                        system_prompt: system_prompt.to_string(),
                        user_prompt: user_prompt.to_string(),
                        temperature: options.temperature,
                        model: options.model.clone(),
                    };

                    let reply = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(StructuredCallError::Cancelled { attempts: attempt });
                        }
                        reply = self.client.complete(prompt) => reply,
                    };

                    let outcome = match reply {
                        Ok(reply) => {
                            usage.add(&reply.usage, &reply.model);
                            ResponseValidator::new(schema)
                                .parse(&reply.text)
                                .map(|result| result.with_producer(options.label.clone()))
                                .and_then(&decode)
                                .map_err(AttemptError::from)
                        }
                        Err(e) => Err(AttemptError::from(e)),
                    };

                    if let Err(e) = &outcome {
                        tracing::warn!(
                            attempt,
                            max_attempts = options.max_attempts,
                            kind = e.kind(),
                            error = %e,
                            "attempt failed"
                        );
                    }

                    let next = AttemptState::after(attempt, options.max_attempts, outcome);

                    if let AttemptState::Attempting(_) = next {
                        let delay = backoff.delay_after(attempt);
                        tracing::debug!(delay_ms = delay.as_millis() as u64, "backing off");
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                return Err(StructuredCallError::Cancelled { attempts: attempt });
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }

                    next
                }
                AttemptState::Success { value, attempts } => {
                    tracing::debug!(attempts, "structured response accepted");
                    return Ok(StructuredOutcome {
                        value,
                        attempts,
                        usage,
                    });
                }
                AttemptState::Failed { attempts, last } => {
                    tracing::error!(attempts, error = %last, "attempt budget exhausted");
                    return Err(StructuredCallError::Exhausted { attempts, last });
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, TokenUsage,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    /// Plays back a fixed list of replies; repeats the last one.
    struct Script {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        last: Mutex<Option<Result<String, ProviderError>>>,
        calls: AtomicU32,
    }

    impl Script {
        fn new(replies: Vec<Result<&str, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                last: Mutex::new(None),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for Script {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.replies.lock().pop_front();
            let reply = match next {
                Some(reply) => {
                    *self.last.lock() = Some(reply.clone());
                    reply
                }
                None => self
                    .last
                    .lock()
                    .clone()
                    .unwrap_or(Err(ProviderError::EmptyResponse)),
            };
            reply.map(|content| CompletionResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 20,
                },
                model: config.model.clone(),
                stop_reason: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "script"
        }
    }

    fn caller(script: &Arc<Script>) -> StructuredCaller {
        StructuredCaller::new(ModelClient::new(script.clone()))
    }

    fn schema() -> ExpectedSchema {
        ExpectedSchema::new().number("score_x").array("notes")
    }

    const GOOD: &str = r#"{"score_x": 42, "notes": ["fine"]}"#;
    const BAD: &str = "I think they would get along!";

    #[test]
    fn test_linear_backoff() {
        let backoff = LinearBackoff::new(Duration::from_millis(1000));
        assert_eq!(backoff.delay_after(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_after(3), Duration::from_secs(3));
        assert_eq!(backoff.total_before(1), Duration::ZERO);
        assert_eq!(backoff.total_before(4), Duration::from_secs(6));
    }

    #[test]
    fn test_state_transitions() {
        let failure = || Err(AttemptError::Provider(ProviderError::EmptyResponse));

        assert_eq!(
            AttemptState::after(1, 2, Ok(7)),
            AttemptState::Success { value: 7, attempts: 1 }
        );
        assert_eq!(AttemptState::<i32>::after(1, 2, failure()), AttemptState::Attempting(2));
        assert!(matches!(
            AttemptState::<i32>::after(2, 2, failure()),
            AttemptState::Failed { attempts: 2, .. }
        ));
    }

    #[test]
    fn test_attempt_error_kind() {
        assert_eq!(AttemptError::from(ProviderError::Timeout(Duration::from_secs(60))).kind(), "timeout");
        let invalid = ValidationError::MissingField {
            field: "notes".to_string(),
        };
        assert_eq!(AttemptError::from(invalid).kind(), "validation");
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_conformant_reply_short_circuits() {
        let script = Script::new(vec![Ok(GOOD)]);
        let options = CallOptions::new("t").max_attempts(5);

        let start = Instant::now();
        let outcome = caller(&script).call("s", "u", &schema(), &options).await.unwrap();

        assert_eq!(script.calls(), 1);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.value.score("score_x"), Some(42.0));
        assert_eq!(outcome.value.producer(), Some("t"));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_malformed_reply() {
        let script = Script::new(vec![Ok(BAD), Ok(GOOD)]);
        let options = CallOptions::new("t");

        let start = Instant::now();
        let outcome = caller(&script).call("s", "u", &schema(), &options).await.unwrap();

        assert_eq!(script.calls(), 2);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.usage.llm_calls, 2);
        assert_eq!(outcome.usage.total_tokens, 240);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_provider_error() {
        let script = Script::new(vec![
            Err(ProviderError::Quota { retry_after: None }),
            Ok(GOOD),
        ]);
        let outcome = caller(&script)
            .call("s", "u", &schema(), &CallOptions::new("t"))
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.usage.llm_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_reports_attempts_and_last_error() {
        let script = Script::new(vec![Ok(BAD), Ok(BAD), Ok(r#"{"score_x": 42}"#)]);
        let options = CallOptions::new("t").max_attempts(3);

        let start = Instant::now();
        let err = caller(&script)
            .call("s", "u", &schema(), &options)
            .await
            .unwrap_err();

        assert_eq!(script.calls(), 3);
        assert_eq!(err.attempts(), 3);
        assert_eq!(
            err.last_error(),
            Some(&AttemptError::Validation(ValidationError::MissingField {
                field: "notes".to_string()
            }))
        );
        assert!(err.to_string().starts_with("no conformant response after 3 attempt(s)"));
        // 1s after the first failure, 2s after the second
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_budget() {
        for max in 1..=4 {
            let script = Script::new(vec![Ok(BAD)]);
            let options = CallOptions::new("t").max_attempts(max);
            let err = caller(&script).call("s", "u", &schema(), &options).await.unwrap_err();
            assert_eq!(script.calls(), max);
            assert_eq!(err.attempts(), max);
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_rejected() {
        let script = Script::new(vec![Ok(GOOD)]);
        let options = CallOptions::new("t").max_attempts(0);
        let err = caller(&script).call("s", "u", &schema(), &options).await.unwrap_err();
        assert!(matches!(err, StructuredCallError::InvalidOptions(_)));
        assert_eq!(script.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_failure_is_retried() {
        let script = Script::new(vec![Ok(r#"{"score_x": 10, "notes": []}"#), Ok(GOOD)]);
        let token = CancellationToken::new();

        let outcome = caller(&script)
            .call_decoded("s", "u", &schema(), &CallOptions::new("t"), &token, |result| {
                match result.score("score_x") {
                    Some(score) if score >= 20.0 => Ok(score),
                    _ => Err(ValidationError::InvalidValue {
                        field: "score_x".to_string(),
                        message: "too low".to_string(),
                    }),
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, 42.0);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let script = Script::new(vec![Ok(BAD)]);
        let token = CancellationToken::new();
        let options = CallOptions::new("t").max_attempts(3).base_delay(Duration::from_secs(10));

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let err = caller(&script)
            .call_with_cancel("s", "u", &schema(), &options, &token)
            .await
            .unwrap_err();

        assert_eq!(err, StructuredCallError::Cancelled { attempts: 1 });
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_call() {
        let script = Script::new(vec![Ok(GOOD)]);
        let token = CancellationToken::new();
        token.cancel();

        let err = caller(&script)
            .call_with_cancel("s", "u", &schema(), &CallOptions::new("t"), &token)
            .await
            .unwrap_err();
        assert_eq!(err, StructuredCallError::Cancelled { attempts: 0 });
        assert_eq!(script.calls(), 0);
    }
}
