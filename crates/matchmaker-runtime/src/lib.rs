//! # matchmaker-runtime
//!
//! LLM-backed matching for HN MatchMaker.
//!
//! This crate makes every model call. `matchmaker-core` decides what a
//! well-formed reply looks like; this crate keeps asking until it gets one,
//! or gives up with the attempt count and the last error.
//!
//! The pieces, bottom-up:
//! - [`providers`]: the [`LlmProvider`] seam and the OpenAI chat-completions
//!   provider (feature `openai`)
//! - [`ModelClient`]: one completion, no retry, usage metered
//! - [`StructuredCaller`]: retry + validate, linear backoff, cancellable
//! - [`agents`]: the four specialist lenses
//! - [`MatchOrchestrator`]: parallel specialists, then one synthesis call
//! - [`FreeTextMatcher`] and [`ProfileSummarizer`]: the unstructured modes
//!   and the cached profile summaries they build on
//! - [`MatchService`]: id-based entry point over a [`ProfileStore`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use matchmaker_runtime::{
//!     InMemoryProfileStore, MatchMode, MatchService, ModelClient, OpenAiProvider, RuntimeConfig,
//! };
//!
//! let provider = Arc::new(OpenAiProvider::from_env()?);
//! let store = Arc::new(InMemoryProfileStore::from_file("profiles.yaml")?);
//! let service = MatchService::new(ModelClient::new(provider), store, RuntimeConfig::default());
//!
//! let outcome = service.match_by_ids("u1", "u2", MatchMode::MultiAgentV2).await?;
//! ```

pub mod agents;
pub mod client;
pub mod config;
pub mod modes;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod service;
pub mod store;
pub mod structured;
pub mod summary;
pub mod synthesizer;
pub mod usage;

pub use agents::{agent_by_name, create_agent, AgentError, SpecialistAgent};
pub use client::{ModelClient, ModelReply, PromptRequest};
pub use config::{ConfigError, RuntimeConfig};
pub use modes::{
    extract_verdict, ConversationResult, ExtractedVerdict, FreeTextLabel, FreeTextMatcher,
    MvpResult,
};
pub use orchestrator::{
    MatchError, MatchMeta, MatchOrchestrator, MatchOrchestratorBuilder, MatchResult,
    MODE_MULTI_AGENT_V2,
};
pub use providers::{
    ApiCredential, LlmProvider, ProviderError, ProviderFactory, ProviderRegistry, TokenUsage,
};
#[cfg(feature = "openai")]
pub use providers::{OpenAiProvider, OpenAiProviderFactory};
pub use service::{MatchMode, MatchOutcome, MatchService};
pub use store::{InMemoryProfileStore, ProfileStore, StoreError};
pub use structured::{
    AttemptError, CallOptions, LinearBackoff, StructuredCallError, StructuredCaller,
    StructuredOutcome,
};
pub use summary::{ProfileSummarizer, ProfileSummary};
pub use synthesizer::Synthesizer;
pub use usage::LlmUsage;
