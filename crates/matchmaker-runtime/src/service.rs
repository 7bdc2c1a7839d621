//! Id-based entry point over every match mode.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use matchmaker_core::{Profile, StructuredResult};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::client::ModelClient;
use crate::config::RuntimeConfig;
use crate::modes::{ConversationResult, FreeTextMatcher, MvpResult, MODE_AGENT_V2, MODE_MVP};
use crate::orchestrator::{MatchError, MatchOrchestrator, MatchResult, MODE_MULTI_AGENT_V2};
use crate::store::{ProfileStore, StoreError};
use crate::structured::StructuredCaller;
use crate::summary::{ProfileSummarizer, ProfileSummary};

/// How a pair is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchMode {
    #[serde(rename = "MVP")]
    Mvp,
    #[serde(rename = "AGENT_V2")]
    AgentV2,
    #[default]
    #[serde(rename = "MULTI_AGENT_V2")]
    MultiAgentV2,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Mvp => MODE_MVP,
            MatchMode::AgentV2 => MODE_AGENT_V2,
            MatchMode::MultiAgentV2 => MODE_MULTI_AGENT_V2,
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "MVP" => Ok(MatchMode::Mvp),
            "AGENT_V2" | "AGENTS" | "CONVERSATION" => Ok(MatchMode::AgentV2),
            "MULTI_AGENT_V2" | "MULTI_AGENT" | "MULTI" => Ok(MatchMode::MultiAgentV2),
            other => Err(format!(
                "unknown match mode '{}' (expected MVP, AGENT_V2 or MULTI_AGENT_V2)",
                other
            )),
        }
    }
}

/// Result of [`MatchService::match_by_ids`], one shape per mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MatchOutcome {
    Mvp(MvpResult),
    Conversation(ConversationResult),
    MultiAgent(Box<MatchResult>),
}

impl MatchOutcome {
    pub fn mode(&self) -> MatchMode {
        match self {
            MatchOutcome::Mvp(_) => MatchMode::Mvp,
            MatchOutcome::Conversation(_) => MatchMode::AgentV2,
            MatchOutcome::MultiAgent(_) => MatchMode::MultiAgentV2,
        }
    }
}

/// Resolves ids through a [`ProfileStore`] and runs the requested mode.
pub struct MatchService {
    store: Arc<dyn ProfileStore>,
    orchestrator: MatchOrchestrator,
    free_text: FreeTextMatcher,
}

impl MatchService {
    /// Wire every mode to one shared client.
    pub fn new(client: ModelClient, store: Arc<dyn ProfileStore>, config: RuntimeConfig) -> Self {
        let caller = StructuredCaller::new(client.clone());
        let summarizer = ProfileSummarizer::new(caller.clone(), &config);
        let free_text = FreeTextMatcher::new(client, summarizer, config.clone());
        let orchestrator = MatchOrchestrator::new(caller, config);

        Self {
            store,
            orchestrator,
            free_text,
        }
    }

    /// Use a custom orchestrator for the multi-agent mode.
    pub fn with_orchestrator(mut self, orchestrator: MatchOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn orchestrator(&self) -> &MatchOrchestrator {
        &self.orchestrator
    }

    pub async fn match_by_ids(
        &self,
        a_id: &str,
        b_id: &str,
        mode: MatchMode,
    ) -> Result<MatchOutcome, MatchError> {
        self.match_by_ids_with_cancel(a_id, b_id, mode, &CancellationToken::new())
            .await
    }

    /// Match two stored profiles.
    ///
    /// Identical ids are rejected before the store or the model is touched.
    pub async fn match_by_ids_with_cancel(
        &self,
        a_id: &str,
        b_id: &str,
        mode: MatchMode,
        cancel: &CancellationToken,
    ) -> Result<MatchOutcome, MatchError> {
        if a_id == b_id {
            return Err(MatchError::DuplicateIdentity(a_id.to_string()));
        }

        let (a, b) = self.load_pair(a_id, b_id).await?;
        tracing::info!(user_a = %a_id, user_b = %b_id, mode = %mode, "match requested");

        match mode {
            MatchMode::Mvp => self.free_text.mvp(&a, &b, cancel).await.map(MatchOutcome::Mvp),
            MatchMode::AgentV2 => self
                .free_text
                .conversation(&a, &b, cancel)
                .await
                .map(MatchOutcome::Conversation),
            MatchMode::MultiAgentV2 => self
                .orchestrator
                .match_two_users_with_cancel(&a, &b, cancel)
                .await
                .map(|r| MatchOutcome::MultiAgent(Box::new(r))),
        }
    }

    /// Run one specialist agent on two stored profiles.
    pub async fn run_agent_by_ids(
        &self,
        agent: &str,
        a_id: &str,
        b_id: &str,
    ) -> Result<StructuredResult, MatchError> {
        if a_id == b_id {
            return Err(MatchError::DuplicateIdentity(a_id.to_string()));
        }
        let (a, b) = self.load_pair(a_id, b_id).await?;
        self.orchestrator.run_specialist_agent(agent, &a, &b).await
    }

    /// Summary of a stored profile; `rebuild` skips the cache.
    pub async fn summary_by_id(&self, id: &str, rebuild: bool) -> Result<ProfileSummary, MatchError> {
        let profile = self.store.get(id).await.map_err(store_error)?;
        let summarizer = self.free_text.summarizer();
        let cancel = CancellationToken::new();

        let summary = if rebuild {
            summarizer.rebuild(&profile, &cancel).await
        } else {
            summarizer.summarize(&profile, &cancel).await
        };
        summary.map_err(|e| {
            if e.is_cancelled() {
                MatchError::Cancelled
            } else {
                MatchError::Summary(e)
            }
        })
    }

    async fn load_pair(&self, a_id: &str, b_id: &str) -> Result<(Profile, Profile), MatchError> {
        tokio::try_join!(self.store.get(a_id), self.store.get(b_id)).map_err(store_error)
    }
}

fn store_error(err: StoreError) -> MatchError {
    match err {
        StoreError::NotFound(id) => MatchError::ProfileNotFound(id),
        other => MatchError::Store(other.to_string()),
    }
}
