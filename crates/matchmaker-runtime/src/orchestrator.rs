//! Multi-agent matching: parallel specialists, then one synthesis call.
//!
//! The orchestrator implements:
//! - Fan-out to the four specialist agents via `tokio::try_join!`
//! - Fail-fast aggregation: the first agent failure fails the request and
//!   the remaining agents are dropped, never used partially
//! - Fan-in through the [`Synthesizer`], the only stage that weighs the
//!   agents against each other
//! - The verdict policy check and the result envelope

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use matchmaker_core::{
    AgentBundle, AgentKind, FieldKind, PairError, PolicyCheck, Profile, ProfilePair,
    StructuredResult, UserRef, Verdict,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::agents::{create_agent, AgentError, SpecialistAgent};
use crate::config::RuntimeConfig;
use crate::providers::ProviderError;
use crate::structured::{StructuredCallError, StructuredCaller, StructuredOutcome};
use crate::synthesizer::Synthesizer;
use crate::usage::LlmUsage;

/// Mode tag of this orchestration version.
pub const MODE_MULTI_AGENT_V2: &str = "MULTI_AGENT_V2";

/// Errors from a matching request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("a profile cannot be matched with itself: {0}")]
    DuplicateIdentity(String),

    #[error("{agent} agent failed: {source}")]
    Specialist {
        agent: AgentKind,
        #[source]
        source: StructuredCallError,
    },

    #[error("synthesis failed: {0}")]
    Synthesis(#[source] StructuredCallError),

    #[error("profile summary failed: {0}")]
    Summary(#[source] StructuredCallError),

    #[error("model call failed: {0}")]
    Model(#[source] ProviderError),

    #[error("profile store failed: {0}")]
    Store(String),

    #[error("matching cancelled")]
    Cancelled,

    #[error("unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("invalid orchestrator setup: {0}")]
    Setup(String),
}

impl MatchError {
    /// Errors caused by the request itself rather than by the model.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MatchError::ProfileNotFound(_)
                | MatchError::DuplicateIdentity(_)
                | MatchError::UnknownAgent(_)
        )
    }

    /// Attempt count of the failed structured call, if one failed.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            MatchError::Specialist { source, .. }
            | MatchError::Synthesis(source)
            | MatchError::Summary(source) => Some(source.attempts()),
            _ => None,
        }
    }
}

impl From<PairError> for MatchError {
    fn from(err: PairError) -> Self {
        match err {
            PairError::DuplicateIdentity(id) => MatchError::DuplicateIdentity(id),
        }
    }
}

impl From<AgentError> for MatchError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Failed { source, .. } if source.is_cancelled() => MatchError::Cancelled,
            AgentError::Failed { agent, source } => MatchError::Specialist { agent, source },
            AgentError::UnknownAgent(name) => MatchError::UnknownAgent(name),
        }
    }
}

impl From<StructuredCallError> for MatchError {
    fn from(err: StructuredCallError) -> Self {
        if err.is_cancelled() {
            MatchError::Cancelled
        } else {
            MatchError::Synthesis(err)
        }
    }
}

/// Timing, cost and policy of one matching request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMeta {
    /// Wall-clock time of the whole request
    pub duration_seconds: f64,

    /// Wall-clock time of the parallel agent phase
    pub agents_duration_seconds: f64,

    pub mode: String,

    /// Usage of every call, retries included
    pub llm_usage: LlmUsage,

    pub policy: PolicyCheck,
}

/// Result of a multi-agent matching request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub user_a: UserRef,
    pub user_b: UserRef,
    pub timestamp: DateTime<Utc>,
    pub agents: AgentBundle,
    pub verdict: Verdict,
    pub meta: MatchMeta,
}

/// Runs the specialists and the synthesis for a profile pair.
pub struct MatchOrchestrator {
    caller: StructuredCaller,
    config: RuntimeConfig,
    agents: BTreeMap<AgentKind, Arc<dyn SpecialistAgent>>,
    synthesizer: Synthesizer,
}

impl MatchOrchestrator {
    /// Orchestrator with the built-in agents and synthesizer.
    pub fn new(caller: StructuredCaller, config: RuntimeConfig) -> Self {
        let agents: BTreeMap<AgentKind, Arc<dyn SpecialistAgent>> = AgentKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::from(create_agent(kind))))
            .collect();

        Self {
            caller,
            config,
            agents,
            synthesizer: Synthesizer::new(),
        }
    }

    pub fn builder() -> MatchOrchestratorBuilder {
        MatchOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn caller(&self) -> &StructuredCaller {
        &self.caller
    }

    /// Compare two profiles.
    pub async fn match_two_users(&self, a: &Profile, b: &Profile) -> Result<MatchResult, MatchError> {
        self.match_two_users_with_cancel(a, b, &CancellationToken::new())
            .await
    }

    /// Compare two profiles; `cancel` aborts every in-flight call.
    pub async fn match_two_users_with_cancel(
        &self,
        a: &Profile,
        b: &Profile,
        cancel: &CancellationToken,
    ) -> Result<MatchResult, MatchError> {
        let pair = ProfilePair::new(a, b)?;
        let started = Instant::now();
        let timestamp = Utc::now();

        tracing::info!(user_a = %a.id, user_b = %b.id, "multi-agent matching started");

        let (bundle, mut usage) = self.fan_out(pair, cancel).await?;
        let agents_elapsed = started.elapsed();

        tracing::info!(
            duration_ms = agents_elapsed.as_millis() as u64,
            "specialist agents finished, synthesizing"
        );

        let synthesis = self
            .synthesizer
            .synthesize(
                &self.caller,
                pair,
                &bundle,
                &self.config.synthesis_options(),
                cancel,
            )
            .await?;
        usage.merge(&synthesis.usage);

        let mut verdict = synthesis.value;
        // present: every agent schema requires its score field as a number
        let risk_score = bundle.score(AgentKind::Risques).unwrap_or_default();
        let policy = verdict.apply_policy(risk_score, self.config.verdict_policy);

        let elapsed = started.elapsed();
        tracing::info!(
            verdict = %verdict.verdict,
            score_global = verdict.score_global,
            llm_calls = usage.llm_calls,
            duration_ms = elapsed.as_millis() as u64,
            "matching finished"
        );

        Ok(MatchResult {
            user_a: a.user_ref(),
            user_b: b.user_ref(),
            timestamp,
            agents: bundle,
            verdict,
            meta: MatchMeta {
                duration_seconds: elapsed.as_secs_f64(),
                agents_duration_seconds: agents_elapsed.as_secs_f64(),
                mode: MODE_MULTI_AGENT_V2.to_string(),
                llm_usage: usage,
                policy,
            },
        })
    }

    /// Run one specialist on its own.
    pub async fn run_specialist_agent(
        &self,
        name: &str,
        a: &Profile,
        b: &Profile,
    ) -> Result<StructuredResult, MatchError> {
        let kind = name
            .parse::<AgentKind>()
            .map_err(|_| MatchError::UnknownAgent(name.to_string()))?;
        let pair = ProfilePair::new(a, b)?;
        let outcome = self
            .run_agent(kind, pair, &CancellationToken::new())
            .await?;
        Ok(outcome.value)
    }

    async fn fan_out(
        &self,
        pair: ProfilePair<'_>,
        cancel: &CancellationToken,
    ) -> Result<(AgentBundle, LlmUsage), MatchError> {
        // Cancelled when the fan-out returns, so nothing outlives a failure.
        let agents_token = cancel.child_token();
        let _guard = agents_token.clone().drop_guard();

        let (profil, valeurs, projection, risques) = tokio::try_join!(
            self.run_agent(AgentKind::Profil, pair, &agents_token),
            self.run_agent(AgentKind::Valeurs, pair, &agents_token),
            self.run_agent(AgentKind::Projection, pair, &agents_token),
            self.run_agent(AgentKind::Risques, pair, &agents_token),
        )?;

        let usage = LlmUsage::merged([&profil.usage, &valeurs.usage, &projection.usage, &risques.usage]);
        let bundle = AgentBundle {
            profil: profil.value,
            valeurs: valeurs.value,
            projection: projection.value,
            risques: risques.value,
        };

        Ok((bundle, usage))
    }

    async fn run_agent(
        &self,
        kind: AgentKind,
        pair: ProfilePair<'_>,
        cancel: &CancellationToken,
    ) -> Result<StructuredOutcome<StructuredResult>, MatchError> {
        let agent = self
            .agents
            .get(&kind)
            .ok_or_else(|| MatchError::UnknownAgent(kind.to_string()))?;

        agent
            .evaluate(&self.caller, pair, &self.config.agent_options(kind), cancel)
            .await
            .map_err(|e| {
                if !e.is_cancelled() {
                    tracing::error!(agent = %kind, error = %e, "specialist agent failed");
                }
                MatchError::from(e)
            })
    }
}

/// Builder for [`MatchOrchestrator`].
pub struct MatchOrchestratorBuilder {
    caller: Option<StructuredCaller>,
    config: RuntimeConfig,
    agents: Vec<Arc<dyn SpecialistAgent>>,
    synthesizer: Synthesizer,
}

impl MatchOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            caller: None,
            config: RuntimeConfig::default(),
            agents: Vec::new(),
            synthesizer: Synthesizer::new(),
        }
    }

    pub fn caller(mut self, caller: StructuredCaller) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the built-in agent of the same kind.
    pub fn agent(mut self, agent: Arc<dyn SpecialistAgent>) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn synthesizer(mut self, synthesizer: Synthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn build(self) -> Result<MatchOrchestrator, MatchError> {
        let caller = self
            .caller
            .ok_or_else(|| MatchError::Setup("no structured caller set".to_string()))?;
        self.config
            .validate()
            .map_err(|e| MatchError::Setup(e.to_string()))?;

        let mut orchestrator = MatchOrchestrator::new(caller, self.config);
        orchestrator.synthesizer = self.synthesizer;

        for agent in self.agents {
            let kind = agent.kind();
            if agent.schema().kind_of(kind.score_field()) != Some(FieldKind::Number) {
                return Err(MatchError::Setup(format!(
                    "{} agent schema must declare '{}' as a number",
                    kind,
                    kind.score_field()
                )));
            }
            orchestrator.agents.insert(kind, agent);
        }

        Ok(orchestrator)
    }
}

impl Default for MatchOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::fixtures::{karthik, sophie};
    use crate::client::ModelClient;
    use crate::providers::{
        ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
    };
    use async_trait::async_trait;
    use matchmaker_core::{ExpectedSchema, VerdictCategory, VerdictPolicy};

    /// Answers every prompt with a reply fitting whatever it asks for.
    struct Canned;

    #[async_trait]
    impl LlmProvider for Canned {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            let system = &messages[0].content;
            let content = if system.contains("\"score_global\"") {
                r#"{"verdict": "MATCH", "score_global": 82, "resume_executif": "Good.",
                    "forces_majeures": ["respect"], "defis_principaux": ["distance"],
                    "recommandation": "Meet."}"#
            } else if system.contains("\"score_profil\"") {
                r#"{"score_profil": 80, "resume": "ok", "points_forts": [], "points_de_vigilance": []}"#
            } else if system.contains("\"score_valeurs\"") {
                r#"{"score_valeurs": 85, "compatibilites_clefs": [], "conflits_potentiels": []}"#
            } else if system.contains("\"score_projection\"") {
                r#"{"score_projection": 75, "vision_commune": [], "risques_long_terme": []}"#
            } else {
                r#"{"score_risques": 45, "red_flags": [], "points_a_surveiller": []}"#
            };
            Ok(CompletionResponse {
                content: content.to_string(),
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 20,
                },
                model: config.model.clone(),
                stop_reason: Some("stop".to_string()),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    /// A risques agent whose schema forgot the score.
    struct Scoreless;

    #[async_trait]
    impl SpecialistAgent for Scoreless {
        fn kind(&self) -> AgentKind {
            AgentKind::Risques
        }

        fn system_prompt(&self) -> &str {
            "risks"
        }

        fn schema(&self) -> ExpectedSchema {
            ExpectedSchema::new().array("red_flags")
        }

        fn user_prompt(&self, _pair: ProfilePair<'_>) -> String {
            String::new()
        }
    }

    fn caller() -> StructuredCaller {
        StructuredCaller::new(ModelClient::new(Arc::new(Canned)))
    }

    #[tokio::test]
    async fn test_match_result_envelope() {
        let orchestrator = MatchOrchestrator::new(caller(), RuntimeConfig::default());
        let (a, b) = (sophie(), karthik());

        let result = orchestrator.match_two_users(&a, &b).await.unwrap();

        assert_eq!(result.user_a.id, "u-sophie");
        assert_eq!(result.user_b.name, "Karthik");
        assert_eq!(result.meta.mode, "MULTI_AGENT_V2");
        assert_eq!(result.meta.llm_usage.llm_calls, 5);
        assert_eq!(result.meta.llm_usage.total_tokens, 600);
        assert_eq!(result.agents.score(AgentKind::Valeurs), Some(85.0));
        assert_eq!(result.agents.profil.producer(), Some("profil"));

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("userA").is_some());
        assert_eq!(json["agents"]["risques"]["score_risques"], 45);
        assert_eq!(json["verdict"]["verdict"], "MATCH");
    }

    #[tokio::test]
    async fn test_trust_model_keeps_inconsistent_category() {
        let orchestrator = MatchOrchestrator::new(caller(), RuntimeConfig::default());
        let result = orchestrator
            .match_two_users(&sophie(), &karthik())
            .await
            .unwrap();

        // 82 global with a risk score of 45 derives to ATTENTION
        assert_eq!(result.verdict.verdict, VerdictCategory::Match);
        assert!(!result.meta.policy.consistent);
        assert_eq!(result.meta.policy.derived_category, VerdictCategory::NeedsAttention);
    }

    #[tokio::test]
    async fn test_recompute_policy_overrides_category() {
        let config = RuntimeConfig {
            verdict_policy: VerdictPolicy::Recompute,
            ..RuntimeConfig::default()
        };
        let orchestrator = MatchOrchestrator::new(caller(), config);
        let result = orchestrator
            .match_two_users(&sophie(), &karthik())
            .await
            .unwrap();

        assert_eq!(result.verdict.verdict, VerdictCategory::NeedsAttention);
        assert_eq!(result.meta.policy.model_category, VerdictCategory::Match);
    }

    #[tokio::test]
    async fn test_same_profile_twice_is_rejected() {
        let orchestrator = MatchOrchestrator::new(caller(), RuntimeConfig::default());
        let a = sophie();

        let err = orchestrator.match_two_users(&a, &a).await.unwrap_err();
        assert_eq!(err, MatchError::DuplicateIdentity("u-sophie".to_string()));
        assert!(err.is_client_error());
        assert_eq!(orchestrator.caller().client().total_usage().llm_calls, 0);
    }

    #[tokio::test]
    async fn test_run_specialist_agent() {
        let orchestrator = MatchOrchestrator::new(caller(), RuntimeConfig::default());
        let result = orchestrator
            .run_specialist_agent("projection", &sophie(), &karthik())
            .await
            .unwrap();
        assert_eq!(result.score("score_projection"), Some(75.0));

        let err = orchestrator
            .run_specialist_agent("astrology", &sophie(), &karthik())
            .await
            .unwrap_err();
        assert_eq!(err, MatchError::UnknownAgent("astrology".to_string()));
    }

    #[test]
    fn test_builder_requires_caller() {
        assert!(matches!(
            MatchOrchestrator::builder().build(),
            Err(MatchError::Setup(_))
        ));
    }

    #[test]
    fn test_builder_rejects_agent_without_score() {
        let result = MatchOrchestrator::builder()
            .caller(caller())
            .agent(Arc::new(Scoreless))
            .build();
        assert!(matches!(result, Err(MatchError::Setup(msg)) if msg.contains("score_risques")));
    }
}
