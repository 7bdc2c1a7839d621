//! Specialist agent trait and common types.

use async_trait::async_trait;
use matchmaker_core::{AgentKind, ExpectedSchema, ProfilePair, StructuredResult};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::structured::{CallOptions, StructuredCallError, StructuredCaller, StructuredOutcome};

/// Errors from specialist agents.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("{agent} agent failed: {source}")]
    Failed {
        agent: AgentKind,
        #[source]
        source: StructuredCallError,
    },

    #[error("unknown agent '{0}'")]
    UnknownAgent(String),
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Failed { source, .. } if source.is_cancelled())
    }
}

/// One analytical lens over a profile pair.
///
/// # Isolation
/// An agent reads only the two profiles, never another agent's result, and
/// keeps no state between calls.
#[async_trait]
pub trait SpecialistAgent: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// System prompt, including the JSON shape it asks for.
    fn system_prompt(&self) -> &str;

    /// Shape the reply must have.
    fn schema(&self) -> ExpectedSchema;

    /// User prompt built from the subset of both profiles this lens needs.
    fn user_prompt(&self, pair: ProfilePair<'_>) -> String;

    /// Run the lens through `caller`.
    async fn evaluate(
        &self,
        caller: &StructuredCaller,
        pair: ProfilePair<'_>,
        options: &CallOptions,
        cancel: &CancellationToken,
    ) -> Result<StructuredOutcome<StructuredResult>, AgentError> {
        let kind = self.kind();
        let outcome = caller
            .call_with_cancel(
                self.system_prompt(),
                &self.user_prompt(pair),
                &self.schema(),
                options,
                cancel,
            )
            .await
            .map_err(|source| AgentError::Failed {
                agent: kind,
                source,
            })?;

        tracing::info!(
            agent = %kind,
            score = outcome.value.score(kind.score_field()),
            attempts = outcome.attempts,
            "agent finished"
        );
        Ok(outcome)
    }
}
