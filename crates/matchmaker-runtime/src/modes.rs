//! Free-text match modes.
//!
//! - `MVP`: one unstructured call comparing the two full profiles
//! - `AGENT_V2`: a simulated conversation between the two people, built from
//!   their cached summaries, then judged by an arbiter call
//!
//! Neither mode validates its output. The verdict and score lines are
//! extracted on a best-effort basis and may be missing.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use matchmaker_core::{Profile, ProfilePair, UserRef};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::client::{ModelClient, ModelReply, PromptRequest};
use crate::config::RuntimeConfig;
use crate::orchestrator::MatchError;
use crate::prompts::{ARBITER_SYSTEM_PROMPT, CONVERSATION_SYSTEM_PROMPT, MVP_SYSTEM_PROMPT};
use crate::providers::ProviderError;
use crate::summary::{ProfileSummarizer, ProfileSummary};
use crate::usage::LlmUsage;

pub const MODE_MVP: &str = "MVP";
pub const MODE_AGENT_V2: &str = "AGENT_V2";

lazy_static! {
    static ref VERDICT_LINE: Regex =
        Regex::new(r"(?im)^[\s*#>-]*verdict[\s*]*:[\s*]*(.+?)[\s*]*$").unwrap();
    static ref SCORE_LINE: Regex = Regex::new(
        r"(?i)(?:overall score|score global)[\s*]*:[\s*]*(\d{1,3}(?:[.,]\d+)?)\s*/\s*100"
    )
    .unwrap();
}

/// Three-way label of a free-text verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeTextLabel {
    Compatible,
    WorthExploring,
    NotCompatible,
}

impl FreeTextLabel {
    /// Read a label from the text after `Verdict:`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.to_lowercase();
        // A template echoed back lists every label.
        if text.contains('/') {
            return None;
        }
        if text.contains("not compatible")
            || text.contains("non compatible")
            || text.contains("incompatible")
        {
            Some(FreeTextLabel::NotCompatible)
        } else if text.contains("worth exploring")
            || text.contains("explorer")
            || text.contains("to explore")
        {
            Some(FreeTextLabel::WorthExploring)
        } else if text.contains("compatible") {
            Some(FreeTextLabel::Compatible)
        } else {
            None
        }
    }
}

/// What could be read back from a free-text analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedVerdict {
    /// The raw text of the first `Verdict:` line
    pub verdict_line: Option<String>,
    pub label: Option<FreeTextLabel>,
    /// The `Overall score: NN/100` value, when within 0..=100
    pub score: Option<f64>,
}

/// Best-effort extraction of the verdict and score lines.
pub fn extract_verdict(text: &str) -> ExtractedVerdict {
    let verdict_line = VERDICT_LINE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|line| !line.is_empty());

    let score = SCORE_LINE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
        .filter(|s| (0.0..=100.0).contains(s));

    ExtractedVerdict {
        label: verdict_line.as_deref().and_then(FreeTextLabel::parse),
        verdict_line,
        score,
    }
}

/// Result of the `MVP` mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MvpResult {
    pub mode: String,
    pub user_a: UserRef,
    pub user_b: UserRef,
    pub analysis: String,
    pub extracted: ExtractedVerdict,
    pub timestamp: DateTime<Utc>,
    pub llm_usage: LlmUsage,
}

/// Result of the `AGENT_V2` conversation mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResult {
    pub mode: String,
    pub user_a: UserRef,
    pub user_b: UserRef,
    pub conversation: String,
    pub verdict: String,
    pub extracted: ExtractedVerdict,
    pub timestamp: DateTime<Utc>,
    /// Conversation and arbiter calls. Summary calls are cached and show
    /// up only in the client totals.
    pub llm_usage: LlmUsage,
}

pub fn mvp_user_prompt(pair: ProfilePair<'_>) -> String {
    format!(
        "Profile A:\n{}\n\nProfile B:\n{}\n\n\
         Analyse the compatibility between A and B following the system instructions.",
        pretty(pair.a),
        pretty(pair.b)
    )
}

pub fn conversation_user_prompt(a: &ProfileSummary, b: &ProfileSummary) -> String {
    format!(
        "Agent A summary:\n{}\n\nAgent B summary:\n{}\n\n\
         Simulate the conversation between the two agents following the system instructions.",
        pretty(a),
        pretty(b)
    )
}

pub fn arbiter_user_prompt(conversation: &str) -> String {
    format!(
        "Conversation between the two agents:\n\n{}\n\nGive the final compatibility verdict.",
        conversation.trim()
    )
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Runs the free-text modes. Single attempts, no validation.
#[derive(Clone)]
pub struct FreeTextMatcher {
    client: ModelClient,
    summarizer: ProfileSummarizer,
    config: RuntimeConfig,
}

impl FreeTextMatcher {
    pub fn new(client: ModelClient, summarizer: ProfileSummarizer, config: RuntimeConfig) -> Self {
        Self {
            client,
            summarizer,
            config,
        }
    }

    pub fn summarizer(&self) -> &ProfileSummarizer {
        &self.summarizer
    }

    /// `MVP`: one direct analysis of both profiles.
    pub async fn mvp(
        &self,
        a: &Profile,
        b: &Profile,
        cancel: &CancellationToken,
    ) -> Result<MvpResult, MatchError> {
        let pair = ProfilePair::new(a, b)?;
        let timestamp = Utc::now();
        tracing::info!(user_a = %a.id, user_b = %b.id, "MVP matching started");

        let reply = self
            .complete(
                MVP_SYSTEM_PROMPT,
                mvp_user_prompt(pair),
                self.config.free_text.mvp_temperature,
                cancel,
            )
            .await?;

        let extracted = extract_verdict(&reply.text);
        if extracted.label.is_none() {
            tracing::warn!("no verdict line found in MVP analysis");
        }

        let mut usage = LlmUsage::default();
        usage.add(&reply.usage, &reply.model);

        Ok(MvpResult {
            mode: MODE_MVP.to_string(),
            user_a: a.user_ref(),
            user_b: b.user_ref(),
            analysis: reply.text,
            extracted,
            timestamp,
            llm_usage: usage,
        })
    }

    /// `AGENT_V2`: summaries, simulated conversation, then arbitration.
    pub async fn conversation(
        &self,
        a: &Profile,
        b: &Profile,
        cancel: &CancellationToken,
    ) -> Result<ConversationResult, MatchError> {
        ProfilePair::new(a, b)?;
        let timestamp = Utc::now();
        tracing::info!(user_a = %a.id, user_b = %b.id, "conversation matching started");

        let (summary_a, summary_b) = tokio::try_join!(
            self.summarizer.summarize(a, cancel),
            self.summarizer.summarize(b, cancel),
        )
        .map_err(|e| {
            if e.is_cancelled() {
                MatchError::Cancelled
            } else {
                MatchError::Summary(e)
            }
        })?;

        let conversation = self
            .complete(
                CONVERSATION_SYSTEM_PROMPT,
                conversation_user_prompt(&summary_a, &summary_b),
                self.config.free_text.conversation_temperature,
                cancel,
            )
            .await?;
        tracing::debug!(chars = conversation.text.len(), "conversation simulated");

        let arbiter = self
            .complete(
                ARBITER_SYSTEM_PROMPT,
                arbiter_user_prompt(&conversation.text),
                self.config.free_text.arbiter_temperature,
                cancel,
            )
            .await?;

        let mut usage = LlmUsage::default();
        usage.add(&conversation.usage, &conversation.model);
        usage.add(&arbiter.usage, &arbiter.model);

        let extracted = extract_verdict(&arbiter.text);
        tracing::info!(
            label = ?extracted.label,
            score = extracted.score,
            "conversation matching finished"
        );

        Ok(ConversationResult {
            mode: MODE_AGENT_V2.to_string(),
            user_a: a.user_ref(),
            user_b: b.user_ref(),
            conversation: conversation.text,
            verdict: arbiter.text,
            extracted,
            timestamp,
            llm_usage: usage,
        })
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: String,
        temperature: f32,
        cancel: &CancellationToken,
    ) -> Result<ModelReply, MatchError> {
        let mut prompt = PromptRequest::new(system_prompt, user_prompt).with_temperature(temperature);
        if let Some(model) = &self.config.model {
            prompt = prompt.with_model(model.clone());
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MatchError::Cancelled),
            reply = self.client.complete(prompt) => reply.map_err(|e: ProviderError| {
                tracing::error!(error = %e, "free-text call failed");
                MatchError::Model(e)
            }),
        }
    }
}
