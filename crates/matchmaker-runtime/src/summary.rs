//! Profile summaries (memory layer).
//!
//! A structured psychological summary of one profile, used by the
//! conversation mode. Summaries are cached per profile id and content hash:
//! editing a profile changes its hash, so a stale summary is never served.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use matchmaker_core::{ExpectedSchema, Profile, StructuredResult, ValidationError};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agents::{json_list, or_unspecified};
use crate::config::RuntimeConfig;
use crate::prompts::{structured, SUMMARY_SYSTEM_PROMPT};
use crate::structured::{CallOptions, StructuredCallError, StructuredCaller};

/// Structured summary of one person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub resume_psy: String,
    pub valeurs_clefs: Vec<String>,
    pub risques_relationnels: Vec<String>,
    pub dealbreakers_probables: Vec<String>,
    pub type_de_partenaire_recommande: String,
}

impl ProfileSummary {
    pub fn schema() -> ExpectedSchema {
        ExpectedSchema::new()
            .string("resume_psy")
            .array("valeurs_clefs")
            .array("risques_relationnels")
            .array("dealbreakers_probables")
            .string("type_de_partenaire_recommande")
    }
}

impl TryFrom<&StructuredResult> for ProfileSummary {
    type Error = ValidationError;

    fn try_from(result: &StructuredResult) -> Result<Self, Self::Error> {
        let text = |field: &str| {
            result
                .str_field(field)
                .map(str::to_string)
                .ok_or_else(|| ValidationError::MissingField {
                    field: field.to_string(),
                })
        };

        Ok(ProfileSummary {
            resume_psy: text("resume_psy")?,
            valeurs_clefs: result.string_list("valeurs_clefs"),
            risques_relationnels: result.string_list("risques_relationnels"),
            dealbreakers_probables: result.string_list("dealbreakers_probables"),
            type_de_partenaire_recommande: text("type_de_partenaire_recommande")?,
        })
    }
}

/// Hash of everything the summary is built from.
pub fn content_hash(profile: &Profile) -> u64 {
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(profile)
        .unwrap_or_default()
        .hash(&mut hasher);
    hasher.finish()
}

pub fn summary_user_prompt(profile: &Profile) -> String {
    let location = format!(
        "{}, {}",
        or_unspecified(profile.city.as_deref()),
        or_unspecified(profile.country.as_deref())
    );
    let age = profile
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| or_unspecified(None).to_string());

    format!(
        "Analyse this user profile:\n\n\
         Name: {}\n\
         Age: {}\n\
         Location: {}\n\
         Values: {}\n\
         Non-negotiables: {}\n\
         Emotional needs: {}\n\
         Red flags: {}\n\
         Relationship goal: {}\n\
         Full profile: {}\n\n\
         Produce the structured psychological summary as strict JSON.",
        profile.name,
        age,
        location,
        json_list(&profile.values),
        json_list(&profile.non_negotiables),
        json_list(&profile.emotional_needs),
        json_list(&profile.red_flags),
        or_unspecified(profile.relationship_goal.as_deref()),
        profile.raw_profile,
    )
}

type SummaryKey = (String, u64);

/// Builds and caches profile summaries.
#[derive(Clone)]
pub struct ProfileSummarizer {
    caller: StructuredCaller,
    options: CallOptions,
    system_prompt: Arc<str>,
    cache: Cache<SummaryKey, ProfileSummary>,
}

impl ProfileSummarizer {
    pub fn new(caller: StructuredCaller, config: &RuntimeConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.summary_cache.max_entries)
            .time_to_live(config.summary_cache.ttl)
            .build();

        Self {
            caller,
            options: config.summary_options(),
            system_prompt: Arc::from(structured(SUMMARY_SYSTEM_PROMPT)),
            cache,
        }
    }

    /// Cached summary of `profile`, built on first use.
    ///
    /// Concurrent requests for the same profile share one model call. The
    /// shared build is not tied to any caller's token: cancelling only stops
    /// this caller waiting, and reports no attempts of its own. If the
    /// cancelled caller was driving the build, the next waiter restarts it.
    pub async fn summarize(
        &self,
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> Result<ProfileSummary, StructuredCallError> {
        let key = (profile.id.clone(), content_hash(profile));
        let shared = CancellationToken::new();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StructuredCallError::Cancelled { attempts: 0 }),
            summary = self.cache.try_get_with(key, self.build(profile, &shared)) => {
                summary.map_err(|e| (*e).clone())
            }
        }
    }

    /// Build a fresh summary and replace any cached one.
    pub async fn rebuild(
        &self,
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> Result<ProfileSummary, StructuredCallError> {
        let summary = self.build(profile, cancel).await?;
        self.cache
            .insert((profile.id.clone(), content_hash(profile)), summary.clone())
            .await;
        Ok(summary)
    }

    async fn build(
        &self,
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> Result<ProfileSummary, StructuredCallError> {
        tracing::debug!(profile = %profile.id, "building profile summary");

        let outcome = self
            .caller
            .call_decoded(
                &self.system_prompt,
                &summary_user_prompt(profile),
                &ProfileSummary::schema(),
                &self.options,
                cancel,
                |result| ProfileSummary::try_from(&result),
            )
            .await?;

        tracing::info!(
            profile = %profile.id,
            attempts = outcome.attempts,
            "profile summary built"
        );
        Ok(outcome.value)
    }
}
