//! Runtime configuration.
//!
//! Every field has a default, so an empty file is a valid configuration.
//! Durations are written in humantime notation (`"1s"`, `"250ms"`, `"1h"`).
//!
//! ```yaml
//! model: gpt-4o
//! request_timeout: 30s
//! retry:
//!   max_attempts: 3
//!   base_delay: 500ms
//! agents:
//!   risques:
//!     temperature: 0.3
//!     max_attempts: 4
//! verdict_policy: recompute
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use matchmaker_core::{AgentKind, VerdictPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::{DEFAULT_MODEL, MODEL_ENV};
use crate::structured::{CallOptions, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde adapter for humantime durations.
mod humantime_duration {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(D::Error::custom)
    }
}

/// Retry settings shared by every structured call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,

    #[serde(with = "humantime_duration")]
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}

/// Settings of one call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Overrides `retry.max_attempts` for this stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl StageConfig {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            max_attempts: None,
        }
    }
}

fn profil_stage() -> StageConfig {
    StageConfig::with_temperature(0.7)
}

fn valeurs_stage() -> StageConfig {
    StageConfig::with_temperature(0.6)
}

fn projection_stage() -> StageConfig {
    StageConfig::with_temperature(0.6)
}

fn risques_stage() -> StageConfig {
    StageConfig::with_temperature(0.5)
}

fn synthesis_stage() -> StageConfig {
    StageConfig::with_temperature(0.7)
}

fn summary_stage() -> StageConfig {
    StageConfig::with_temperature(0.6)
}

/// Per-specialist settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "profil_stage")]
    pub profil: StageConfig,

    #[serde(default = "valeurs_stage")]
    pub valeurs: StageConfig,

    #[serde(default = "projection_stage")]
    pub projection: StageConfig,

    #[serde(default = "risques_stage")]
    pub risques: StageConfig,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            profil: profil_stage(),
            valeurs: valeurs_stage(),
            projection: projection_stage(),
            risques: risques_stage(),
        }
    }
}

impl AgentsConfig {
    pub fn get(&self, kind: AgentKind) -> &StageConfig {
        match kind {
            AgentKind::Profil => &self.profil,
            AgentKind::Valeurs => &self.valeurs,
            AgentKind::Projection => &self.projection,
            AgentKind::Risques => &self.risques,
        }
    }
}

/// Temperatures of the unstructured calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreeTextConfig {
    pub mvp_temperature: f32,
    pub conversation_temperature: f32,
    pub arbiter_temperature: f32,
}

impl Default for FreeTextConfig {
    fn default() -> Self {
        Self {
            mvp_temperature: 0.7,
            conversation_temperature: 0.8,
            arbiter_temperature: 0.6,
        }
    }
}

/// Profile summary cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryCacheConfig {
    pub max_entries: u64,

    #[serde(with = "humantime_duration")]
    pub ttl: Duration,
}

impl Default for SummaryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Model for every call. Falls back to `OPENAI_MODEL`, then the built-in default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// HTTP timeout of one provider request.
    #[serde(with = "humantime_duration")]
    pub request_timeout: Duration,

    pub retry: RetryConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    #[serde(default = "synthesis_stage")]
    pub synthesis: StageConfig,

    /// Profile summary (memory layer) call.
    #[serde(default = "summary_stage")]
    pub summary: StageConfig,

    pub free_text: FreeTextConfig,

    pub verdict_policy: VerdictPolicy,

    pub summary_cache: SummaryCacheConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model: None,
            request_timeout: Duration::from_secs(60),
            retry: RetryConfig::default(),
            agents: AgentsConfig::default(),
            synthesis: synthesis_stage(),
            summary: summary_stage(),
            free_text: FreeTextConfig::default(),
            verdict_policy: VerdictPolicy::default(),
            summary_cache: SummaryCacheConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, picking the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject values no call could work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(model) = &self.model {
            if model.trim().is_empty() {
                return Err(ConfigError::Invalid("model must not be empty".to_string()));
            }
        }

        check_attempts("retry.max_attempts", Some(self.retry.max_attempts))?;

        let stages = [
            ("agents.profil", &self.agents.profil),
            ("agents.valeurs", &self.agents.valeurs),
            ("agents.projection", &self.agents.projection),
            ("agents.risques", &self.agents.risques),
            ("synthesis", &self.synthesis),
            ("summary", &self.summary),
        ];
        for (name, stage) in stages {
            check_attempts(&format!("{}.max_attempts", name), stage.max_attempts)?;
            check_temperature(&format!("{}.temperature", name), stage.temperature)?;
        }

        check_temperature("free_text.mvp_temperature", self.free_text.mvp_temperature)?;
        check_temperature(
            "free_text.conversation_temperature",
            self.free_text.conversation_temperature,
        )?;
        check_temperature("free_text.arbiter_temperature", self.free_text.arbiter_temperature)?;

        if self.summary_cache.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "summary_cache.max_entries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Configured model, else `OPENAI_MODEL`, else the built-in default.
    pub fn effective_model(&self) -> String {
        self.model
            .clone()
            .or_else(|| std::env::var(MODEL_ENV).ok().filter(|m| !m.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// Call options for one stage, inheriting the shared retry settings.
    pub fn call_options(&self, label: impl Into<String>, stage: &StageConfig) -> CallOptions {
        CallOptions::new(label)
            .temperature(stage.temperature)
            .model(self.model.clone())
            .max_attempts(stage.max_attempts.unwrap_or(self.retry.max_attempts))
            .base_delay(self.retry.base_delay)
    }

    pub fn agent_options(&self, kind: AgentKind) -> CallOptions {
        self.call_options(kind.as_str(), self.agents.get(kind))
    }

    pub fn synthesis_options(&self) -> CallOptions {
        self.call_options("synthesis", &self.synthesis)
    }

    pub fn summary_options(&self) -> CallOptions {
        self.call_options("summary", &self.summary)
    }
}

fn check_attempts(name: &str, value: Option<u32>) -> Result<(), ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Invalid(format!("{} must be at least 1", name))),
        _ => Ok(()),
    }
}

fn check_temperature(name: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=2.0).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{} must be within 0.0..=2.0, got {}",
            name, value
        )));
    }
    Ok(())
}
