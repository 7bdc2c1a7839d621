//! Validated structured results and the per-request agent bundle.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::validator::ValidationReport;

/// The four specialist lenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Psychological and emotional compatibility.
    Profil,
    /// Values and lifestyle compatibility.
    Valeurs,
    /// Long-term life-plan compatibility.
    Projection,
    /// Red flags and relational risks.
    Risques,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Profil,
        AgentKind::Valeurs,
        AgentKind::Projection,
        AgentKind::Risques,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Profil => "profil",
            AgentKind::Valeurs => "valeurs",
            AgentKind::Projection => "projection",
            AgentKind::Risques => "risques",
        }
    }

    /// Name of the score field this agent's schema declares.
    pub fn score_field(&self) -> &'static str {
        match self {
            AgentKind::Profil => "score_profil",
            AgentKind::Valeurs => "score_valeurs",
            AgentKind::Projection => "score_projection",
            AgentKind::Risques => "score_risques",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "profil" | "profile" => Ok(AgentKind::Profil),
            "valeurs" | "values" => Ok(AgentKind::Valeurs),
            "projection" => Ok(AgentKind::Projection),
            "risques" | "risks" => Ok(AgentKind::Risques),
            other => Err(format!(
                "unknown agent '{}' (expected profil, valeurs, projection or risques)",
                other
            )),
        }
    }
}

/// A JSON object that passed schema validation.
///
/// Serializes as the bare object, so it can be embedded verbatim in prompts
/// and responses. The producer tag is carried alongside, not inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResult {
    #[serde(skip)]
    producer: Option<String>,

    /// Array fields that validated but were empty.
    #[serde(skip)]
    empty_arrays: Vec<String>,

    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl StructuredResult {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            producer: None,
            empty_arrays: Vec::new(),
            fields,
        }
    }

    pub(crate) fn with_report(mut self, report: ValidationReport) -> Self {
        self.empty_arrays = report.empty_arrays;
        self
    }

    /// Array fields accepted while empty, flagged for review.
    pub fn empty_arrays(&self) -> &[String] {
        &self.empty_arrays
    }

    /// Tag the result with whoever produced it.
    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }

    pub fn producer(&self) -> Option<&str> {
        self.producer.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn score(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// String items of an array field. Non-string items are rendered as JSON.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        self.fields
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.fields).unwrap_or_else(|_| "{}".to_string())
    }
}

/// The four specialist results for one matching request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBundle {
    pub profil: StructuredResult,
    pub valeurs: StructuredResult,
    pub projection: StructuredResult,
    pub risques: StructuredResult,
}

impl AgentBundle {
    pub fn get(&self, kind: AgentKind) -> &StructuredResult {
        match kind {
            AgentKind::Profil => &self.profil,
            AgentKind::Valeurs => &self.valeurs,
            AgentKind::Projection => &self.projection,
            AgentKind::Risques => &self.risques,
        }
    }

    /// The agent's own score, read from its schema's score field.
    pub fn score(&self, kind: AgentKind) -> Option<f64> {
        self.get(kind).score(kind.score_field())
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentKind, &StructuredResult)> {
        AgentKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}
