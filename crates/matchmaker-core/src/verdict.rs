//! Final verdict of a matching request.
//!
//! The category thresholds below are the policy the synthesis prompt asks
//! the model to apply:
//!
//! 1. `MATCH` when the global score is at least 70 and the risk score at least 60
//! 2. `NO_MATCH` when the global score is under 50 or the risk score under 40
//! 3. `ATTENTION` otherwise
//!
//! The model applies them itself. [`derive_category`] re-applies them
//! deterministically so the two can be compared, and [`VerdictPolicy`]
//! decides which one wins.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::result::StructuredResult;
use crate::schema::ExpectedSchema;
use crate::validator::ValidationError;

pub const MATCH_MIN_GLOBAL: f64 = 70.0;
pub const MATCH_MIN_RISK: f64 = 60.0;
pub const NO_MATCH_BELOW_GLOBAL: f64 = 50.0;
pub const NO_MATCH_BELOW_RISK: f64 = 40.0;

/// Three-valued classification of a profile pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerdictCategory {
    #[serde(rename = "MATCH")]
    Match,
    #[serde(rename = "NO_MATCH")]
    NoMatch,
    #[serde(rename = "ATTENTION")]
    NeedsAttention,
}

impl VerdictCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictCategory::Match => "MATCH",
            VerdictCategory::NoMatch => "NO_MATCH",
            VerdictCategory::NeedsAttention => "ATTENTION",
        }
    }
}

impl fmt::Display for VerdictCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerdictCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "MATCH" => Ok(VerdictCategory::Match),
            "NO_MATCH" | "NOMATCH" => Ok(VerdictCategory::NoMatch),
            "ATTENTION" | "NEEDS_ATTENTION" => Ok(VerdictCategory::NeedsAttention),
            _ => Err(format!(
                "unknown verdict category '{}' (expected MATCH, NO_MATCH or ATTENTION)",
                s
            )),
        }
    }
}

/// Which category is reported when model and thresholds disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictPolicy {
    /// Keep the model's category as-is.
    #[default]
    TrustModel,
    /// Replace it with [`derive_category`] applied to the returned scores.
    Recompute,
}

/// Apply the category thresholds.
pub fn derive_category(global_score: f64, risk_score: f64) -> VerdictCategory {
    if global_score >= MATCH_MIN_GLOBAL && risk_score >= MATCH_MIN_RISK {
        VerdictCategory::Match
    } else if global_score < NO_MATCH_BELOW_GLOBAL || risk_score < NO_MATCH_BELOW_RISK {
        VerdictCategory::NoMatch
    } else {
        VerdictCategory::NeedsAttention
    }
}

/// Outcome of checking the model's category against the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCheck {
    pub policy: VerdictPolicy,
    pub model_category: VerdictCategory,
    pub derived_category: VerdictCategory,
    pub consistent: bool,
}

/// The synthesis call's output, typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub verdict: VerdictCategory,
    pub score_global: f64,
    pub resume_executif: String,
    pub forces_majeures: Vec<String>,
    pub defis_principaux: Vec<String>,
    pub recommandation: String,
}

impl Verdict {
    /// Schema the synthesis call must satisfy.
    pub fn schema() -> ExpectedSchema {
        ExpectedSchema::new()
            .string("verdict")
            .number("score_global")
            .string("resume_executif")
            .array("forces_majeures")
            .array("defis_principaux")
            .string("recommandation")
    }

    /// Compare against the thresholds and apply `policy`.
    pub fn apply_policy(&mut self, risk_score: f64, policy: VerdictPolicy) -> PolicyCheck {
        let derived = derive_category(self.score_global, risk_score);
        let check = PolicyCheck {
            policy,
            model_category: self.verdict,
            derived_category: derived,
            consistent: derived == self.verdict,
        };

        if !check.consistent {
            tracing::warn!(
                model = %self.verdict,
                derived = %derived,
                score_global = self.score_global,
                score_risques = risk_score,
                "model verdict disagrees with category thresholds"
            );
            if policy == VerdictPolicy::Recompute {
                self.verdict = derived;
            }
        }

        check
    }
}

impl TryFrom<&StructuredResult> for Verdict {
    type Error = ValidationError;

    /// Expects a result already validated against [`Verdict::schema`].
    fn try_from(result: &StructuredResult) -> Result<Self, Self::Error> {
        let category_text = required_str(result, "verdict")?;
        let verdict = category_text
            .parse::<VerdictCategory>()
            .map_err(|message| ValidationError::InvalidValue {
                field: "verdict".to_string(),
                message,
            })?;

        let score_global = result
            .score("score_global")
            .ok_or_else(|| ValidationError::MissingField {
                field: "score_global".to_string(),
            })?;

        Ok(Verdict {
            verdict,
            score_global,
            resume_executif: required_str(result, "resume_executif")?.to_string(),
            forces_majeures: result.string_list("forces_majeures"),
            defis_principaux: result.string_list("defis_principaux"),
            recommandation: required_str(result, "recommandation")?.to_string(),
        })
    }
}

fn required_str<'a>(result: &'a StructuredResult, field: &str) -> Result<&'a str, ValidationError> {
    result.str_field(field).ok_or_else(|| ValidationError::MissingField {
        field: field.to_string(),
    })
}
