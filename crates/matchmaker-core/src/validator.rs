//! Structured response validation.
//!
//! Model output is untrusted text. It is accepted only when, after removing
//! a single markdown fence, it parses as a JSON object that carries every
//! field of the [`ExpectedSchema`] with the declared kind, and every numeric
//! `score` field lies in `[0, 100]`.
//!
//! Anything else is a [`ValidationError`]. There is no best-effort parse and
//! no default object: the caller retries or fails.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::result::StructuredResult;
use crate::schema::{ExpectedSchema, FieldKind, SCORE_MAX, SCORE_MIN};

lazy_static! {
    /// Opening fence with a `json` language tag.
    static ref TAGGED_FENCE_OPEN: Regex = Regex::new(r"(?i)^```json\s*").unwrap();

    /// Opening fence without a language tag.
    static ref BARE_FENCE_OPEN: Regex = Regex::new(r"^```\s*").unwrap();

    /// Closing fence at the very end of the text.
    static ref FENCE_CLOSE: Regex = Regex::new(r"\s*```$").unwrap();
}

/// Errors raised while validating a structured response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("missing field \"{field}\"")]
    MissingField { field: String },

    #[error("wrong type for \"{field}\": expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: FieldKind,
        actual: &'static str,
    },

    #[error("score \"{field}\" out of bounds: {value} (expected 0-100)")]
    OutOfBounds { field: String, value: f64 },

    #[error("invalid value for \"{field}\": {message}")]
    InvalidValue { field: String, message: String },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

impl ValidationError {
    /// Name of the offending field, when the error is about one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::MissingField { field }
            | ValidationError::TypeMismatch { field, .. }
            | ValidationError::OutOfBounds { field, .. }
            | ValidationError::InvalidValue { field, .. } => Some(field),
            ValidationError::MalformedJson(_) | ValidationError::InvalidSchema(_) => None,
        }
    }
}

/// Non-fatal observations made while validating.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Array fields that were present but empty.
    pub empty_arrays: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.empty_arrays.is_empty()
    }
}

/// Validates raw model text against one schema.
pub struct ResponseValidator<'a> {
    schema: &'a ExpectedSchema,
}

impl<'a> ResponseValidator<'a> {
    pub fn new(schema: &'a ExpectedSchema) -> Self {
        Self { schema }
    }

    /// Strip fences, parse, and validate.
    pub fn parse(&self, raw: &str) -> Result<StructuredResult, ValidationError> {
        let body = strip_fences(raw);

        let value: Value = serde_json::from_str(body)
            .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;

        let object = match value {
            Value::Object(map) => map,
            other => {
                return Err(ValidationError::MalformedJson(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let report = self.validate(&object)?;
        Ok(StructuredResult::new(object).with_report(report))
    }

    /// Validate an already-parsed object.
    ///
    /// Checks run in passes (presence, then kinds, then bounds) so that a
    /// missing field is always reported as missing, whatever else is wrong.
    pub fn validate(&self, object: &Map<String, Value>) -> Result<ValidationReport, ValidationError> {
        for spec in self.schema.fields() {
            if !object.contains_key(&spec.name) {
                return Err(ValidationError::MissingField {
                    field: spec.name.clone(),
                });
            }
        }

        for spec in self.schema.fields() {
            let value = &object[&spec.name];
            if !kind_matches(value, spec.kind) {
                return Err(ValidationError::TypeMismatch {
                    field: spec.name.clone(),
                    expected: spec.kind,
                    actual: json_kind(value),
                });
            }
        }

        for spec in self.schema.fields().iter().filter(|s| s.is_bounded_score()) {
            // kind already checked, so as_f64 only fails on exotic numbers
            let score = object[&spec.name].as_f64().ok_or_else(|| ValidationError::TypeMismatch {
                field: spec.name.clone(),
                expected: FieldKind::Number,
                actual: "number",
            })?;
            if !(SCORE_MIN..=SCORE_MAX).contains(&score) {
                return Err(ValidationError::OutOfBounds {
                    field: spec.name.clone(),
                    value: score,
                });
            }
        }

        let mut report = ValidationReport::default();
        for spec in self.schema.fields().iter().filter(|s| s.kind == FieldKind::Array) {
            let is_empty = object[&spec.name].as_array().map_or(false, |a| a.is_empty());
            if is_empty {
                tracing::warn!(field = %spec.name, "empty array accepted, flagged for review");
                report.empty_arrays.push(spec.name.clone());
            }
        }

        tracing::debug!(fields = self.schema.len(), "structured response validated");
        Ok(report)
    }
}

/// Parse `raw` against `schema`.
pub fn parse_structured(raw: &str, schema: &ExpectedSchema) -> Result<StructuredResult, ValidationError> {
    ResponseValidator::new(schema).parse(raw)
}

/// Remove one surrounding markdown code fence, if present.
///
/// Recognises a `json`-tagged fence and a bare fence. Text without a leading
/// fence is only trimmed.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();

    let opening = TAGGED_FENCE_OPEN
        .find(trimmed)
        .or_else(|| BARE_FENCE_OPEN.find(trimmed));

    match opening {
        Some(open) => {
            let rest = &trimmed[open.end()..];
            match FENCE_CLOSE.find(rest) {
                Some(close) => &rest[..close.start()],
                None => rest,
            }
        }
        None => trimmed,
    }
}

/// JSON kind name as reported in type mismatches.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn kind_matches(value: &Value, kind: FieldKind) -> bool {
    match kind {
        FieldKind::String => value.is_string(),
        FieldKind::Number => value.is_number(),
        FieldKind::Array => value.is_array(),
    }
}
