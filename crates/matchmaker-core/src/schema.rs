//! Expected shapes for structured model responses.
//!
//! An [`ExpectedSchema`] is a flat list of required top-level fields, each
//! tagged with the JSON kind it must carry. Field names containing `score`
//! that are declared numeric are additionally bound to `[0, 100]`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::validator::ValidationError;

/// Lower bound (inclusive) for any numeric `score` field.
pub const SCORE_MIN: f64 = 0.0;

/// Upper bound (inclusive) for any numeric `score` field.
pub const SCORE_MAX: f64 = 100.0;

/// Primitive kind a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    /// A JSON array. Arrays are told apart from generic objects.
    Array,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Array => "array",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(FieldKind::String),
            "number" => Ok(FieldKind::Number),
            "array" => Ok(FieldKind::Array),
            other => Err(ValidationError::InvalidSchema(format!(
                "unknown field kind '{}' (expected string, number or array)",
                other
            ))),
        }
    }
}

/// One required field of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Whether this field is subject to the `[0, 100]` bounds check.
    pub fn is_bounded_score(&self) -> bool {
        self.kind == FieldKind::Number && is_score_field(&self.name)
    }
}

/// Mapping from field name to kind, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedSchema {
    fields: Vec<FieldSpec>,
}

impl ExpectedSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field. Redeclaring a name replaces its kind in place.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.kind = kind,
            None => self.fields.push(FieldSpec { name, kind }),
        }
        self
    }

    pub fn string(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::String)
    }

    pub fn number(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Number)
    }

    pub fn array(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Array)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse the compact `name:kind,name:kind` notation used on the command line.
    pub fn parse_compact(spec: &str) -> Result<Self, ValidationError> {
        let mut schema = Self::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, kind) = entry.split_once(':').ok_or_else(|| {
                ValidationError::InvalidSchema(format!(
                    "entry '{}' is not of the form name:kind",
                    entry
                ))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(ValidationError::InvalidSchema(format!(
                    "entry '{}' has an empty field name",
                    entry
                )));
            }
            schema = schema.field(name, kind.parse()?);
        }
        Ok(schema)
    }
}

impl fmt::Display for ExpectedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|spec| format!("{}:{}", spec.name, spec.kind))
            .collect();
        f.write_str(&parts.join(","))
    }
}

/// Score fields are recognised by name alone.
pub fn is_score_field(name: &str) -> bool {
    name.contains("score")
}
