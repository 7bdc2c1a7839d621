//! # matchmaker-core
//!
//! Pure data model for HN MatchMaker.
//!
//! This crate answers one question without touching the network: is this
//! piece of model output an acceptable structured result? It holds:
//!
//! - the profile model and [`ProfilePair`]
//! - [`ExpectedSchema`], a flat field/kind description of a response
//! - the [`ResponseValidator`] (fence stripping, parsing, kind and bound checks)
//! - [`StructuredResult`], [`AgentBundle`] and the typed [`Verdict`]
//! - the verdict category thresholds
//!
//! All LLM calls live in `matchmaker-runtime`.
//!
//! ## Example
//!
//! ```rust
//! use matchmaker_core::{parse_structured, ExpectedSchema};
//!
//! let schema = ExpectedSchema::new().number("a");
//! let result = parse_structured("```json\n{\"a\": 1}\n```", &schema).unwrap();
//! assert_eq!(result.score("a"), Some(1.0));
//! ```

pub mod profile;
pub mod result;
pub mod schema;
pub mod validator;
pub mod verdict;

pub use profile::{
    profiles_from_file, profiles_from_json, profiles_from_yaml, PairError, Profile, ProfileError,
    ProfilePair, UserRef,
};
pub use result::{AgentBundle, AgentKind, StructuredResult};
pub use schema::{is_score_field, ExpectedSchema, FieldKind, FieldSpec, SCORE_MAX, SCORE_MIN};
pub use validator::{
    json_kind, parse_structured, strip_fences, ResponseValidator, ValidationError,
    ValidationReport,
};
pub use verdict::{derive_category, PolicyCheck, Verdict, VerdictCategory, VerdictPolicy};
