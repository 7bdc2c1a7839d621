//! User profiles and profile pairs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors from profile loading and pairing.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to read profiles file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Duplicate profile id: {0}")]
    DuplicateId(String),
}

/// Errors from building a [`ProfilePair`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairError {
    #[error("a profile cannot be matched with itself: {0}")]
    DuplicateIdentity(String),
}

/// A user profile as hydrated by the profile store.
///
/// The core only reads it. Field names follow the store's camelCase layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub age: Option<u32>,

    #[serde(default)]
    pub gender: Option<String>,

    #[serde(default)]
    pub city: Option<String>,

    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub values: Vec<String>,

    #[serde(default)]
    pub non_negotiables: Vec<String>,

    #[serde(default)]
    pub emotional_needs: Vec<String>,

    #[serde(default)]
    pub red_flags: Vec<String>,

    #[serde(default)]
    pub relationship_goal: Option<String>,

    #[serde(default)]
    pub culture_openness: Vec<String>,

    #[serde(default)]
    pub family_situation: Option<String>,

    #[serde(default)]
    pub communication_style: Option<String>,

    /// Free-form profile details (bio, interests, profession, ...).
    #[serde(default)]
    pub raw_profile: Value,
}

impl Profile {
    /// Minimal profile, mostly for tests and fixtures.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            age: None,
            gender: None,
            city: None,
            country: None,
            values: Vec::new(),
            non_negotiables: Vec::new(),
            emotional_needs: Vec::new(),
            red_flags: Vec::new(),
            relationship_goal: None,
            culture_openness: Vec::new(),
            family_situation: None,
            communication_style: None,
            raw_profile: Value::Null,
        }
    }

    pub fn user_ref(&self) -> UserRef {
        UserRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    fn validate(&self) -> Result<(), ProfileError> {
        if self.id.trim().is_empty() {
            return Err(ProfileError::MissingField("id".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(ProfileError::MissingField(format!("name (profile {})", self.id)));
        }
        Ok(())
    }
}

/// Identity of a matched user, as echoed in results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
}

/// Two distinct profiles to be compared. Borrowed for one request.
#[derive(Debug, Clone, Copy)]
pub struct ProfilePair<'a> {
    pub a: &'a Profile,
    pub b: &'a Profile,
}

impl<'a> ProfilePair<'a> {
    pub fn new(a: &'a Profile, b: &'a Profile) -> Result<Self, PairError> {
        if a.id == b.id {
            return Err(PairError::DuplicateIdentity(a.id.clone()));
        }
        Ok(Self { a, b })
    }
}

/// Load a list of profiles from YAML.
pub fn profiles_from_yaml(yaml: &str) -> Result<Vec<Profile>, ProfileError> {
    let profiles: Vec<Profile> = serde_yaml::from_str(yaml)?;
    check_profiles(&profiles)?;
    Ok(profiles)
}

/// Load a list of profiles from JSON.
pub fn profiles_from_json(json: &str) -> Result<Vec<Profile>, ProfileError> {
    let profiles: Vec<Profile> = serde_json::from_str(json)?;
    check_profiles(&profiles)?;
    Ok(profiles)
}

/// Load profiles from a file, picking the format from its extension.
pub fn profiles_from_file(path: impl AsRef<Path>) -> Result<Vec<Profile>, ProfileError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => profiles_from_json(&contents),
        _ => profiles_from_yaml(&contents),
    }
}

fn check_profiles(profiles: &[Profile]) -> Result<(), ProfileError> {
    let mut seen = std::collections::HashSet::new();
    for profile in profiles {
        profile.validate()?;
        if !seen.insert(&profile.id) {
            return Err(ProfileError::DuplicateId(profile.id.clone()));
        }
    }
    Ok(())
}
