//! Profile lookup.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use matchmaker_core::{profiles_from_file, profiles_from_json, profiles_from_yaml, Profile, ProfileError};
use parking_lot::RwLock;
use thiserror::Error;

/// Errors from a profile store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("profile not found: {0}")]
    NotFound(String),

    #[error("failed to load profiles: {0}")]
    Load(#[from] ProfileError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Source of hydrated profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Profile, StoreError>;
}

/// Profiles held in memory, loaded once.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl InMemoryProfileStore {
    pub fn new(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let profiles = profiles.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            profiles: RwLock::new(profiles),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, StoreError> {
        Ok(Self::new(profiles_from_yaml(yaml)?))
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(Self::new(profiles_from_json(json)?))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(profiles_from_file(path)?))
    }

    /// Add or replace a profile.
    pub fn upsert(&self, profile: Profile) {
        self.profiles.write().insert(profile.id.clone(), profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }

    /// Ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.profiles.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, id: &str) -> Result<Profile, StoreError> {
        self.profiles
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILES: &str = r#"
- id: u1
  name: Sophie
  age: 29
  values: [respect, family]
  redFlags: [lies]
- id: u2
  name: Karthik
"#;

    #[tokio::test]
    async fn test_get_and_not_found() {
        let store = InMemoryProfileStore::from_yaml(PROFILES).unwrap();
        assert_eq!(store.len(), 2);

        let sophie = store.get("u1").await.unwrap();
        assert_eq!(sophie.red_flags, vec!["lies"]);

        let err = store.get("u3").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "u3"));
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = InMemoryProfileStore::from_yaml(PROFILES).unwrap();
        let mut karthik = store.get("u2").await.unwrap();
        karthik.age = Some(31);
        store.upsert(karthik);

        assert_eq!(store.get("u2").await.unwrap().age, Some(31));
        assert_eq!(store.ids(), vec!["u1", "u2"]);
    }

    #[test]
    fn test_duplicate_ids_fail_to_load() {
        let yaml = "- {id: u1, name: A}\n- {id: u1, name: B}\n";
        assert!(matches!(
            InMemoryProfileStore::from_yaml(yaml),
            Err(StoreError::Load(ProfileError::DuplicateId(_)))
        ));
    }
}
