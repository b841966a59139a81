// File-backed presence store
// Re-reads a YAML (or JSON) registry document on every call, so changes made by
// whatever maintains the file are visible immediately

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::StoreError;

use super::presence::PresenceStore;

/// Registry document layout:
///
/// ```yaml
/// sets:
///   SERVERS:
///     - '{"address":"http://10.0.0.1:3000"}'
///     - address: http://10.0.0.2:3000
/// values:
///   abc: http://10.0.0.1:3000
/// ```
///
/// Set members may be written as JSON strings or as mappings; mappings are
/// normalized to their JSON encoding.
#[derive(Debug, Default, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    sets: HashMap<String, Vec<serde_yaml::Value>>,
    #[serde(default)]
    values: HashMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct FilePresenceStore {
    path: PathBuf,
}

impl FilePresenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<RegistryDocument, StoreError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            StoreError::Unavailable(format!("cannot read {}: {}", self.path.display(), e))
        })?;

        if text.trim().is_empty() {
            return Ok(RegistryDocument::default());
        }

        serde_yaml::from_str(&text).map_err(|e| {
            StoreError::Unavailable(format!("cannot parse {}: {}", self.path.display(), e))
        })
    }
}

fn normalize_member(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(member) => Some(member.clone()),
        serde_yaml::Value::Mapping(_) => serde_json::to_string(value).ok(),
        _ => None,
    }
}

#[async_trait]
impl PresenceStore for FilePresenceStore {
    async fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        let document = self.read_document().await?;
        let members: Vec<String> = document
            .sets
            .get(set)
            .map(|values| values.iter().filter_map(normalize_member).collect())
            .unwrap_or_default();

        debug!(path = %self.path.display(), set, count = members.len(), "Scanned set");
        Ok(members)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut document = self.read_document().await?;
        Ok(document.values.remove(key))
    }
}
