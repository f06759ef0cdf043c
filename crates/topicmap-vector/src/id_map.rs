use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use topicmap_core::error::{Error, Result};

use crate::hash::hash_id;

/// `hashed id → original id`, serialized as a JSON object with decimal string keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdMap {
    entries: BTreeMap<i64, String>,
}

impl IdMap {
    pub fn new() -> Self { Self::default() }

    /// A missing file is an empty map.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() { return Ok(Self::new()); }
        let map: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        debug!(path = %path.display(), entries = map.len(), "loaded id map");
        Ok(map)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Hash of `original` if it is free or already mapped to the same string.
    pub fn check(&self, original: &str) -> Result<i64> {
        let hashed = hash_id(original);
        match self.entries.get(&hashed) {
            Some(existing) if existing != original => Err(Error::IdCollision { hashed, existing: existing.clone(), incoming: original.to_string() }),
            _ => Ok(hashed),
        }
    }

    pub fn assign(&mut self, original: &str) -> Result<i64> {
        let hashed = self.check(original)?;
        self.entries.entry(hashed).or_insert_with(|| original.to_string());
        Ok(hashed)
    }

    pub fn get(&self, hashed: i64) -> Option<&str> { self.entries.get(&hashed).map(String::as_str) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> { self.entries.iter().map(|(&k, v)| (k, v.as_str())) }

    #[cfg(test)]
    pub(crate) fn insert_raw(&mut self, hashed: i64, original: &str) { self.entries.insert(hashed, original.to_string()); }
}
