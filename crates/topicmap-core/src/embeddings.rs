//! Embeddings file: `{identifier: float[] | {"embedding": float[], ...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Rows ordered by identifier; every row has width `dim`.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingSet {
    pub ids: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
    pub dim: usize,
}

impl EmbeddingSet {
    pub fn len(&self) -> usize { self.ids.len() }
    pub fn is_empty(&self) -> bool { self.ids.is_empty() }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Vec<f32>)>) -> Result<Self> {
        let sorted: BTreeMap<String, Vec<f32>> = pairs.into_iter().collect();
        let mut set = Self::default();
        for (id, v) in sorted {
            if set.ids.is_empty() {
                set.dim = v.len();
            } else if v.len() != set.dim {
                return Err(Error::DimensionMismatch { expected: set.dim, actual: v.len() });
            }
            set.ids.push(id);
            set.vectors.push(v);
        }
        Ok(set)
    }
}

/// One written entry, matching what the ingest pipeline records per member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub embedding: Vec<f32>,
    pub source: String,
    pub method: String,
}

pub fn parse_embeddings(raw: &str) -> Result<EmbeddingSet> {
    let root: BTreeMap<String, Value> = serde_json::from_str(raw)?;
    let mut pairs = Vec::with_capacity(root.len());
    for (id, value) in root {
        let arr = match &value {
            Value::Array(_) => value,
            Value::Object(obj) => obj.get("embedding").cloned().ok_or_else(|| Error::Format(format!("'{id}' has no \"embedding\" field")))?,
            _ => return Err(Error::Format(format!("'{id}' is neither an array nor an object"))),
        };
        let v: Vec<f32> = serde_json::from_value(arr).map_err(|e| Error::Format(format!("'{id}': {e}")))?;
        pairs.push((id, v));
    }
    EmbeddingSet::from_pairs(pairs)
}

pub fn load_embeddings(path: &Path) -> Result<EmbeddingSet> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::NotFound(format!("{}: {e}", path.display())))?;
    parse_embeddings(&raw)
}

pub fn write_embeddings(path: &Path, records: &BTreeMap<String, EmbeddingRecord>) -> Result<()> {
    if let Some(parent) = path.parent() { std::fs::create_dir_all(parent)?; }
    std::fs::write(path, serde_json::to_string(records)?)?;
    Ok(())
}
