//! Side-stored chunk text: `<id>.txt` plus a `<id>.json` record.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use topicmap_core::error::Result;
use topicmap_core::types::Chunk;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub text: String,
    pub start_token: usize,
    pub end_token: usize,
    pub cluster_id: i32,
    pub embedding: Vec<f32>,
}

pub fn write_chunk(dir: &Path, chunk: &Chunk, text: &str, embedding: &[f32]) -> Result<()> {
    std::fs::write(dir.join(format!("{}.txt", chunk.chunk_id)), text)?;
    let record = ChunkRecord {
        text: text.to_string(),
        start_token: chunk.start_token,
        end_token: chunk.end_token,
        cluster_id: chunk.cluster_id,
        embedding: embedding.to_vec(),
    };
    std::fs::write(dir.join(format!("{}.json", chunk.chunk_id)), serde_json::to_string_pretty(&record)?)?;
    Ok(())
}

/// `.txt` first, then the `text` field of the `.json` record; anything else is "".
pub fn load_chunk_text(dir: &Path, id: &str) -> String {
    let txt = dir.join(format!("{id}.txt"));
    if txt.exists() {
        return std::fs::read_to_string(&txt).unwrap_or_else(|e| {
            warn!(path = %txt.display(), error = %e, "unreadable chunk text");
            String::new()
        });
    }
    let json = dir.join(format!("{id}.json"));
    if !json.exists() { return String::new(); }
    let parsed = std::fs::read_to_string(&json)
        .map_err(topicmap_core::Error::from)
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).map_err(Into::into));
    match parsed {
        Ok(v) => v.get("text").and_then(|t| t.as_str()).unwrap_or_default().to_string(),
        Err(e) => {
            warn!(path = %json.display(), error = %e, "unreadable chunk record");
            String::new()
        }
    }
}
