//! Domain types shared by the segmenter, index, retriever and cluster engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel cluster id for members a density clusterer could not place.
pub const NOISE_CLUSTER: i32 = -1;

const CHUNK_MARKER: &str = "_chunk";

/// A source document handed in by an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self { Self { id: id.into(), text: text.into() } }
}

/// A contiguous token span of a document.
///
/// `[start_token, end_token)` ranges of one document partition its token stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub start_token: usize,
    pub end_token: usize,
    pub cluster_id: i32,
}

impl Chunk {
    pub fn len(&self) -> usize { self.end_token - self.start_token }
    pub fn is_empty(&self) -> bool { self.start_token == self.end_token }
}

/// `"<doc>_chunkNN"`, zero-padded to two digits.
pub fn chunk_id(doc_id: &str, index: usize) -> String { format!("{doc_id}{CHUNK_MARKER}{index:02}") }

/// Parent document of a chunk identifier, or `None` when the id does not follow the chunk naming.
pub fn parent_doc_id(id: &str) -> Option<&str> {
    let pos = id.rfind(CHUNK_MARKER)?;
    let suffix = &id[pos + CHUNK_MARKER.len()..];
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) { return None; }
    Some(&id[..pos])
}

/// One ranked retrieval result. Higher `score` is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub id: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// member id → cluster id.
pub type ClusterAssignment = BTreeMap<String, i32>;

/// cluster id → label. Never contains the noise id.
pub type ClusterLabelMap = BTreeMap<i32, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_naming_round_trips_to_parent() {
        let id = chunk_id("report", 3);
        assert_eq!(id, "report_chunk03");
        assert_eq!(parent_doc_id(&id), Some("report"));
        assert_eq!(parent_doc_id(&chunk_id("a_chunky_doc", 112)), Some("a_chunky_doc"));
    }

    #[test]
    fn non_chunk_ids_have_no_parent() {
        assert_eq!(parent_doc_id("report"), None);
        assert_eq!(parent_doc_id("report_chunk"), None);
        assert_eq!(parent_doc_id("report_chunkx1"), None);
    }
}
