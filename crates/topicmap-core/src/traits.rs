use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Remote (or local) embedding capability. Dimension is a static function of `model`.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>>;
}

/// Produces a short label for a prompt.
pub trait Labeler: Send + Sync {
    fn label(&self, prompt: &str) -> Result<String>;
}

/// Spend guard consulted before every paid call.
pub trait BudgetGuard: Send + Sync {
    fn approve(&self, estimated_cost: f64) -> bool;
}

/// Tokenizer consistent with an embedding model.
pub trait TextTokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;
    fn decode(&self, ids: &[u32]) -> Result<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberMetadata {
    pub category: Option<String>,
    pub summary: Option<String>,
    pub topics: Vec<String>,
    pub tags: Vec<String>,
    pub themes: Vec<String>,
}

/// Per-member descriptive metadata.
pub trait MetadataProvider: Send + Sync {
    fn get(&self, member_id: &str) -> Option<MemberMetadata>;

    fn get_summary(&self, member_id: &str) -> Option<String> { self.get(member_id).and_then(|m| m.summary) }
}
