//! Query-time retrieval over the vector store.
//!
//! Each query is embedded and searched independently. Hits are merged by identifier:
//! the merged score is the sum of per-query scores divided by the number of queries,
//! so an identifier a query did not return contributes 0 for that query. Results are
//! ordered by merged score (descending), then identifier (ascending).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use topicmap_core::config::Settings;
use topicmap_core::error::{Error, Result};
use topicmap_core::traits::BudgetGuard;
use topicmap_core::types::{parent_doc_id, RankedHit};
use topicmap_embed::{embedder_from_settings, model_for_dim, spec, Embedder};
use topicmap_vector::VectorStore;

use crate::text::load_chunk_text;

pub struct Retriever {
    embedder: Embedder,
    store: VectorStore,
    chunks_dir: PathBuf,
    model: String,
}

impl Retriever {
    /// `configured_model` is replaced by the known model matching the store's width when they disagree.
    pub fn new(embedder: Embedder, store: VectorStore, chunks_dir: impl Into<PathBuf>, configured_model: &str) -> Result<Self> {
        let model = resolve_model(configured_model, store.dim())?;
        Ok(Self { embedder, store, chunks_dir: chunks_dir.into(), model })
    }

    /// Opens the persisted store under `paths.vector`.
    pub fn from_settings(settings: &Settings, budget: Option<Arc<dyn BudgetGuard>>) -> Result<Self> {
        let store = VectorStore::open_existing(&settings.paths.vector_dir())?;
        let embedder = embedder_from_settings(settings, budget)?;
        Self::new(embedder, store, settings.paths.chunks_dir(), &settings.embedding.model)
    }

    pub fn model(&self) -> &str { &self.model }

    pub fn store(&self) -> &VectorStore { &self.store }

    pub fn query(&self, text: &str, k: usize, return_text: bool) -> Result<Vec<RankedHit>> {
        self.query_multi(&[text], k, return_text, false)
    }

    pub fn query_file(&self, path: &Path, k: usize, return_text: bool) -> Result<Vec<RankedHit>> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::NotFound(format!("{}: {e}", path.display())))?;
        self.query(&text, k, return_text)
    }

    /// With `aggregate`, chunk hits roll up to their parent document (mean of chunk
    /// scores, chunk texts newline-joined in rank order) before truncation to `k`.
    pub fn query_multi<S: AsRef<str>>(&self, texts: &[S], k: usize, return_text: bool, aggregate: bool) -> Result<Vec<RankedHit>> {
        if texts.is_empty() || k == 0 { return Ok(Vec::new()); }
        let mut sums: BTreeMap<String, f32> = BTreeMap::new();
        for text in texts {
            let vector = self.embedder.embed(text.as_ref(), &self.model)?;
            let hits = self.store.search(&vector, k)?;
            debug!(hits = hits.len(), "query searched");
            for (id, score) in hits {
                *sums.entry(id).or_insert(0.0) += score;
            }
        }
        let n = texts.len() as f32;
        let mut merged: Vec<(String, f32)> = sums.into_iter().map(|(id, s)| (id, s / n)).collect();
        sort_ranked(&mut merged);

        let results = if aggregate { self.roll_up(merged, k, return_text) } else {
            merged.truncate(k);
            merged
                .into_iter()
                .map(|(id, score)| {
                    let text = return_text.then(|| load_chunk_text(&self.chunks_dir, &id));
                    RankedHit { id, score, text }
                })
                .collect()
        };
        info!(queries = texts.len(), results = results.len(), aggregate, "retrieval complete");
        Ok(results)
    }

    fn roll_up(&self, merged: Vec<(String, f32)>, k: usize, return_text: bool) -> Vec<RankedHit> {
        let mut docs: Vec<(String, Vec<(String, f32)>)> = Vec::new();
        let mut slot: HashMap<String, usize> = HashMap::new();
        for (id, score) in merged {
            let doc = parent_doc_id(&id).unwrap_or(&id).to_string();
            let i = *slot.entry(doc.clone()).or_insert_with(|| {
                docs.push((doc, Vec::new()));
                docs.len() - 1
            });
            docs[i].1.push((id, score));
        }
        let mut ranked: Vec<(String, f32, Vec<String>)> = docs
            .into_iter()
            .map(|(doc, members)| {
                let mean = members.iter().map(|m| m.1).sum::<f32>() / members.len() as f32;
                (doc, mean, members.into_iter().map(|m| m.0).collect())
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
            .into_iter()
            .map(|(id, score, members)| {
                let text = return_text.then(|| {
                    members
                        .iter()
                        .map(|m| load_chunk_text(&self.chunks_dir, m))
                        .filter(|t| !t.is_empty())
                        .collect::<Vec<_>>()
                        .join("\n")
                });
                RankedHit { id, score, text }
            })
            .collect()
    }
}

fn sort_ranked(hits: &mut [(String, f32)]) {
    hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
}

/// The configured model when its width matches the index, otherwise the first known model of that width.
pub fn resolve_model(configured: &str, index_dim: usize) -> Result<String> {
    if spec(configured).is_ok_and(|s| s.dim == index_dim) { return Ok(configured.to_string()); }
    match model_for_dim(index_dim) {
        Some(m) => {
            warn!(configured, inferred = m.name, index_dim, "configured model does not match index width; switching");
            Ok(m.name.to_string())
        }
        None => Err(Error::InvalidConfig(format!("no known embedding model produces {index_dim}-dimensional vectors"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_follows_index_width() {
        assert_eq!(resolve_model("text-embedding-3-small", 1536).unwrap(), "text-embedding-3-small");
        assert_eq!(resolve_model("text-embedding-ada-002", 1536).unwrap(), "text-embedding-ada-002");
        assert_eq!(resolve_model("text-embedding-3-small", 3072).unwrap(), "text-embedding-3-large");
        assert_eq!(resolve_model("mystery-model", 1536).unwrap(), "text-embedding-3-small");
        assert!(matches!(resolve_model("text-embedding-3-small", 7), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn ranking_breaks_ties_by_id() {
        let mut hits = vec![("b".to_string(), 0.5), ("a".to_string(), 0.5), ("c".to_string(), 0.9)];
        sort_ranked(&mut hits);
        assert_eq!(hits.iter().map(|h| h.0.as_str()).collect::<Vec<_>>(), vec!["c", "a", "b"]);
    }
}
