use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use topicmap_core::config::{ClusterMethod, ClusterSettings};
use topicmap_core::embeddings::EmbeddingSet;
use topicmap_core::error::Result;
use topicmap_core::traits::{Labeler, MetadataProvider};
use topicmap_core::types::{ClusterAssignment, ClusterLabelMap, NOISE_CLUSTER};

use crate::backend::ClusterBackend;
use crate::export::{export, ExportPaths};
use crate::label::{label_clusters, resolve, snippets};

/// Outcome of one clustering run. Row `i` of `coords` and `assignment` belongs to `ids[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRun {
    pub ids: Vec<String>,
    pub coords: Vec<[f32; 2]>,
    pub assignment: Vec<i32>,
    pub labels: ClusterLabelMap,
}

impl ClusterRun {
    /// cluster id → member ids, noise included.
    pub fn members(&self) -> BTreeMap<i32, Vec<String>> {
        let mut out: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        for (id, &cid) in self.ids.iter().zip(&self.assignment) { out.entry(cid).or_default().push(id.clone()); }
        out
    }

    pub fn assignment_map(&self) -> ClusterAssignment { self.ids.iter().cloned().zip(self.assignment.iter().copied()).collect() }

    pub fn label_of(&self, member: usize) -> &str { resolve(&self.labels, self.assignment[member]) }

    pub fn cluster_count(&self) -> usize {
        let mut ids: Vec<i32> = self.assignment.iter().copied().filter(|&c| c != NOISE_CLUSTER).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

/// reduce → cluster → label → export over a full embedding set.
pub struct ClusterEngine {
    backend: ClusterBackend,
    settings: ClusterSettings,
}

impl ClusterEngine {
    /// Fails with `Unavailable` when the configured method or the reducer has no implementation.
    pub fn new(backend: ClusterBackend, settings: ClusterSettings) -> Result<Self> {
        backend.require_reducer()?;
        backend.require(settings.method)?;
        Ok(Self { backend, settings })
    }

    pub fn builtin(settings: ClusterSettings) -> Result<Self> { Self::new(ClusterBackend::builtin(&settings), settings) }

    pub fn settings(&self) -> &ClusterSettings { &self.settings }

    pub fn reduce(&self, embeddings: &[Vec<f32>], n_neighbors: usize, min_dist: f32) -> Result<Vec<[f32; 2]>> {
        self.backend.reduce(embeddings, n_neighbors, min_dist)
    }

    pub fn cluster(&self, embeddings: &[Vec<f32>], method: ClusterMethod, params: &ClusterSettings) -> Result<Vec<i32>> {
        self.backend.cluster(embeddings, method, params)
    }

    pub fn label(&self, member_texts: &BTreeMap<i32, Vec<String>>, labeler: &dyn Labeler) -> ClusterLabelMap {
        label_clusters(member_texts, labeler)
    }

    pub fn export(&self, out_dir: &Path, run: &ClusterRun, metadata: Option<&dyn MetadataProvider>) -> Result<ExportPaths> {
        export(out_dir, run, metadata)
    }

    /// Clusters on the full embeddings; the 2D projection is only for display.
    pub fn run(&self, set: &EmbeddingSet, labeler: &dyn Labeler, metadata: Option<&dyn MetadataProvider>) -> Result<ClusterRun> {
        let s = &self.settings;
        info!(members = set.len(), dim = set.dim, method = ?s.method, "clustering corpus");
        let coords = self.reduce(&set.vectors, s.n_neighbors, s.min_dist)?;
        let assignment = self.cluster(&set.vectors, s.method, s)?;
        let mut run = ClusterRun { ids: set.ids.clone(), coords, assignment, labels: ClusterLabelMap::new() };
        run.labels = self.label(&snippets(&run.members(), metadata), labeler);
        info!(clusters = run.cluster_count(), noise = run.assignment.iter().filter(|&&c| c == NOISE_CLUSTER).count(), "clustering done");
        Ok(run)
    }

    pub fn run_and_export(&self, set: &EmbeddingSet, labeler: &dyn Labeler, metadata: Option<&dyn MetadataProvider>, out_dir: &Path) -> Result<(ClusterRun, ExportPaths)> {
        let run = self.run(set, labeler, metadata)?;
        let paths = self.export(out_dir, &run, metadata)?;
        Ok((run, paths))
    }
}
