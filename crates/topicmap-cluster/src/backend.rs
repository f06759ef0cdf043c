use std::collections::BTreeMap;
use tracing::{debug, warn};

use topicmap_core::config::{ClusterMethod, ClusterSettings};
use topicmap_core::error::{Error, Result};

use crate::density::DensityClusterer;
use crate::reduce::GraphReducer;
use crate::spectral::SpectralClusterer;

/// Upper bound applied to the reducer's neighbor count regardless of configuration.
pub const MAX_REDUCE_NEIGHBORS: usize = 15;

pub trait Reducer: Send + Sync {
    /// `n_neighbors` is already clamped to `1..data.len()`.
    fn reduce(&self, data: &[Vec<f32>], n_neighbors: usize, min_dist: f32) -> Result<Vec<[f32; 2]>>;
}

pub trait Clusterer: Send + Sync {
    fn fit(&self, data: &[Vec<f32>], params: &ClusterSettings) -> Result<Vec<i32>>;
}

/// Reduction and clustering implementations, chosen once at construction.
///
/// The small-corpus guard rails live here so every implementation gets them.
#[derive(Default)]
pub struct ClusterBackend {
    reducer: Option<Box<dyn Reducer>>,
    clusterers: BTreeMap<ClusterMethod, Box<dyn Clusterer>>,
}

impl ClusterBackend {
    /// Built-in reducer plus both clustering strategies.
    pub fn builtin(settings: &ClusterSettings) -> Self {
        Self::default()
            .with_reducer(Box::new(GraphReducer { seed: settings.seed, epochs: settings.epochs }))
            .with_clusterer(ClusterMethod::Density, Box::new(DensityClusterer))
            .with_clusterer(ClusterMethod::Spectral, Box::new(SpectralClusterer))
    }

    #[must_use]
    pub fn with_reducer(mut self, reducer: Box<dyn Reducer>) -> Self {
        self.reducer = Some(reducer);
        self
    }

    #[must_use]
    pub fn with_clusterer(mut self, method: ClusterMethod, clusterer: Box<dyn Clusterer>) -> Self {
        self.clusterers.insert(method, clusterer);
        self
    }

    pub fn has_reducer(&self) -> bool { self.reducer.is_some() }

    pub fn supports(&self, method: ClusterMethod) -> bool { self.clusterers.contains_key(&method) }

    pub fn require(&self, method: ClusterMethod) -> Result<()> {
        if self.supports(method) { Ok(()) } else { Err(Error::Unavailable(format!("no {method:?} clustering implementation configured"))) }
    }

    pub fn require_reducer(&self) -> Result<()> {
        if self.has_reducer() { Ok(()) } else { Err(Error::Unavailable("no dimensionality reducer configured".into())) }
    }

    /// N=0 gives no rows, N=1 the origin; otherwise neighbors are clamped to `min(n_neighbors, 15, N-1)`.
    pub fn reduce(&self, data: &[Vec<f32>], n_neighbors: usize, min_dist: f32) -> Result<Vec<[f32; 2]>> {
        let reducer = self.reducer.as_ref().ok_or_else(|| Error::Unavailable("no dimensionality reducer configured".into()))?;
        match data.len() {
            0 => Ok(Vec::new()),
            1 => Ok(vec![[0.0, 0.0]]),
            n => {
                let k = n_neighbors.min(MAX_REDUCE_NEIGHBORS).min(n - 1).max(1);
                debug!(points = n, n_neighbors = k, "reducing");
                let coords = reducer.reduce(data, k, min_dist)?;
                if coords.len() != n {
                    return Err(Error::Operation(format!("reducer returned {} rows for {n} points", coords.len())));
                }
                Ok(coords)
            }
        }
    }

    /// Density: fewer than `min_cluster_size` points collapse to cluster 0.
    /// Spectral: `N <= 2` collapses to cluster 0, otherwise `n_clusters` is clamped to `N-1`.
    pub fn cluster(&self, data: &[Vec<f32>], method: ClusterMethod, params: &ClusterSettings) -> Result<Vec<i32>> {
        let clusterer = self
            .clusterers
            .get(&method)
            .ok_or_else(|| Error::Unavailable(format!("no {method:?} clustering implementation configured")))?;
        let n = data.len();
        let labels = match method {
            ClusterMethod::Density if n < params.min_cluster_size => {
                debug!(points = n, min_cluster_size = params.min_cluster_size, "corpus below minimum cluster size; single cluster");
                vec![0; n]
            }
            ClusterMethod::Spectral if n <= 2 => {
                debug!(points = n, "corpus too small for spectral partition; single cluster");
                vec![0; n]
            }
            ClusterMethod::Spectral => {
                let clamped = ClusterSettings { n_clusters: params.n_clusters.min(n - 1).max(1), ..params.clone() };
                clusterer.fit(data, &clamped)?
            }
            ClusterMethod::Density => clusterer.fit(data, params)?,
        };
        if labels.len() != n {
            return Err(Error::Operation(format!("clusterer returned {} labels for {n} points", labels.len())));
        }
        Ok(labels)
    }

    /// Spectral with a density fallback when the spectral implementation is missing or fails.
    pub fn cluster_or_density(&self, data: &[Vec<f32>], method: ClusterMethod, params: &ClusterSettings) -> Result<Vec<i32>> {
        if method == ClusterMethod::Density { return self.cluster(data, method, params); }
        match self.cluster(data, method, params) {
            Ok(labels) => Ok(labels),
            Err(e) => {
                warn!(error = %e, "spectral clustering unavailable or failed; using density clustering");
                self.cluster(data, ClusterMethod::Density, params)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ClusterSettings { ClusterSettings { min_cluster_size: 3, ..ClusterSettings::default() } }

    #[test]
    fn reduce_guards() {
        let b = ClusterBackend::builtin(&settings());
        assert!(b.reduce(&[], 15, 0.1).unwrap().is_empty());
        assert_eq!(b.reduce(&[vec![3.0, 4.0]], 15, 0.1).unwrap(), vec![[0.0, 0.0]]);
        assert_eq!(b.reduce(&[vec![0.0], vec![1.0], vec![5.0]], 15, 0.1).unwrap().len(), 3);
    }

    #[test]
    fn small_corpora_collapse_to_one_cluster() {
        let b = ClusterBackend::builtin(&settings());
        let two = vec![vec![0.0], vec![9.0]];
        assert_eq!(b.cluster(&two, ClusterMethod::Density, &settings()).unwrap(), vec![0, 0]);
        assert_eq!(b.cluster(&two, ClusterMethod::Spectral, &settings()).unwrap(), vec![0, 0]);
    }

    #[test]
    fn missing_implementations_are_unavailable() {
        let b = ClusterBackend::default();
        assert!(matches!(b.require(ClusterMethod::Spectral), Err(Error::Unavailable(_))));
        assert!(matches!(b.reduce(&[vec![1.0]], 5, 0.1), Err(Error::Unavailable(_))));
    }

    #[test]
    fn spectral_falls_back_to_density() {
        let b = ClusterBackend::default().with_clusterer(ClusterMethod::Density, Box::new(DensityClusterer));
        let data = vec![vec![0.0], vec![0.1], vec![0.2], vec![9.0], vec![9.1], vec![9.2]];
        let labels = b.cluster_or_density(&data, ClusterMethod::Spectral, &settings()).unwrap();
        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1]);
    }
}
