//! Similarity-graph partition: kNN connectivity affinity, normalized spectral embedding, k-means.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use topicmap_core::config::ClusterSettings;
use topicmap_core::error::{Error, Result};

use crate::backend::Clusterer;
use crate::kmeans::kmeans;
use crate::math::{distance_matrix, dot, knn, normalize};

const POWER_ITERATIONS: usize = 300;

/// `n_clusters` and `graph_neighbors` come from the settings; callers clamp them to the corpus.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpectralClusterer;

impl Clusterer for SpectralClusterer {
    fn fit(&self, data: &[Vec<f32>], params: &ClusterSettings) -> Result<Vec<i32>> {
        let n = data.len();
        let k = params.n_clusters;
        if k == 0 || k > n {
            return Err(Error::Operation(format!("spectral clustering needs 1..={n} clusters, got {k}")));
        }
        let neighbors = params.graph_neighbors.clamp(1, n.saturating_sub(1).max(1));
        let affinity = connectivity(data, neighbors);
        let embedding = spectral_embedding(&affinity, k, params.seed);
        let result = kmeans(&embedding, k, params.seed);
        Ok(result.assignments.into_iter().map(|a| a as i32).collect())
    }
}

/// Symmetrized kNN connectivity: `0.5 * (A + Aᵀ)` with `A[i][j] = 1` when j is among i's neighbors.
fn connectivity(data: &[Vec<f32>], neighbors: usize) -> Vec<Vec<f32>> {
    let n = data.len();
    let nn = knn(&distance_matrix(data), neighbors);
    let mut a = vec![vec![0f32; n]; n];
    for (i, row) in nn.iter().enumerate() {
        for &j in row {
            a[i][j] += 0.5;
            a[j][i] += 0.5;
        }
    }
    a
}

/// Top-`k` eigenvectors of `D^-1/2 A D^-1/2` by orthogonal iteration, rows L2-normalised.
fn spectral_embedding(affinity: &[Vec<f32>], k: usize, seed: u64) -> Vec<Vec<f32>> {
    let n = affinity.len();
    let inv_sqrt_deg: Vec<f32> = affinity
        .iter()
        .map(|row| { let d: f32 = row.iter().sum(); if d > 0.0 { 1.0 / d.sqrt() } else { 0.0 } })
        .collect();
    // shift by I so every eigenvalue is non-negative and the largest dominate
    let m: Vec<Vec<f32>> = (0..n)
        .map(|i| (0..n).map(|j| affinity[i][j] * inv_sqrt_deg[i] * inv_sqrt_deg[j] + if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut basis: Vec<Vec<f32>> = (0..k).map(|_| (0..n).map(|_| rng.gen::<f32>() - 0.5).collect()).collect();
    orthonormalize(&mut basis);
    for _ in 0..POWER_ITERATIONS {
        basis = basis.iter().map(|v| m.iter().map(|row| dot(row, v)).collect()).collect();
        orthonormalize(&mut basis);
    }

    (0..n)
        .map(|i| {
            let mut row: Vec<f32> = basis.iter().map(|v| v[i] * inv_sqrt_deg[i]).collect();
            normalize(&mut row);
            row
        })
        .collect()
}

/// Modified Gram-Schmidt. A collapsed vector is replaced by a unit axis.
fn orthonormalize(vectors: &mut [Vec<f32>]) {
    for i in 0..vectors.len() {
        let (done, rest) = vectors.split_at_mut(i);
        let v = &mut rest[0];
        for u in done.iter() {
            let p = dot(v, u);
            for (x, y) in v.iter_mut().zip(u) { *x -= p * y; }
        }
        if dot(v, v).sqrt() < 1e-8 {
            let axis = i % v.len();
            v.iter_mut().enumerate().for_each(|(j, x)| *x = if j == axis { 1.0 } else { 0.0 });
        }
        normalize(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_disconnected_groups() {
        let mut data: Vec<Vec<f32>> = (0..5).map(|i| vec![i as f32 * 0.1, 0.0]).collect();
        data.extend((0..5).map(|i| vec![20.0 + i as f32 * 0.1, 20.0]));
        let params = ClusterSettings { n_clusters: 2, graph_neighbors: 3, ..ClusterSettings::default() };
        let labels = SpectralClusterer.fit(&data, &params).unwrap();
        assert!(labels[..5].iter().all(|&l| l == labels[0]));
        assert!(labels[5..].iter().all(|&l| l == labels[5]));
        assert_ne!(labels[0], labels[5]);
    }

    #[test]
    fn too_many_clusters_is_an_error() {
        let params = ClusterSettings { n_clusters: 4, ..ClusterSettings::default() };
        assert!(SpectralClusterer.fit(&[vec![0.0], vec![1.0]], &params).is_err());
    }
}
