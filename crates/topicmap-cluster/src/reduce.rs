//! Neighborhood-graph projection to 2D (UMAP-style).
//!
//! Builds a fuzzy kNN graph (per-point `rho`/`sigma` calibration, probabilistic
//! union), initialises with the two leading principal components and refines with
//! attractive edge moves plus sampled repulsion under the `1 / (1 + a d^2b)` kernel.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tracing::debug;

use topicmap_core::error::{Error, Result};

use crate::backend::Reducer;
use crate::math::{distance_matrix, dot, knn, normalize, sq_euclidean};

const NEGATIVE_SAMPLES: usize = 5;
const INIT_SCALE: f32 = 10.0;
const GRAD_CLIP: f32 = 4.0;

#[derive(Debug, Clone, Copy)]
pub struct GraphReducer {
    pub seed: u64,
    pub epochs: usize,
}

impl Default for GraphReducer {
    fn default() -> Self { Self { seed: 42, epochs: 200 } }
}

impl Reducer for GraphReducer {
    fn reduce(&self, data: &[Vec<f32>], n_neighbors: usize, min_dist: f32) -> Result<Vec<[f32; 2]>> {
        let n = data.len();
        if n_neighbors == 0 || n_neighbors >= n {
            return Err(Error::Operation(format!("n_neighbors must be in 1..{n}, got {n_neighbors}")));
        }
        let dist = distance_matrix(data);
        let edges = fuzzy_graph(&dist, n_neighbors);
        let (a, b) = fit_ab(min_dist);
        debug!(points = n, n_neighbors, edges = edges.len(), a, b, "projecting");

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut y = pca_init(data, &mut rng);
        optimize(&mut y, &edges, a, b, self.epochs, &mut rng);
        Ok(y)
    }
}

/// Symmetric weighted edges `(i, j, w)` with `i < j`.
fn fuzzy_graph(dist: &[Vec<f32>], k: usize) -> Vec<(usize, usize, f32)> {
    let n = dist.len();
    let target = (k as f32).log2().max(f32::EPSILON);
    let neighbors = knn(dist, k);
    let mut w = vec![BTreeMap::<usize, f32>::new(); n];
    for (i, nn) in neighbors.iter().enumerate() {
        let rho = nn.iter().map(|&j| dist[i][j]).find(|&d| d > 0.0).unwrap_or(0.0);
        let membership = |sigma: f32| nn.iter().map(|&j| (-((dist[i][j] - rho).max(0.0)) / sigma).exp()).sum::<f32>();
        let (mut lo, mut hi, mut sigma) = (0f32, f32::INFINITY, 1f32);
        for _ in 0..64 {
            let s = membership(sigma);
            if (s - target).abs() < 1e-5 { break; }
            if s > target { hi = sigma; sigma = (lo + hi) / 2.0; } else { lo = sigma; sigma = if hi.is_infinite() { sigma * 2.0 } else { (lo + hi) / 2.0 }; }
        }
        let sigma = sigma.max(1e-3 * dist[i].iter().sum::<f32>() / n as f32).max(f32::EPSILON);
        for &j in nn {
            w[i].insert(j, (-((dist[i][j] - rho).max(0.0)) / sigma).exp());
        }
    }
    let mut edges = Vec::new();
    for i in 0..n {
        for (&j, &wij) in &w[i] {
            let back = w[j].get(&i).copied();
            // pairs present in both directions are emitted once, from the lower index
            if i < j || back.is_none() {
                let wji = back.unwrap_or(0.0);
                edges.push((i.min(j), i.max(j), wij + wji - wij * wji));
            }
        }
    }
    edges.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
    edges
}

/// Least-squares fit of `1 / (1 + a x^2b)` to the `min_dist` offset exponential (spread 1).
fn fit_ab(min_dist: f32) -> (f32, f32) {
    let xs: Vec<f32> = (1..300).map(|i| i as f32 * 0.01).collect();
    let target: Vec<f32> = xs.iter().map(|&x| if x < min_dist { 1.0 } else { (-(x - min_dist)).exp() }).collect();
    let err = |a: f32, b: f32| xs.iter().zip(&target).map(|(&x, &t)| { let e = 1.0 / (1.0 + a * x.powf(2.0 * b)) - t; e * e }).sum::<f32>();
    let (mut best_a, mut best_b, mut best) = (1.0, 1.0, f32::MAX);
    for ia in 1..=100 {
        for ib in 1..=40 {
            let (a, b) = (ia as f32 * 0.05, 0.3 + ib as f32 * 0.04);
            let e = err(a, b);
            if e < best { best = e; best_a = a; best_b = b; }
        }
    }
    (best_a, best_b)
}

/// Leading two principal components scaled to `[-INIT_SCALE, INIT_SCALE]`, with jitter.
fn pca_init(data: &[Vec<f32>], rng: &mut StdRng) -> Vec<[f32; 2]> {
    let n = data.len();
    let dim = data[0].len();
    let mut mean = vec![0f32; dim];
    for row in data { for (m, x) in mean.iter_mut().zip(row) { *m += x / n as f32; } }
    let centered: Vec<Vec<f32>> = data.iter().map(|r| r.iter().zip(&mean).map(|(x, m)| x - m).collect()).collect();

    let mut components: Vec<Vec<f32>> = Vec::with_capacity(2);
    for _ in 0..2 {
        let mut v: Vec<f32> = (0..dim).map(|_| rng.gen::<f32>() - 0.5).collect();
        for _ in 0..100 {
            // v <- Xᵀ X v, deflated against earlier components
            let proj: Vec<f32> = centered.iter().map(|r| dot(r, &v)).collect();
            let mut next = vec![0f32; dim];
            for (r, p) in centered.iter().zip(&proj) { for (nx, x) in next.iter_mut().zip(r) { *nx += p * x; } }
            for c in &components { let d = dot(&next, c); for (nx, cx) in next.iter_mut().zip(c) { *nx -= d * cx; } }
            normalize(&mut next);
            v = next;
        }
        components.push(v);
    }

    let mut y: Vec<[f32; 2]> = centered.iter().map(|r| [dot(r, &components[0]), dot(r, &components[1])]).collect();
    let span = y.iter().flat_map(|p| p.iter().map(|c| c.abs())).fold(0f32, f32::max);
    let scale = if span > 1e-9 { INIT_SCALE / span } else { 0.0 };
    for p in &mut y {
        for c in p.iter_mut() { *c = *c * scale + (rng.gen::<f32>() - 0.5) * 1e-2; }
    }
    y
}

fn optimize(y: &mut [[f32; 2]], edges: &[(usize, usize, f32)], a: f32, b: f32, epochs: usize, rng: &mut StdRng) {
    let n = y.len();
    let max_w = edges.iter().map(|e| e.2).fold(0f32, f32::max);
    if max_w <= 0.0 { return; }
    let every: Vec<f32> = edges.iter().map(|e| if e.2 > 0.0 { max_w / e.2 } else { f32::INFINITY }).collect();
    let mut next_due = every.clone();
    let clip = |g: f32| g.clamp(-GRAD_CLIP, GRAD_CLIP);

    for epoch in 0..epochs {
        let alpha = 1.0 - epoch as f32 / epochs as f32;
        for (e, &(i, j, _)) in edges.iter().enumerate() {
            if next_due[e] > (epoch + 1) as f32 { continue; }
            next_due[e] += every[e];

            let d2 = sq_euclidean(&y[i], &y[j]);
            if d2 > 0.0 {
                let coeff = -2.0 * a * b * d2.powf(b - 1.0) / (1.0 + a * d2.powf(b));
                for c in 0..2 {
                    let g = clip(coeff * (y[i][c] - y[j][c])) * alpha;
                    y[i][c] += g;
                    y[j][c] -= g;
                }
            }
            for _ in 0..NEGATIVE_SAMPLES {
                let k = rng.gen_range(0..n);
                if k == i { continue; }
                let d2 = sq_euclidean(&y[i], &y[k]);
                let coeff = 2.0 * b / ((0.001 + d2) * (1.0 + a * d2.powf(b)));
                for c in 0..2 {
                    let g = if d2 > 0.0 { clip(coeff * (y[i][c] - y[k][c])) } else { GRAD_CLIP };
                    y[i][c] += g * alpha;
                }
            }
        }
    }
}
