//! Euclidean k-means with k-means++ seeding and several restarts.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::math::sq_euclidean;

const MAX_ITERATIONS: usize = 100;
const CONVERGENCE_TOLERANCE: f32 = 1e-6;
const RESTARTS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    pub centroids: Vec<Vec<f32>>,
    pub assignments: Vec<usize>,
    pub inertia: f32,
}

/// Best of several seeded runs by inertia. `k` is clamped to `[1, n]`.
pub fn kmeans(data: &[Vec<f32>], k: usize, seed: u64) -> KMeansResult {
    let n = data.len();
    if n == 0 { return KMeansResult { centroids: vec![], assignments: vec![], inertia: 0.0 }; }
    let k = k.clamp(1, n);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut best: Option<KMeansResult> = None;
    for _ in 0..RESTARTS {
        let run = lloyd(data, init_plus_plus(data, k, &mut rng), &mut rng);
        if best.as_ref().map_or(true, |b| run.inertia < b.inertia) { best = Some(run); }
    }
    best.unwrap_or_else(|| lloyd(data, init_plus_plus(data, k, &mut rng), &mut rng))
}

fn init_plus_plus(data: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let mut centroids = vec![data[rng.gen_range(0..data.len())].clone()];
    while centroids.len() < k {
        let d2: Vec<f32> = data
            .iter()
            .map(|p| centroids.iter().map(|c| sq_euclidean(p, c)).fold(f32::MAX, f32::min))
            .collect();
        let total: f32 = d2.iter().sum();
        if total <= f32::EPSILON {
            centroids.push(data[rng.gen_range(0..data.len())].clone());
            continue;
        }
        let mut target = rng.gen::<f32>() * total;
        let mut chosen = data.len() - 1;
        for (i, w) in d2.iter().enumerate() {
            if target <= *w { chosen = i; break; }
            target -= w;
        }
        centroids.push(data[chosen].clone());
    }
    centroids
}

fn nearest(p: &[f32], centroids: &[Vec<f32>]) -> (usize, f32) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, sq_euclidean(p, c)))
        .fold((0, f32::MAX), |best, cur| if cur.1 < best.1 { cur } else { best })
}

fn lloyd(data: &[Vec<f32>], mut centroids: Vec<Vec<f32>>, rng: &mut StdRng) -> KMeansResult {
    let dim = data[0].len();
    let mut assignments = vec![0usize; data.len()];
    for _ in 0..MAX_ITERATIONS {
        for (a, p) in assignments.iter_mut().zip(data) { *a = nearest(p, &centroids).0; }

        let mut sums = vec![vec![0f32; dim]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (p, &a) in data.iter().zip(&assignments) {
            counts[a] += 1;
            for (s, x) in sums[a].iter_mut().zip(p) { *s += x; }
        }
        let mut movement = 0f32;
        for (c, (sum, count)) in centroids.iter_mut().zip(sums.into_iter().zip(counts)) {
            let next = if count == 0 {
                // empty cluster: reseed from a random point
                data[rng.gen_range(0..data.len())].clone()
            } else {
                sum.into_iter().map(|s| s / count as f32).collect()
            };
            movement += sq_euclidean(c, &next);
            *c = next;
        }
        if movement < CONVERGENCE_TOLERANCE { break; }
    }
    let mut inertia = 0f32;
    for (a, p) in assignments.iter_mut().zip(data) {
        let (i, d) = nearest(p, &centroids);
        *a = i;
        inertia += d;
    }
    KMeansResult { centroids, assignments, inertia }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_two_blobs() {
        let data = vec![vec![0.0, 0.0], vec![0.1, 0.0], vec![10.0, 10.0], vec![10.1, 9.9], vec![0.0, 0.2]];
        let r = kmeans(&data, 2, 7);
        assert_eq!(r.assignments[0], r.assignments[1]);
        assert_eq!(r.assignments[0], r.assignments[4]);
        assert_eq!(r.assignments[2], r.assignments[3]);
        assert_ne!(r.assignments[0], r.assignments[2]);
    }

    #[test]
    fn same_seed_same_result() {
        let data: Vec<Vec<f32>> = (0..20).map(|i| vec![(i % 5) as f32, (i / 5) as f32]).collect();
        assert_eq!(kmeans(&data, 3, 42), kmeans(&data, 3, 42));
    }

    #[test]
    fn k_is_clamped_to_points() {
        let r = kmeans(&[vec![1.0], vec![2.0]], 5, 1);
        assert_eq!(r.centroids.len(), 2);
    }
}
