//! HDBSCAN-style density clustering.
//!
//! 1. Core distance: distance to the `min_samples`-th nearest point (the point itself counts).
//! 2. Mutual reachability `max(core(a), core(b), d(a, b))`.
//! 3. Minimum spanning tree (Prim) over mutual reachability, then single linkage.
//! 4. Condensed tree with `min_cluster_size`, cluster selection by excess of mass.
//!
//! Points that leave the hierarchy outside every selected cluster are labelled
//! [`NOISE_CLUSTER`]. The root is never selected, so a corpus with no stable split is
//! all noise.

use topicmap_core::config::ClusterSettings;
use topicmap_core::error::Result;
use topicmap_core::types::NOISE_CLUSTER;

use crate::backend::Clusterer;
use crate::math::distance_matrix;

/// Upper bound on lambda for zero-distance merges.
const MAX_LAMBDA: f64 = 1e12;

#[derive(Debug, Default, Clone, Copy)]
pub struct DensityClusterer;

impl Clusterer for DensityClusterer {
    fn fit(&self, data: &[Vec<f32>], params: &ClusterSettings) -> Result<Vec<i32>> {
        let min_samples = params.min_samples.unwrap_or(params.min_cluster_size).max(1);
        Ok(hdbscan(data, params.min_cluster_size.max(2), min_samples))
    }
}

pub fn hdbscan(data: &[Vec<f32>], min_cluster_size: usize, min_samples: usize) -> Vec<i32> {
    let n = data.len();
    if n < 2 { return vec![NOISE_CLUSTER; n]; }
    let dist = distance_matrix(data);
    let core = core_distances(&dist, min_samples);
    let mst = prim_mst(&dist, &core);
    let tree = single_linkage(&mst, n);
    let condensed = condense(&tree, n, min_cluster_size);
    let selected = select_eom(&condensed);
    label_points(&condensed, &selected, n)
}

fn core_distances(dist: &[Vec<f32>], min_samples: usize) -> Vec<f32> {
    dist.iter()
        .map(|row| {
            let mut sorted = row.clone();
            sorted.sort_by(f32::total_cmp);
            sorted[(min_samples - 1).min(sorted.len() - 1)]
        })
        .collect()
}

/// Edges `(a, b, weight)` sorted ascending by weight.
fn prim_mst(dist: &[Vec<f32>], core: &[f32]) -> Vec<(usize, usize, f32)> {
    let n = dist.len();
    let reach = |i: usize, j: usize| dist[i][j].max(core[i]).max(core[j]);
    let mut in_tree = vec![false; n];
    let mut best = vec![f32::MAX; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);
    in_tree[0] = true;
    for j in 1..n { best[j] = reach(0, j); }
    for _ in 1..n {
        let mut next = usize::MAX;
        for j in 0..n {
            if !in_tree[j] && (next == usize::MAX || best[j] < best[next]) { next = j; }
        }
        in_tree[next] = true;
        edges.push((from[next], next, best[next]));
        for j in 0..n {
            if !in_tree[j] {
                let r = reach(next, j);
                if r < best[j] { best[j] = r; from[j] = next; }
            }
        }
    }
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));
    edges
}

/// Dendrogram node `n + i` merges `left` and `right` at `distance`.
struct Merge {
    left: usize,
    right: usize,
    distance: f32,
    size: usize,
}

fn single_linkage(mst: &[(usize, usize, f32)], n: usize) -> Vec<Merge> {
    fn find(parent: &mut [usize], i: usize) -> usize {
        let mut root = i;
        while parent[root] != root { root = parent[root]; }
        let mut cur = i;
        while parent[cur] != root { let next = parent[cur]; parent[cur] = root; cur = next; }
        root
    }
    let mut parent: Vec<usize> = (0..2 * n - 1).collect();
    let mut size = vec![1usize; 2 * n - 1];
    let mut merges = Vec::with_capacity(n - 1);
    for (i, &(a, b, d)) in mst.iter().enumerate() {
        let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
        let node = n + i;
        parent[ra] = node;
        parent[rb] = node;
        size[node] = size[ra] + size[rb];
        merges.push(Merge { left: ra, right: rb, distance: d, size: size[node] });
    }
    merges
}

/// Row of the condensed tree. `child` is a point index when `child_size == 1` and
/// `is_point`, otherwise a condensed cluster id.
struct Condensed {
    parent: usize,
    child: usize,
    lambda: f64,
    child_size: usize,
    is_point: bool,
}

struct CondensedTree {
    rows: Vec<Condensed>,
    /// Birth lambda per condensed cluster id; cluster 0 is the root.
    birth: Vec<f64>,
}

fn lambda_of(distance: f32) -> f64 {
    if distance > 0.0 { (1.0 / f64::from(distance)).min(MAX_LAMBDA) } else { MAX_LAMBDA }
}

fn condense(tree: &[Merge], n: usize, min_cluster_size: usize) -> CondensedTree {
    let node_size = |node: usize| if node < n { 1 } else { tree[node - n].size };
    let leaves = |node: usize| -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(x) = stack.pop() {
            if x < n { out.push(x); } else { stack.push(tree[x - n].left); stack.push(tree[x - n].right); }
        }
        out
    };

    let mut rows = Vec::new();
    let mut birth = vec![0.0];
    let root = 2 * n - 2;
    // (dendrogram node, condensed cluster it belongs to)
    let mut queue = std::collections::VecDeque::from([(root, 0usize)]);
    while let Some((node, cluster)) = queue.pop_front() {
        if node < n { continue; }
        let m = &tree[node - n];
        let lambda = lambda_of(m.distance);
        let (ls, rs) = (node_size(m.left), node_size(m.right));
        let fall_out = |rows: &mut Vec<Condensed>, sub: usize| {
            for p in leaves(sub) { rows.push(Condensed { parent: cluster, child: p, lambda, child_size: 1, is_point: true }); }
        };
        match (ls >= min_cluster_size, rs >= min_cluster_size) {
            (true, true) => {
                for (child, size) in [(m.left, ls), (m.right, rs)] {
                    let id = birth.len();
                    birth.push(lambda);
                    rows.push(Condensed { parent: cluster, child: id, lambda, child_size: size, is_point: false });
                    queue.push_back((child, id));
                }
            }
            (false, false) => { fall_out(&mut rows, m.left); fall_out(&mut rows, m.right); }
            (true, false) => { fall_out(&mut rows, m.right); queue.push_back((m.left, cluster)); }
            (false, true) => { fall_out(&mut rows, m.left); queue.push_back((m.right, cluster)); }
        }
    }
    CondensedTree { rows, birth }
}

/// Excess-of-mass selection; returns a flag per condensed cluster id.
fn select_eom(tree: &CondensedTree) -> Vec<bool> {
    let k = tree.birth.len();
    let mut stability = vec![0f64; k];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); k];
    for r in &tree.rows {
        stability[r.parent] += (r.lambda - tree.birth[r.parent]) * r.child_size as f64;
        if !r.is_point { children[r.parent].push(r.child); }
    }
    let mut selected = vec![false; k];
    // ids are assigned breadth-first, so children always have larger ids than parents
    for c in (1..k).rev() {
        let subtree: f64 = children[c].iter().map(|&ch| stability[ch]).sum();
        if children[c].is_empty() || stability[c] >= subtree {
            selected[c] = true;
            let mut stack = children[c].clone();
            while let Some(d) = stack.pop() { selected[d] = false; stack.extend(children[d].iter().copied()); }
        } else {
            stability[c] = subtree;
        }
    }
    selected
}

fn label_points(tree: &CondensedTree, selected: &[bool], n: usize) -> Vec<i32> {
    let mut parent_of = vec![0usize; tree.birth.len()];
    for r in tree.rows.iter().filter(|r| !r.is_point) { parent_of[r.child] = r.parent; }
    let owner = |mut c: usize| -> Option<usize> {
        loop {
            if selected[c] { return Some(c); }
            if c == 0 { return None; }
            c = parent_of[c];
        }
    };

    let mut raw = vec![None; n];
    for r in tree.rows.iter().filter(|r| r.is_point) { raw[r.child] = owner(r.parent); }

    // renumber selected clusters by first member index
    let mut remap = std::collections::HashMap::new();
    raw.iter()
        .map(|c| match c {
            Some(c) => {
                let next = remap.len() as i32;
                *remap.entry(*c).or_insert(next)
            }
            None => NOISE_CLUSTER,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(center: (f32, f32), n: usize, offset: f32) -> Vec<Vec<f32>> {
        (0..n).map(|i| vec![center.0 + offset * i as f32, center.1 - offset * (i % 2) as f32]).collect()
    }

    #[test]
    fn two_separated_blobs() {
        let mut data = blob((0.0, 0.0), 6, 0.05);
        data.extend(blob((5.0, 5.0), 6, 0.05));
        let labels = hdbscan(&data, 3, 3);
        assert!(labels[..6].iter().all(|&l| l == labels[0]));
        assert!(labels[6..].iter().all(|&l| l == labels[6]));
        assert_ne!(labels[0], labels[6]);
        assert!(!labels.contains(&NOISE_CLUSTER));
    }

    #[test]
    fn far_outlier_is_noise() {
        let mut data = blob((0.0, 0.0), 5, 0.05);
        data.extend(blob((3.0, 3.0), 5, 0.05));
        data.push(vec![40.0, -40.0]);
        let labels = hdbscan(&data, 3, 3);
        assert_eq!(labels[10], NOISE_CLUSTER);
        assert_eq!(labels[0], 0);
        assert_eq!(labels[5], 1);
    }

    #[test]
    fn duplicate_points_do_not_overflow() {
        let mut data = vec![vec![1.0, 1.0]; 4];
        data.extend(vec![vec![-1.0, -1.0]; 4]);
        let labels = hdbscan(&data, 2, 2);
        assert_eq!(labels, vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }
}
