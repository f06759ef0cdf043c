pub fn sq_euclidean(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum() }

pub fn euclidean(a: &[f32], b: &[f32]) -> f32 { sq_euclidean(a, b).sqrt() }

pub fn dot(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

pub fn normalize(v: &mut [f32]) {
    let norm = dot(v, v).sqrt();
    if norm > 1e-12 { for x in v.iter_mut() { *x /= norm; } }
}

/// Full symmetric pairwise distance matrix.
pub fn distance_matrix(data: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let n = data.len();
    let mut d = vec![vec![0f32; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let v = euclidean(&data[i], &data[j]);
            d[i][j] = v;
            d[j][i] = v;
        }
    }
    d
}

/// Indices of the `k` nearest other points per row, nearest first; ties by index.
pub fn knn(dist: &[Vec<f32>], k: usize) -> Vec<Vec<usize>> {
    dist.iter()
        .enumerate()
        .map(|(i, row)| {
            let mut idx: Vec<usize> = (0..row.len()).filter(|&j| j != i).collect();
            idx.sort_by(|&a, &b| row[a].total_cmp(&row[b]).then(a.cmp(&b)));
            idx.truncate(k);
            idx
        })
        .collect()
}
