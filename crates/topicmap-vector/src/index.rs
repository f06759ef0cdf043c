//! Exact (brute-force) inner-product index with single-file persistence.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use topicmap_core::error::{Error, Result};

/// Id reported for "no match"; never returned from [`FlatIndex::search`] and never accepted by `add`.
pub const NO_MATCH: i64 = -1;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    version: u32,
    dim: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Rows {
    ids: Vec<i64>,
    data: Vec<f32>,
}

/// Dimension fixed at construction; rows stored contiguously in insertion order.
pub struct FlatIndex {
    path: PathBuf,
    dim: usize,
    rows: Rows,
    positions: HashMap<i64, usize>,
}

impl FlatIndex {
    /// Opens the index at `path`, loading it when the file exists.
    pub fn open(path: impl Into<PathBuf>, dim: usize) -> Result<Self> {
        if dim == 0 { return Err(Error::InvalidConfig("index dimension must be positive".into())); }
        let path = path.into();
        let mut index = Self { path, dim, rows: Rows::default(), positions: HashMap::new() };
        if index.path.exists() { index.load()?; }
        Ok(index)
    }

    /// Drops every row in memory; the file changes on the next `persist`.
    pub fn clear(&mut self) {
        self.rows = Rows::default();
        self.positions.clear();
    }

    /// Replaces the in-memory rows with the file contents.
    pub fn load(&mut self) -> Result<()> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let header = read_header(&mut reader, &self.path)?;
        if header.dim != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: header.dim });
        }
        let rows: Rows = bincode::deserialize_from(&mut reader)?;
        if rows.data.len() != rows.ids.len() * self.dim {
            return Err(Error::Format(format!("{}: {} ids but {} values", self.path.display(), rows.ids.len(), rows.data.len())));
        }
        self.positions = rows.ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        self.rows = rows;
        info!(path = %self.path.display(), rows = self.len(), dim = self.dim, "loaded vector index");
        Ok(())
    }

    /// Writes the whole index to its path (temp file + rename).
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() { std::fs::create_dir_all(parent)?; }
        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            bincode::serialize_into(&mut writer, &Header { version: FORMAT_VERSION, dim: self.dim })?;
            bincode::serialize_into(&mut writer, &self.rows)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), rows = self.len(), "persisted vector index");
        Ok(())
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize { self.rows.ids.len() }

    pub fn is_empty(&self) -> bool { self.rows.ids.is_empty() }

    pub fn path(&self) -> &Path { &self.path }

    pub fn contains(&self, id: i64) -> bool { self.positions.contains_key(&id) }

    /// Adds rows; an id already present has its vector replaced.
    pub fn add(&mut self, ids: &[i64], vectors: &[Vec<f32>]) -> Result<()> {
        if ids.len() != vectors.len() {
            return Err(Error::Operation(format!("{} ids for {} vectors", ids.len(), vectors.len())));
        }
        for (&id, v) in ids.iter().zip(vectors) {
            self.check_dim(v)?;
            if id < 0 { return Err(Error::Operation(format!("negative id {id} is reserved"))); }
        }
        for (&id, v) in ids.iter().zip(vectors) {
            match self.positions.get(&id) {
                Some(&row) => self.rows.data[row * self.dim..(row + 1) * self.dim].copy_from_slice(v),
                None => {
                    self.positions.insert(id, self.rows.ids.len());
                    self.rows.ids.push(id);
                    self.rows.data.extend_from_slice(v);
                }
            }
        }
        Ok(())
    }

    /// Top `k` rows by dot product, descending; equal scores order by id ascending.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>> {
        self.check_dim(query)?;
        let mut scored: Vec<(i64, f32)> = self
            .rows
            .ids
            .iter()
            .zip(self.rows.data.chunks_exact(self.dim))
            .filter(|(&id, _)| id != NO_MATCH)
            .map(|(&id, row)| (id, row.iter().zip(query).map(|(a, b)| a * b).sum::<f32>()))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    fn check_dim(&self, v: &[f32]) -> Result<()> {
        if v.len() == self.dim { Ok(()) } else { Err(Error::DimensionMismatch { expected: self.dim, actual: v.len() }) }
    }
}

/// Dimension recorded in an index file without reading its rows; `None` when the file is absent.
pub fn stored_dimension(path: &Path) -> Result<Option<usize>> {
    if !path.exists() { return Ok(None); }
    let mut reader = BufReader::new(File::open(path)?);
    Ok(Some(read_header(&mut reader, path)?.dim))
}

fn read_header(reader: &mut BufReader<File>, path: &Path) -> Result<Header> {
    let header: Header = bincode::deserialize_from(reader)?;
    if header.version != FORMAT_VERSION {
        return Err(Error::Format(format!("{}: unsupported index version {}", path.display(), header.version)));
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn search_orders_by_inner_product() {
        let dir = TempDir::new().unwrap();
        let mut idx = FlatIndex::open(dir.path().join("index.bin"), 2).unwrap();
        idx.add(&[10, 20, 30], &[vec![1.0, 0.0], vec![0.5, 0.5], vec![0.0, 1.0]]).unwrap();
        let hits = idx.search(&[1.0, 0.2], 2).unwrap();
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(idx.search(&[1.0, 0.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn equal_scores_break_by_id() {
        let dir = TempDir::new().unwrap();
        let mut idx = FlatIndex::open(dir.path().join("index.bin"), 1).unwrap();
        idx.add(&[7, 3, 5], &[vec![1.0], vec![1.0], vec![1.0]]).unwrap();
        assert_eq!(idx.search(&[1.0], 3).unwrap().iter().map(|h| h.0).collect::<Vec<_>>(), vec![3, 5, 7]);
    }

    #[test]
    fn dimension_is_enforced() {
        let dir = TempDir::new().unwrap();
        let mut idx = FlatIndex::open(dir.path().join("index.bin"), 3).unwrap();
        assert!(matches!(idx.add(&[1], &[vec![1.0]]), Err(Error::DimensionMismatch { expected: 3, actual: 1 })));
        assert!(matches!(idx.search(&[1.0, 2.0], 1), Err(Error::DimensionMismatch { .. })));
        assert!(idx.add(&[NO_MATCH], &[vec![0.0; 3]]).is_err());
        assert!(idx.is_empty());
    }

    #[test]
    fn re_adding_an_id_replaces_its_vector() {
        let dir = TempDir::new().unwrap();
        let mut idx = FlatIndex::open(dir.path().join("index.bin"), 2).unwrap();
        idx.add(&[1], &[vec![1.0, 0.0]]).unwrap();
        idx.add(&[1], &[vec![0.0, 1.0]]).unwrap();
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.search(&[0.0, 1.0], 1).unwrap(), vec![(1, 1.0)]);
    }
}
