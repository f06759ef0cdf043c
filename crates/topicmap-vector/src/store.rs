use std::path::{Path, PathBuf};
use tracing::{info, warn};

use topicmap_core::error::{Error, Result};

use crate::id_map::IdMap;
use crate::index::{stored_dimension, FlatIndex};

pub const INDEX_FILE: &str = "index.bin";
pub const ID_MAP_FILE: &str = "id_map.json";

/// Index file and ID map in one directory, treated as a single unit.
///
/// Single writer only: nothing guards the directory against concurrent processes.
pub struct VectorStore {
    dir: PathBuf,
    index: FlatIndex,
    id_map: IdMap,
}

impl VectorStore {
    /// Opens (or starts) a store of dimension `dim` under `dir`.
    pub fn open(dir: &Path, dim: usize) -> Result<Self> {
        let index_path = dir.join(INDEX_FILE);
        let map_path = dir.join(ID_MAP_FILE);
        if index_path.exists() != map_path.exists() {
            return Err(Error::Format(format!(
                "{}: index and id map must exist together; reset the store and rebuild",
                dir.display()
            )));
        }
        let index = FlatIndex::open(index_path, dim)?;
        let id_map = IdMap::load(&map_path)?;
        Ok(Self { dir: dir.to_path_buf(), index, id_map })
    }

    /// Opens an existing store using the dimension recorded in its index file.
    pub fn open_existing(dir: &Path) -> Result<Self> {
        let dim = Self::stored_dimension(dir)?.ok_or_else(|| Error::NotFound(format!("no vector index in {}", dir.display())))?;
        Self::open(dir, dim)
    }

    pub fn stored_dimension(dir: &Path) -> Result<Option<usize>> { stored_dimension(&dir.join(INDEX_FILE)) }

    /// Deletes the index and the ID map. The only supported way to start over.
    pub fn reset(dir: &Path) -> Result<()> {
        for name in [INDEX_FILE, ID_MAP_FILE] {
            let path = dir.join(name);
            if path.exists() { std::fs::remove_file(&path)?; }
        }
        info!(dir = %dir.display(), "vector store reset");
        Ok(())
    }

    pub fn dir(&self) -> &Path { &self.dir }

    pub fn dim(&self) -> usize { self.index.dim() }

    pub fn len(&self) -> usize { self.index.len() }

    pub fn is_empty(&self) -> bool { self.index.is_empty() }

    pub fn id_map(&self) -> &IdMap { &self.id_map }

    /// Empties the index and the ID map in memory, keeping the dimension.
    pub fn clear(&mut self) {
        self.index.clear();
        self.id_map = IdMap::new();
    }

    /// Hashes and records every id before touching the index; a collision or width error adds nothing.
    pub fn add(&mut self, ids: &[String], vectors: &[Vec<f32>]) -> Result<()> {
        if ids.len() != vectors.len() {
            return Err(Error::Operation(format!("{} ids for {} vectors", ids.len(), vectors.len())));
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dim()) {
            return Err(Error::DimensionMismatch { expected: self.dim(), actual: v.len() });
        }
        let mut staged = self.id_map.clone();
        let hashed = ids.iter().map(|id| staged.assign(id)).collect::<Result<Vec<_>>>()?;
        self.index.add(&hashed, vectors)?;
        self.id_map = staged;
        Ok(())
    }

    /// Hits with their original identifiers. Rows missing from the ID map are skipped.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let hits = self.index.search(query, k)?;
        Ok(hits
            .into_iter()
            .filter_map(|(hashed, score)| match self.id_map.get(hashed) {
                Some(id) => Some((id.to_string(), score)),
                None => {
                    warn!(hashed, "indexed id missing from id map");
                    None
                }
            })
            .collect())
    }

    /// Writes the ID map and then the index.
    pub fn persist(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        self.id_map.save(&self.dir.join(ID_MAP_FILE))?;
        self.index.persist()?;
        info!(dir = %self.dir.display(), rows = self.len(), "persisted vector store");
        Ok(())
    }
}
