use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

use topicmap_cluster::ClusterBackend;
use topicmap_core::config::Settings;
use topicmap_core::embeddings::{write_embeddings, EmbeddingRecord};
use topicmap_core::error::Result;
use topicmap_core::types::{Chunk, Document};
use topicmap_embed::Embedder;
use topicmap_segment::TopicSegmenter;
use topicmap_vector::VectorStore;

use crate::text::write_chunk;

pub const METHOD_SEGMENTED: &str = "segmented";
pub const METHOD_WHOLE: &str = "whole";

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub method: &'static str,
    pub embeddings_file: PathBuf,
    pub vector_dir: PathBuf,
}

/// Builds the vector store, chunk side-files and embeddings file from supplied documents.
pub struct Ingestor<'a> {
    embedder: &'a Embedder,
    backend: &'a ClusterBackend,
    settings: &'a Settings,
    progress: bool,
}

impl<'a> Ingestor<'a> {
    pub fn new(embedder: &'a Embedder, backend: &'a ClusterBackend, settings: &'a Settings) -> Self {
        Self { embedder, backend, settings, progress: false }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Rebuilds `store` from `docs` alone: earlier rows are dropped, so the index, ID map
    /// and embeddings file always describe the same set of ids. Index and ID map are
    /// persisted together once every document is embedded.
    pub fn ingest(&self, docs: &[Document], store: &mut VectorStore) -> Result<IngestReport> {
        if !store.is_empty() {
            info!(dir = %store.dir().display(), rows = store.len(), "replacing previous index contents");
            store.clear();
        }
        let model = self.settings.embedding.model.as_str();
        let chunks_dir = self.settings.paths.chunks_dir();
        std::fs::create_dir_all(&chunks_dir)?;
        let segmented = self.settings.segment.enabled;
        let method = if segmented { METHOD_SEGMENTED } else { METHOD_WHOLE };
        let segmenter = TopicSegmenter::new(self.embedder, self.backend, self.settings.segment.clone());

        let pb = if self.progress { ProgressBar::new(docs.len() as u64) } else { ProgressBar::hidden() };
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}") {
            pb.set_style(style.progress_chars("#>-"));
        }

        let mut records: BTreeMap<String, EmbeddingRecord> = BTreeMap::new();
        let mut chunk_count = 0usize;
        for doc in docs {
            pb.set_message(doc.id.clone());
            let pieces = if segmented { segmenter.chunk_document(doc, model)? } else { vec![self.whole(doc)?] };
            let mut ids = Vec::with_capacity(pieces.len());
            let mut vectors = Vec::with_capacity(pieces.len());
            for (chunk, text) in &pieces {
                let vector = self.embedder.embed(text, model)?;
                write_chunk(&chunks_dir, chunk, text, &vector)?;
                records.insert(chunk.chunk_id.clone(), EmbeddingRecord { embedding: vector.clone(), source: doc.id.clone(), method: method.to_string() });
                ids.push(chunk.chunk_id.clone());
                vectors.push(vector);
            }
            store.add(&ids, &vectors)?;
            chunk_count += pieces.len();
            pb.inc(1);
        }
        pb.finish_and_clear();

        if docs.is_empty() { warn!("no documents to ingest"); }
        let embeddings_file = self.settings.paths.embeddings_path();
        write_embeddings(&embeddings_file, &records)?;
        store.persist()?;
        info!(documents = docs.len(), chunks = chunk_count, method, store_rows = store.len(), "ingest complete");
        Ok(IngestReport { documents: docs.len(), chunks: chunk_count, method, embeddings_file, vector_dir: store.dir().to_path_buf() })
    }

    fn whole(&self, doc: &Document) -> Result<(Chunk, String)> {
        let tokens = self.embedder.tokenizer().encode(&doc.text)?.len();
        let chunk = Chunk { chunk_id: doc.id.clone(), doc_id: doc.id.clone(), start_token: 0, end_token: tokens, cluster_id: 0 };
        Ok((chunk, doc.text.clone()))
    }
}
