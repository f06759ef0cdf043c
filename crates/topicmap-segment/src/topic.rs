//! Topic boundary detection over sliding-window embeddings.
//!
//! Windows of `window_tokens` start every `step_tokens` tokens; the last window is the
//! first one that reaches the end of the stream. Window embeddings are clustered and a
//! boundary is placed at the start of every window whose topic differs from the
//! previous window's. Spans always tile `[0, total_tokens)`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use topicmap_cluster::ClusterBackend;
use topicmap_core::config::{ClusterSettings, SegmentSettings};
use topicmap_core::error::Result;
use topicmap_core::types::{chunk_id, Chunk, Document};
use topicmap_embed::Embedder;

use crate::paragraph::chunk_pieces;

/// Windows beyond this count are projected to 2D before clustering.
const REDUCE_ABOVE: usize = 50;
const MAX_TOPICS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSpan {
    pub start: usize,
    pub end: usize,
    pub cluster_id: i32,
    pub text: String,
}

pub struct TopicSegmenter<'a> {
    embedder: &'a Embedder,
    backend: &'a ClusterBackend,
    settings: SegmentSettings,
    cluster_params: ClusterSettings,
}

impl<'a> TopicSegmenter<'a> {
    pub fn new(embedder: &'a Embedder, backend: &'a ClusterBackend, settings: SegmentSettings) -> Self {
        let cluster_params = ClusterSettings {
            method: settings.method,
            min_cluster_size: 2,
            min_samples: None,
            n_clusters: MAX_TOPICS,
            ..ClusterSettings::default()
        };
        Self { embedder, backend, settings, cluster_params }
    }

    pub fn settings(&self) -> &SegmentSettings { &self.settings }

    pub fn segment(&self, text: &str, window_tokens: usize, step_tokens: usize, model: &str) -> Result<Vec<TopicSpan>> {
        let tokenizer = self.embedder.tokenizer();
        let tokens = tokenizer.encode(text)?;
        let total = tokens.len();
        let (window_tokens, step_tokens) = (window_tokens.max(1), step_tokens.max(1));

        if total < window_tokens {
            debug!(total, window_tokens, "text shorter than one window");
            return Ok(vec![TopicSpan { start: 0, end: total, cluster_id: 0, text: text.to_string() }]);
        }

        let mut starts = Vec::new();
        let mut vectors = Vec::new();
        for start in (0..total).step_by(step_tokens) {
            let end = (start + window_tokens).min(total);
            vectors.push(self.embedder.embed(&tokenizer.decode(&tokens[start..end])?, model)?);
            starts.push(start);
            if end == total { break; }
        }
        info!(windows = starts.len(), total, "embedded windows");

        let labels = self.window_topics(&vectors)?;

        let mut spans = Vec::new();
        let mut current_start = 0;
        let mut current_label = labels[0];
        for (&start, &label) in starts.iter().zip(&labels).skip(1) {
            if label != current_label {
                spans.push(self.span(&tokens, current_start, start, current_label)?);
                current_start = start;
                current_label = label;
            }
        }
        spans.push(self.span(&tokens, current_start, total, current_label)?);
        debug!(spans = spans.len(), "topic spans");
        Ok(spans)
    }

    fn span(&self, tokens: &[u32], start: usize, end: usize, cluster_id: i32) -> Result<TopicSpan> {
        Ok(TopicSpan { start, end, cluster_id, text: self.embedder.tokenizer().decode(&tokens[start..end])? })
    }

    fn window_topics(&self, vectors: &[Vec<f32>]) -> Result<Vec<i32>> {
        if vectors.len() <= 1 { return Ok(vec![0; vectors.len()]); }
        let projected;
        let data = if self.settings.reduce_windows && vectors.len() > REDUCE_ABOVE && self.backend.has_reducer() {
            projected = self
                .backend
                .reduce(vectors, self.cluster_params.n_neighbors, self.cluster_params.min_dist)?
                .into_iter()
                .map(|p| p.to_vec())
                .collect::<Vec<_>>();
            &projected
        } else {
            vectors
        };
        self.backend.cluster_or_density(data, self.settings.method, &self.cluster_params)
    }

    /// Chunks of one document with their text. Segmentation yielding a single span (or
    /// disabled segmentation) falls back to paragraph chunking.
    pub fn chunk_document(&self, doc: &Document, model: &str) -> Result<Vec<(Chunk, String)>> {
        if self.settings.enabled {
            let spans = self.segment(&doc.text, self.settings.window_tokens, self.settings.step_tokens, model)?;
            if spans.len() > 1 {
                return Ok(spans
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| {
                        let chunk = Chunk { chunk_id: chunk_id(&doc.id, i), doc_id: doc.id.clone(), start_token: s.start, end_token: s.end, cluster_id: s.cluster_id };
                        (chunk, s.text)
                    })
                    .collect());
            }
            debug!(doc = %doc.id, "no topic change detected; paragraph chunking");
        }
        self.paragraph_chunks(doc)
    }

    /// A chunk's range runs from the token offset of its first character to the next
    /// chunk's start, so blank-line separators belong to the chunk before them; the first
    /// range starts at 0 and the last ends at the document's token count.
    fn paragraph_chunks(&self, doc: &Document) -> Result<Vec<(Chunk, String)>> {
        let tokenizer = self.embedder.tokenizer();
        let total = tokenizer.encode(&doc.text)?.len();
        let mut ranges: Vec<(usize, usize, String)> = Vec::new();
        for (byte_start, piece) in chunk_pieces(&doc.text, self.settings.max_chars) {
            let start = if ranges.is_empty() { 0 } else { tokenizer.encode(&doc.text[..byte_start])?.len().min(total) };
            match ranges.last_mut() {
                Some(last) if start <= last.0 => { last.2.push_str("\n\n"); last.2.push_str(&piece); }
                Some(last) => { last.1 = start; ranges.push((start, total, piece)); }
                None => ranges.push((start, total, piece)),
            }
        }
        if ranges.is_empty() { ranges.push((0, total, doc.text.clone())); }
        Ok(ranges
            .into_iter()
            .enumerate()
            .map(|(i, (start, end, text))| {
                (Chunk { chunk_id: chunk_id(&doc.id, i), doc_id: doc.id.clone(), start_token: start, end_token: end, cluster_id: 0 }, text)
            })
            .collect())
    }
}
