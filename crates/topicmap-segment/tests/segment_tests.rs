use topicmap_cluster::ClusterBackend;
use topicmap_core::config::{ClusterMethod, ClusterSettings, SegmentSettings};
use topicmap_core::types::Document;
use topicmap_embed::{CharTokenizer, Embedder, HashingProvider};
use topicmap_segment::{TopicSegmenter, TopicSpan};

const MODEL: &str = "text-embedding-3-small";

fn embedder() -> Embedder { Embedder::new(Box::new(HashingProvider), Box::new(CharTokenizer), 8192) }

fn corpus(chars: usize) -> String {
    let words = ["rain", "barrel", "gutter", "cistern", "filter", "seed", "compost", "trowel", "mulch", "harvest"];
    let mut text = String::with_capacity(chars + 16);
    let mut i = 0usize;
    while text.chars().count() < chars {
        text.push_str(words[(i * 7 + i / 13) % words.len()]);
        text.push(' ');
        i += 1;
    }
    text.chars().take(chars).collect()
}

fn assert_tiles(spans: &[TopicSpan], total: usize) {
    assert_eq!(spans.first().map(|s| s.start), Some(0));
    assert_eq!(spans.last().map(|s| s.end), Some(total));
    for pair in spans.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
        assert_ne!(pair[0].cluster_id, pair[1].cluster_id, "adjacent spans differ in topic");
    }
}

#[test]
fn long_document_spans_tile_the_token_stream() {
    let text = corpus(50_000);
    let e = embedder();
    let backend = ClusterBackend::builtin(&ClusterSettings::default());
    let seg = TopicSegmenter::new(&e, &backend, SegmentSettings::default());

    let spans = seg.segment(&text, 200, 100, MODEL).expect("segment");
    assert!(!spans.is_empty());
    assert_tiles(&spans, 50_000);
    let joined: String = spans.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(joined, text);
}

#[test]
fn window_loop_stops_at_the_end() {
    // 250 tokens, window 200, step 100: windows [0,200) and [100,250) only
    let text = corpus(250);
    let e = embedder();
    let backend = ClusterBackend::builtin(&ClusterSettings::default());
    let settings = SegmentSettings { method: ClusterMethod::Spectral, ..SegmentSettings::default() };
    let seg = TopicSegmenter::new(&e, &backend, settings);

    let spans = seg.segment(&text, 200, 100, MODEL).expect("segment");
    assert_eq!(spans.len(), 1);
    assert_eq!((spans[0].start, spans[0].end), (0, 250));
}

#[test]
fn spectral_without_implementation_falls_back_to_density() {
    let text = corpus(2_000);
    let e = embedder();
    let backend = ClusterBackend::default().with_clusterer(ClusterMethod::Density, Box::new(topicmap_cluster::density::DensityClusterer));
    let settings = SegmentSettings { method: ClusterMethod::Spectral, ..SegmentSettings::default() };
    let seg = TopicSegmenter::new(&e, &backend, settings);

    let spans = seg.segment(&text, 100, 50, MODEL).expect("segment");
    assert_tiles(&spans, 2_000);
}

#[test]
fn short_document_falls_back_to_paragraph_chunks() {
    let e = embedder();
    let backend = ClusterBackend::builtin(&ClusterSettings::default());
    let seg = TopicSegmenter::new(&e, &backend, SegmentSettings { max_chars: 20, ..SegmentSettings::default() });
    let doc = Document::new("pump", "Check the seals.\n\nPrime before use.\n\nDrain in winter.");

    let chunks = seg.chunk_document(&doc, MODEL).expect("chunks");
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks.iter().map(|(c, _)| c.chunk_id.as_str()).collect::<Vec<_>>(), vec!["pump_chunk00", "pump_chunk01", "pump_chunk02"]);
    assert_eq!(chunks[0].0.start_token, 0);
    assert_eq!(chunks[2].0.end_token, doc.text.chars().count());
    assert!(chunks.iter().all(|(c, _)| c.doc_id == "pump" && c.cluster_id == 0));
    assert_eq!(chunks[1].1, "Prime before use.");
}

#[test]
fn empty_document_yields_one_empty_chunk() {
    let e = embedder();
    let backend = ClusterBackend::builtin(&ClusterSettings::default());
    let seg = TopicSegmenter::new(&e, &backend, SegmentSettings::default());

    let chunks = seg.chunk_document(&Document::new("blank", ""), MODEL).expect("chunks");
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].0.is_empty());
    assert_eq!(chunks[0].1, "");
}
