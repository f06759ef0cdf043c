use figment::providers::{Format, Toml};
use figment::Figment;
use std::fs;
use tempfile::TempDir;

use topicmap_core::config::{ClusterMethod, Config};
use topicmap_core::embeddings::{load_embeddings, write_embeddings, EmbeddingRecord};

#[test]
fn toml_file_overrides_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(&path, "[paths]\nroot = \"/data/corpus\"\n\n[cluster]\nmethod = \"spectral\"\nn_clusters = 5\n").unwrap();

    let config = Config::from_figment(Figment::new().merge(Toml::file(&path)));
    let settings = config.settings().expect("settings");

    assert_eq!(settings.cluster.method, ClusterMethod::Spectral);
    assert_eq!(settings.cluster.n_clusters, 5);
    assert_eq!(settings.cluster.min_cluster_size, 4, "untouched keys keep defaults");
    assert_eq!(settings.paths.vector_dir(), std::path::PathBuf::from("/data/corpus/data/vector"));
    assert_eq!(config.get::<String>("embedding.model").unwrap(), "text-embedding-3-small");
}

#[test]
fn written_embeddings_load_back_in_id_order() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("out").join("emb.json");
    let mut records = std::collections::BTreeMap::new();
    for (id, v) in [("doc_b", vec![0.0, 1.0]), ("doc_a", vec![1.0, 0.0])] {
        records.insert(id.to_string(), EmbeddingRecord { embedding: v, source: format!("{id}.txt"), method: "full".into() });
    }
    write_embeddings(&path, &records).expect("write");

    let set = load_embeddings(&path).expect("load");
    assert_eq!(set.ids, vec!["doc_a", "doc_b"]);
    assert_eq!(set.vectors[1], vec![0.0, 1.0]);
}
