use tempfile::TempDir;

use topicmap_core::error::Error;
use topicmap_vector::store::{ID_MAP_FILE, INDEX_FILE};
use topicmap_vector::{hash_id, FlatIndex, VectorStore};

fn unit(dim: usize, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[axis] = 1.0;
    v
}

fn ids(names: &[&str]) -> Vec<String> { names.iter().map(|s| s.to_string()).collect() }

#[test]
fn identical_vector_is_top_hit() {
    let dir = TempDir::new().unwrap();
    let mut store = VectorStore::open(dir.path(), 4).unwrap();
    let vectors = vec![vec![0.9, 0.1, 0.0, 0.0], vec![0.1, 0.9, 0.0, 0.0], vec![0.0, 0.3, 0.7, 0.1]];
    store.add(&ids(&["a_chunk00", "a_chunk01", "b_chunk00"]), &vectors).unwrap();

    let hits = store.search(&vectors[2], 3).unwrap();
    assert_eq!(hits[0].0, "b_chunk00");
    assert!(hits.iter().all(|h| h.1 <= hits[0].1));
}

#[test]
fn persist_and_reload_round_trip() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = VectorStore::open(dir.path(), 3).unwrap();
        store.add(&ids(&["x", "y"]), &[unit(3, 0), unit(3, 1)]).unwrap();
        store.persist().unwrap();
    }
    assert!(dir.path().join(INDEX_FILE).exists() && dir.path().join(ID_MAP_FILE).exists());
    assert_eq!(VectorStore::stored_dimension(dir.path()).unwrap(), Some(3));

    let store = VectorStore::open_existing(dir.path()).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.id_map().get(hash_id("y")), Some("y"));
    assert_eq!(store.search(&unit(3, 1), 1).unwrap(), vec![("y".to_string(), 1.0)]);
}

#[test]
fn reopening_with_another_width_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut store = VectorStore::open(dir.path(), 3).unwrap();
    store.add(&ids(&["x"]), &[unit(3, 0)]).unwrap();
    store.persist().unwrap();
    assert!(matches!(VectorStore::open(dir.path(), 5), Err(Error::DimensionMismatch { expected: 5, actual: 3 })));
    assert!(matches!(FlatIndex::open(dir.path().join(INDEX_FILE), 2), Err(Error::DimensionMismatch { .. })));
}

#[test]
fn fewer_rows_than_k() {
    let dir = TempDir::new().unwrap();
    let mut store = VectorStore::open(dir.path(), 2).unwrap();
    assert!(store.search(&[1.0, 0.0], 5).unwrap().is_empty());
    store.add(&ids(&["only"]), &[unit(2, 0)]).unwrap();
    assert_eq!(store.search(&[1.0, 0.0], 5).unwrap().len(), 1);
}

#[test]
fn failed_add_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    let mut store = VectorStore::open(dir.path(), 2).unwrap();
    let err = store.add(&ids(&["a", "b"]), &[unit(2, 0), vec![1.0]]).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 1 }));
    assert!(store.is_empty());
    assert!(store.id_map().is_empty());
}

#[test]
fn reset_removes_both_files() {
    let dir = TempDir::new().unwrap();
    let mut store = VectorStore::open(dir.path(), 2).unwrap();
    store.add(&ids(&["a"]), &[unit(2, 1)]).unwrap();
    store.persist().unwrap();

    VectorStore::reset(dir.path()).unwrap();
    assert_eq!(VectorStore::stored_dimension(dir.path()).unwrap(), None);
    assert!(!dir.path().join(ID_MAP_FILE).exists());
    assert!(VectorStore::open(dir.path(), 4).unwrap().is_empty());
}

#[test]
fn orphaned_index_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut store = VectorStore::open(dir.path(), 2).unwrap();
    store.add(&ids(&["a"]), &[unit(2, 1)]).unwrap();
    store.persist().unwrap();
    std::fs::remove_file(dir.path().join(ID_MAP_FILE)).unwrap();
    assert!(matches!(VectorStore::open(dir.path(), 2), Err(Error::Format(_))));
}

#[test]
fn cleared_store_persists_empty_then_accepts_new_rows() {
    let dir = TempDir::new().unwrap();
    let mut store = VectorStore::open(dir.path(), 4).unwrap();
    store.add(&ids(&["old_a", "old_b"]), &[unit(4, 0), unit(4, 1)]).unwrap();
    store.persist().unwrap();

    let mut store = VectorStore::open(dir.path(), 4).unwrap();
    store.clear();
    assert!(store.is_empty() && store.id_map().is_empty());
    store.add(&ids(&["new_c"]), &[unit(4, 2)]).unwrap();
    store.persist().unwrap();

    let reopened = VectorStore::open_existing(dir.path()).unwrap();
    assert_eq!(reopened.len(), 1);
    let hits = reopened.search(&unit(4, 0), 5).unwrap();
    assert_eq!(hits.iter().map(|h| h.0.as_str()).collect::<Vec<_>>(), vec!["new_c"]);
}
