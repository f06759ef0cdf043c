//! Flat inner-product vector index keyed by hashed identifiers.
//!
//! String identifiers are hashed into the positive signed 64-bit range ([`hash_id`]);
//! the reverse mapping lives in an [`IdMap`] side-file. [`VectorStore`] keeps both
//! files in one directory and always persists them together.

pub mod hash;
pub mod id_map;
pub mod index;
pub mod store;

pub use hash::hash_id;
pub use id_map::IdMap;
pub use index::{stored_dimension, FlatIndex, NO_MATCH};
pub use store::VectorStore;
