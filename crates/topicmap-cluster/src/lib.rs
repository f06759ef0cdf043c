//! Corpus-level structure: 2D projection, density or similarity-graph clustering,
//! per-cluster labeling through an external labeler, and file exports.

pub mod backend;
pub mod density;
pub mod engine;
pub mod export;
pub mod kmeans;
pub mod label;
pub mod metadata;
pub mod reduce;
pub mod spectral;

mod math;

pub use backend::{ClusterBackend, Clusterer, Reducer};
pub use engine::{ClusterEngine, ClusterRun};
pub use export::ExportPaths;
pub use metadata::JsonMetadataDir;
