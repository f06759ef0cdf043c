pub mod ingest;
pub mod retriever;
pub mod text;

pub use ingest::{IngestReport, Ingestor};
pub use retriever::{resolve_model, Retriever};
