pub mod paragraph;
pub mod topic;

pub use paragraph::{chunk_pieces, chunk_text};
pub use topic::{TopicSegmenter, TopicSpan};
