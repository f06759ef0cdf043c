pub mod embedder;
pub mod fake;
pub mod models;
pub mod openai;
pub mod tokenize;

pub use embedder::{embedder_from_settings, Embedder};
pub use fake::{default_provider, HashingProvider};
pub use models::{model_for_dim, spec, ModelSpec};
pub use openai::{OpenAiEmbeddings, OpenAiLabeler};
pub use tokenize::{default_tokenizer, CharTokenizer, Cl100kTokenizer, HfTokenizer};
