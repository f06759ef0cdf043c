use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;
use tracing::info;

use topicmap_core::config::Settings;
use topicmap_core::error::Result;
use topicmap_core::retry::RetryPolicy;
use topicmap_core::traits::EmbeddingProvider;

use crate::models;
use crate::openai::OpenAiEmbeddings;

/// Deterministic offline provider: whitespace tokens hashed into the model's width, L2-normalised.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashingProvider;

impl EmbeddingProvider for HashingProvider {
    fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let dim = models::spec(model)?.dim;
        let mut v = vec![0f32; dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        Ok(v)
    }
}

/// Hashing provider when `embedding.fake` or `APP_USE_FAKE_EMBEDDINGS` is set, HTTP provider otherwise.
pub fn default_provider(settings: &Settings) -> Result<Box<dyn EmbeddingProvider>> {
    let use_fake = settings.embedding.fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if use_fake {
        info!("using hashing embedding provider");
        return Ok(Box::new(HashingProvider));
    }
    Ok(Box::new(OpenAiEmbeddings::from_settings(&settings.embedding, RetryPolicy::from_settings(&settings.retry))?))
}
