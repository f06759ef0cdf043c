use std::sync::Arc;
use tracing::debug;

use topicmap_core::config::{expand_path, Settings};
use topicmap_core::error::{Error, Result};
use topicmap_core::traits::{BudgetGuard, EmbeddingProvider, TextTokenizer};

use crate::fake::default_provider;
use crate::models::{self, ModelSpec};
use crate::tokenize::default_tokenizer;

/// Wraps one embedding provider with token-limit slicing and a spend guard.
///
/// Over-length input is cut into consecutive `max_tokens` slices, each slice is
/// embedded separately and the elementwise mean is returned. That mean is a lossy
/// stand-in for a single-pass embedding with no accuracy bound.
pub struct Embedder {
    provider: Box<dyn EmbeddingProvider>,
    tokenizer: Box<dyn TextTokenizer>,
    budget: Option<Arc<dyn BudgetGuard>>,
    max_tokens: usize,
}

impl Embedder {
    pub fn new(provider: Box<dyn EmbeddingProvider>, tokenizer: Box<dyn TextTokenizer>, max_tokens: usize) -> Self {
        Self { provider, tokenizer, budget: None, max_tokens: max_tokens.max(1) }
    }

    #[must_use]
    pub fn with_budget(mut self, budget: Arc<dyn BudgetGuard>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn tokenizer(&self) -> &dyn TextTokenizer { self.tokenizer.as_ref() }

    pub fn max_tokens(&self) -> usize { self.max_tokens }

    pub fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let spec = models::spec(model)?;
        let ids = self.tokenizer.encode(text)?;
        if ids.len() <= self.max_tokens {
            return self.call(text, ids.len(), spec);
        }

        let slices = ids.chunks(self.max_tokens);
        let n = slices.len();
        debug!(tokens = ids.len(), slices = n, model, "slicing over-length input");
        let mut sum = vec![0f32; spec.dim];
        for slice in slices {
            let part = self.tokenizer.decode(slice)?;
            let v = self.call(&part, slice.len(), spec)?;
            for (acc, x) in sum.iter_mut().zip(&v) { *acc += x; }
        }
        let inv = 1.0 / n as f32;
        for x in &mut sum { *x *= inv; }
        Ok(sum)
    }

    /// Sequential; one `embed` per text.
    pub fn embed_batch(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t, model)).collect()
    }

    fn call(&self, text: &str, tokens: usize, spec: &ModelSpec) -> Result<Vec<f32>> {
        let estimated = spec.estimate_cost(tokens);
        if let Some(budget) = &self.budget {
            if !budget.approve(estimated) { return Err(Error::BudgetExceeded { estimated }); }
        }
        let v = self.provider.embed(text, spec.name)?;
        if v.len() != spec.dim { return Err(Error::DimensionMismatch { expected: spec.dim, actual: v.len() }); }
        Ok(v)
    }
}

/// Provider, tokenizer and token limit from configuration; validates the configured model.
pub fn embedder_from_settings(settings: &Settings, budget: Option<Arc<dyn BudgetGuard>>) -> Result<Embedder> {
    models::spec(&settings.embedding.model)?;
    let tokenizer_path = settings.embedding.tokenizer_file.as_deref().map(expand_path);
    let embedder = Embedder::new(default_provider(settings)?, default_tokenizer(tokenizer_path.as_deref())?, settings.embedding.max_tokens);
    Ok(match budget { Some(b) => embedder.with_budget(b), None => embedder })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize::CharTokenizer;
    use std::sync::Mutex;

    /// Returns `[len, first char code, 0, ...]` and records every call.
    struct Recording { calls: Mutex<Vec<String>> }

    impl EmbeddingProvider for Recording {
        fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
            self.calls.lock().unwrap().push(text.to_string());
            let mut v = vec![0.0; models::spec(model)?.dim];
            v[0] = text.chars().count() as f32;
            v[1] = text.chars().next().map_or(0.0, |c| u32::from(c) as f32);
            Ok(v)
        }
    }

    struct Deny;
    impl BudgetGuard for Deny { fn approve(&self, _: f64) -> bool { false } }

    fn embedder(max: usize) -> Embedder {
        Embedder::new(Box::new(Recording { calls: Mutex::new(vec![]) }), Box::new(CharTokenizer), max)
    }

    #[test]
    fn short_input_is_one_call() {
        let e = embedder(10);
        let v = e.embed("abc", "text-embedding-3-small").unwrap();
        assert_eq!(v.len(), 1536);
        assert_eq!(v[0], 3.0);
    }

    #[test]
    fn long_input_is_mean_of_slices() {
        let e = embedder(4);
        // slices: "abcd", "efgh", "ij"
        let v = e.embed("abcdefghij", "text-embedding-3-small").unwrap();
        assert!((v[0] - (4.0 + 4.0 + 2.0) / 3.0).abs() < 1e-6);
        let expected_first = (f32::from(b'a') + f32::from(b'e') + f32::from(b'i')) / 3.0;
        assert!((v[1] - expected_first).abs() < 1e-4);
    }

    #[test]
    fn declined_budget_makes_no_call() {
        let provider = Recording { calls: Mutex::new(vec![]) };
        let e = Embedder::new(Box::new(provider), Box::new(CharTokenizer), 8).with_budget(Arc::new(Deny));
        let err = e.embed("hello", "text-embedding-3-small").unwrap_err();
        assert!(matches!(err, Error::BudgetExceeded { .. }));
    }

    #[test]
    fn wrong_width_from_provider_is_rejected() {
        struct Short;
        impl EmbeddingProvider for Short { fn embed(&self, _: &str, _: &str) -> Result<Vec<f32>> { Ok(vec![1.0; 3]) } }
        let e = Embedder::new(Box::new(Short), Box::new(CharTokenizer), 8);
        assert!(matches!(e.embed("x", "text-embedding-3-small"), Err(Error::DimensionMismatch { expected: 1536, actual: 3 })));
    }
}
