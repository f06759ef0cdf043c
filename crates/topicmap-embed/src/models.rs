use topicmap_core::error::{Error, Result};

/// Static facts about an embedding model. `dim` is fixed per model name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSpec {
    pub name: &'static str,
    pub dim: usize,
    pub usd_per_1k_tokens: f64,
}

impl ModelSpec {
    pub fn estimate_cost(&self, tokens: usize) -> f64 { tokens as f64 / 1000.0 * self.usd_per_1k_tokens }
}

pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

pub const MODELS: &[ModelSpec] = &[
    ModelSpec { name: "text-embedding-3-small", dim: 1536, usd_per_1k_tokens: 0.000_02 },
    ModelSpec { name: "text-embedding-3-large", dim: 3072, usd_per_1k_tokens: 0.000_13 },
    ModelSpec { name: "text-embedding-ada-002", dim: 1536, usd_per_1k_tokens: 0.000_1 },
];

pub fn spec(model: &str) -> Result<&'static ModelSpec> {
    MODELS
        .iter()
        .find(|m| m.name == model)
        .ok_or_else(|| Error::InvalidConfig(format!("unknown embedding model '{model}'")))
}

/// First declared model producing vectors of width `dim`.
pub fn model_for_dim(dim: usize) -> Option<&'static ModelSpec> { MODELS.iter().find(|m| m.dim == dim) }

/// (prompt, completion) USD per 1K tokens for chat models; unknown models cost nothing.
pub fn chat_rates(model: &str) -> (f64, f64) {
    match model {
        "gpt-4" => (0.03, 0.06),
        "gpt-4o" => (0.005, 0.015),
        _ => (0.0, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_width() {
        assert_eq!(spec("text-embedding-3-large").expect("known").dim, 3072);
        assert!(spec("nope").is_err());
        assert_eq!(model_for_dim(1536).map(|m| m.name), Some("text-embedding-3-small"));
        assert_eq!(model_for_dim(7), None);
    }
}
