//! Configuration loader and path helpers.
//!
//! Uses Figment to merge defaults + `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nesting, e.g. `APP_CLUSTER__METHOD=spectral`). `Settings` is the typed
//! value handed to constructors; nothing is cached process-wide.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    /// Wrap an already assembled figment (tests, embedding in other programs).
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// Typed view of the whole configuration, validated.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub embedding: EmbeddingSettings,
    pub labeling: LabelingSettings,
    pub budget: BudgetSettings,
    pub retry: RetrySettings,
    pub segment: SegmentSettings,
    pub cluster: ClusterSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.embedding.max_tokens == 0 { return bad("embedding.max_tokens must be > 0"); }
        if self.segment.window_tokens == 0 || self.segment.step_tokens == 0 { return bad("segment.window_tokens and segment.step_tokens must be > 0"); }
        if self.segment.max_chars == 0 { return bad("segment.max_chars must be > 0"); }
        if self.cluster.min_cluster_size < 2 { return bad("cluster.min_cluster_size must be >= 2"); }
        if self.cluster.n_clusters == 0 { return bad("cluster.n_clusters must be > 0"); }
        if self.cluster.min_dist < 0.0 { return bad("cluster.min_dist must be >= 0"); }
        if self.retry.max_attempts == 0 { return bad("retry.max_attempts must be > 0"); }
        Ok(())
    }
}

/// Filesystem layout. Relative entries resolve against `root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub root: String,
    pub parsed: String,
    pub metadata: String,
    pub output: String,
    pub vector: String,
    pub chunks: String,
    pub embeddings_file: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            parsed: "data/parsed".to_string(),
            metadata: "data/metadata".to_string(),
            output: "data/output".to_string(),
            vector: "data/vector".to_string(),
            chunks: "data/vector/chunks".to_string(),
            embeddings_file: "data/output/rich_doc_embeddings.json".to_string(),
        }
    }
}

impl PathSettings {
    pub fn root_dir(&self) -> PathBuf { expand_path(&self.root) }
    pub fn parsed_dir(&self) -> PathBuf { resolve_with_base(&self.root_dir(), &self.parsed) }
    pub fn metadata_dir(&self) -> PathBuf { resolve_with_base(&self.root_dir(), &self.metadata) }
    pub fn output_dir(&self) -> PathBuf { resolve_with_base(&self.root_dir(), &self.output) }
    pub fn vector_dir(&self) -> PathBuf { resolve_with_base(&self.root_dir(), &self.vector) }
    pub fn chunks_dir(&self) -> PathBuf { resolve_with_base(&self.root_dir(), &self.chunks) }
    pub fn embeddings_path(&self) -> PathBuf { resolve_with_base(&self.root_dir(), &self.embeddings_file) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model: String,
    /// Per-call token limit of the provider.
    pub max_tokens: usize,
    pub api_base: String,
    pub api_key_env: String,
    pub tokenizer_file: Option<String>,
    pub timeout_secs: u64,
    pub fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            max_tokens: 8192,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            tokenizer_file: None,
            timeout_secs: 30,
            fake: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelingSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LabelingSettings {
    fn default() -> Self { Self { model: "gpt-4o".to_string(), temperature: 0.4, max_tokens: 64 } }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    /// No guard is installed when absent.
    pub monthly_limit_usd: Option<f64>,
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self { Self { max_attempts: 6, base_delay_ms: 1000, max_delay_ms: 32_000 } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMethod {
    #[default]
    Density,
    Spectral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentSettings {
    pub enabled: bool,
    pub window_tokens: usize,
    pub step_tokens: usize,
    pub max_chars: usize,
    pub method: ClusterMethod,
    pub reduce_windows: bool,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self { enabled: true, window_tokens: 200, step_tokens: 100, max_chars: 14_000, method: ClusterMethod::Density, reduce_windows: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub method: ClusterMethod,
    pub min_cluster_size: usize,
    pub min_samples: Option<usize>,
    pub n_clusters: usize,
    pub graph_neighbors: usize,
    pub n_neighbors: usize,
    pub min_dist: f32,
    pub seed: u64,
    pub epochs: usize,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            method: ClusterMethod::Density,
            min_cluster_size: 4,
            min_samples: None,
            n_clusters: 24,
            graph_neighbors: 10,
            n_neighbors: 15,
            min_dist: 0.1,
            seed: 42,
            epochs: 200,
        }
    }
}

/// `${VAR}`/`$VAR` then leading `~` expansion. No canonicalization.
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Expanded `p`, joined onto `base` unless absolute.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Config::from_figment(Figment::new()).settings().expect("settings");
        assert_eq!(settings.embedding.model, "text-embedding-3-small");
        assert_eq!(settings.segment.window_tokens, 200);
        assert_eq!(settings.cluster.method, ClusterMethod::Density);
    }

    #[test]
    fn nested_override_and_validation() {
        let fig = Figment::new().merge(Serialized::default("cluster.min_cluster_size", 1));
        let err = Config::from_figment(fig).settings().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let fig = Figment::new().merge(Serialized::default("segment.method", "spectral"));
        let settings = Config::from_figment(fig).settings().expect("settings");
        assert_eq!(settings.segment.method, ClusterMethod::Spectral);
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let paths = PathSettings { root: "/srv/corpus".to_string(), ..PathSettings::default() };
        assert_eq!(paths.vector_dir(), PathBuf::from("/srv/corpus/data/vector"));
        let abs = PathSettings { root: "/srv".to_string(), vector: "/tmp/v".to_string(), ..PathSettings::default() };
        assert_eq!(abs.vector_dir(), PathBuf::from("/tmp/v"));
    }
}
