//! OpenAI-compatible HTTP providers (embeddings and chat labeling).
//!
//! Both go through the shared [`RetryPolicy`]: transport errors, 429 and 5xx are retried,
//! other 4xx fail immediately.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use topicmap_core::config::{EmbeddingSettings, LabelingSettings};
use topicmap_core::error::{Error, Result};
use topicmap_core::retry::RetryPolicy;
use topicmap_core::traits::{BudgetGuard, EmbeddingProvider, Labeler};

use crate::models::chat_rates;

struct Endpoint {
    client: reqwest::blocking::Client,
    api_base: String,
    api_key: String,
    retry: RetryPolicy,
}

impl Endpoint {
    fn new(settings: &EmbeddingSettings, retry: RetryPolicy) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .map_err(|_| Error::InvalidConfig(format!("{} not set", settings.api_key_env)))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { client, api_base: settings.api_base.trim_end_matches('/').to_string(), api_key, retry })
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{}", self.api_base, path);
        self.retry.run(path, || {
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .map_err(|e| Error::Provider { status: None, message: e.to_string() })?;
            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().unwrap_or_default();
                return Err(Error::Provider { status: Some(status.as_u16()), message: text });
            }
            resp.json::<Value>().map_err(|e| Error::Provider { status: None, message: format!("invalid response body: {e}") })
        })
    }
}

pub struct OpenAiEmbeddings { endpoint: Endpoint }

impl OpenAiEmbeddings {
    pub fn from_settings(settings: &EmbeddingSettings, retry: RetryPolicy) -> Result<Self> {
        Ok(Self { endpoint: Endpoint::new(settings, retry)? })
    }
}

impl EmbeddingProvider for OpenAiEmbeddings {
    fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let json = self.endpoint.post("embeddings", &json!({ "model": model, "input": text }))?;
        parse_embedding(&json)
    }
}

fn parse_embedding(json: &Value) -> Result<Vec<f32>> {
    let arr = json
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|d| d.get("embedding"))
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Format("embeddings response: missing data[0].embedding".into()))?;
    arr.iter()
        .enumerate()
        .map(|(i, v)| v.as_f64().map(|x| x as f32).ok_or_else(|| Error::Format(format!("embeddings response: element {i} is not a number: {v}"))))
        .collect()
}

/// Chat-completion labeler. The budget estimate uses 4 characters per prompt token and
/// reserves the full completion allowance.
pub struct OpenAiLabeler {
    endpoint: Endpoint,
    settings: LabelingSettings,
    budget: Option<Arc<dyn BudgetGuard>>,
}

impl OpenAiLabeler {
    pub fn new(embedding: &EmbeddingSettings, settings: LabelingSettings, retry: RetryPolicy) -> Result<Self> {
        Ok(Self { endpoint: Endpoint::new(embedding, retry)?, settings, budget: None })
    }

    #[must_use]
    pub fn with_budget(mut self, budget: Arc<dyn BudgetGuard>) -> Self {
        self.budget = Some(budget);
        self
    }
}

pub fn estimate_chat_cost(model: &str, prompt: &str, max_tokens: u32) -> f64 {
    let (prompt_rate, completion_rate) = chat_rates(model);
    let prompt_tokens = prompt.chars().count().div_ceil(4);
    prompt_tokens as f64 / 1000.0 * prompt_rate + f64::from(max_tokens) / 1000.0 * completion_rate
}

impl Labeler for OpenAiLabeler {
    fn label(&self, prompt: &str) -> Result<String> {
        let estimated = estimate_chat_cost(&self.settings.model, prompt, self.settings.max_tokens);
        if let Some(budget) = &self.budget {
            if !budget.approve(estimated) { return Err(Error::BudgetExceeded { estimated }); }
        }
        let body = json!({
            "model": self.settings.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
        });
        let json = self.endpoint.post("chat/completions", &body)?;
        let content = json
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Format("chat response: missing choices[0].message.content".into()))?;
        debug!(model = %self.settings.model, "label received");
        Ok(content.trim().to_string())
    }
}
