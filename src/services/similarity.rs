use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::core::config::Settings;

/// Semantic similarity of two documents, always within `[0, 1]`.
#[async_trait]
pub(crate) trait SimilarityScorer: Send + Sync {
    async fn similarity(&self, a: &str, b: &str) -> f64;
}

#[async_trait]
pub(crate) trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// OpenAI-compatible `/embeddings` client.
#[derive(Debug, Clone)]
pub(crate) struct EmbeddingClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl EmbeddingClient {
    /// Builds the client and, when enabled, sends a probe request so a broken
    /// embedding backend stops startup instead of zeroing every comparison.
    pub(crate) async fn connect(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.ai().ai_request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(timeout)
            .build()
            .context("Failed to build embedding HTTP client")?;

        let embedder = Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.embedding().model.clone(),
        };

        if settings.embedding().probe_on_start {
            let probe = embedder.embed("embedding probe").await.context("Embedding probe failed")?;
            tracing::info!(model = %embedder.model, dimensions = probe.len(), "Embedding model ready");
        }

        Ok(embedder)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": text }))
            .send()
            .await
            .context("Failed to call embeddings endpoint")?;

        let status = response.status();
        let body: Value = response.json().await.context("Failed to read embeddings response")?;
        if !status.is_success() {
            anyhow::bail!("Embeddings error ({status}): {body}");
        }

        parse_embedding(&body)
    }
}

fn parse_embedding(body: &Value) -> Result<Vec<f32>> {
    let values = body
        .get("data")
        .and_then(|data| data.get(0))
        .and_then(|item| item.get("embedding"))
        .and_then(Value::as_array)
        .context("Embeddings response has no vector")?;

    values
        .iter()
        .map(|value| value.as_f64().map(|number| number as f32).context("Non-numeric embedding value"))
        .collect()
}

/// Cosine similarity over cached embeddings.
///
/// Text longer than `max_input_chars` is embedded in chunks of at most that many characters
/// and the chunk vectors are mean-pooled; no request carries more than that.
pub(crate) struct EmbeddingSimilarity<E> {
    embedder: E,
    min_text_length: usize,
    cache_capacity: usize,
    max_input_chars: usize,
    cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl<E: Embedder> EmbeddingSimilarity<E> {
    pub(crate) fn new(
        embedder: E,
        min_text_length: usize,
        cache_capacity: usize,
        max_input_chars: usize,
    ) -> Self {
        Self {
            embedder,
            min_text_length,
            cache_capacity,
            max_input_chars: max_input_chars.max(1),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn from_settings(embedder: E, settings: &Settings) -> Self {
        Self::new(
            embedder,
            settings.embedding().min_text_length,
            settings.embedding().cache_capacity,
            settings.embedding().max_input_chars,
        )
    }

    async fn embed_bounded(&self, text: &str) -> Result<Vec<f32>> {
        let chunks = chunk_chars(text, self.max_input_chars);
        if let [single] = chunks.as_slice() {
            return self.embedder.embed(single).await;
        }

        let mut pooled: Vec<f32> = Vec::new();
        for chunk in &chunks {
            let vector = self.embedder.embed(chunk).await?;
            if pooled.is_empty() {
                pooled = vector;
                continue;
            }
            if vector.len() != pooled.len() {
                anyhow::bail!("chunk embedding dimensions differ: {} vs {}", pooled.len(), vector.len());
            }
            for (sum, value) in pooled.iter_mut().zip(&vector) {
                *sum += value;
            }
        }

        let count = chunks.len() as f32;
        pooled.iter_mut().for_each(|value| *value /= count);
        tracing::debug!(chunks = chunks.len(), "Long text embedded in chunks");
        Ok(pooled)
    }

    async fn cached_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let key = hex::encode(Sha256::digest(text.as_bytes()));

        if let Some(vector) = self.cache.lock().await.get(&key) {
            return Ok(vector.clone());
        }

        let vector = self.embed_bounded(text).await?;

        let mut cache = self.cache.lock().await;
        if cache.len() >= self.cache_capacity {
            cache.clear();
        }
        if self.cache_capacity > 0 {
            cache.insert(key, vector.clone());
        }
        Ok(vector)
    }

    async fn score(&self, a: &str, b: &str) -> Result<f64> {
        let left = self.cached_embedding(a).await?;
        let right = self.cached_embedding(b).await?;
        cosine(&left, &right)
    }
}

#[async_trait]
impl<E: Embedder> SimilarityScorer for EmbeddingSimilarity<E> {
    async fn similarity(&self, a: &str, b: &str) -> f64 {
        let a = a.trim();
        let b = b.trim();
        if a.chars().count() < self.min_text_length || b.chars().count() < self.min_text_length {
            metrics::counter!("similarity_requests_total", "status" => "skipped").increment(1);
            return 0.0;
        }

        match self.score(a, b).await {
            Ok(score) => {
                metrics::counter!("similarity_requests_total", "status" => "success").increment(1);
                score
            }
            Err(err) => {
                metrics::counter!("similarity_requests_total", "status" => "failed").increment(1);
                tracing::warn!(error = %err, "Similarity scoring failed, treating as unrelated");
                0.0
            }
        }
    }
}

/// Splits `text` on character boundaries into pieces of at most `max_chars` characters.
fn chunk_chars(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (index, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..index]);
            start = index;
            count = 0;
        }
        count += 1;
    }

    if start < text.len() || chunks.is_empty() {
        chunks.push(&text[start..]);
    }
    chunks
}

fn cosine(left: &[f32], right: &[f32]) -> Result<f64> {
    if left.is_empty() || right.is_empty() {
        anyhow::bail!("empty embedding");
    }
    if left.len() != right.len() {
        anyhow::bail!("embedding dimensions differ: {} vs {}", left.len(), right.len());
    }

    let (mut dot, mut left_norm, mut right_norm) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in left.iter().zip(right) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        left_norm += x * x;
        right_norm += y * y;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        anyhow::bail!("zero-length embedding");
    }

    Ok((dot / (left_norm.sqrt() * right_norm.sqrt())).clamp(0.0, 1.0))
}
