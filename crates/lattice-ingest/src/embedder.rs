//! Embedding client for the OpenAI embeddings API.
//!
//! Transient failures (timeouts, connection errors, 429, 5xx) retry with
//! exponential backoff; anything else fails immediately as a provider error.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use lattice_core::{estimate_tokens, AppConfig, Embedder, LatticeError, Result};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Maximum inputs sent per embeddings API call.
const BATCH_LIMIT: usize = 128;
/// Estimated-token budget per embeddings API call, well under the
/// provider's per-request input cap.
const BATCH_TOKEN_LIMIT: usize = 100_000;

/// Split inputs into API call ranges bounded by both count and estimated
/// token total. A single over-budget text still gets its own call.
fn plan_batches(texts: &[String]) -> Vec<std::ops::Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut tokens = 0;
    for (i, text) in texts.iter().enumerate() {
        let t = estimate_tokens(text);
        if i > start && (i - start >= BATCH_LIMIT || tokens + t > BATCH_TOKEN_LIMIT) {
            batches.push(start..i);
            start = i;
            tokens = 0;
        }
        tokens += t;
    }
    if start < texts.len() {
        batches.push(start..texts.len());
    }
    batches
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dim: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &AppConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.vector_timeout_secs.max(10)))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: config.openai_api_key.clone(),
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENAI_EMBEDDINGS_URL.to_string(),
            dim: config.embedding_dim,
        }
    }

    /// One API call for up to [`BATCH_LIMIT`] texts, with backoff on
    /// transient failures (initial 500ms, cap 10s, budget 60s).
    async fn embed_call(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(10))
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build();

        let response = retry(policy, || async {
            let request = EmbeddingRequest {
                model: self.model.clone(),
                input: texts.to_vec(),
            };
            let resp = self
                .client
                .post(&self.base_url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    let err = LatticeError::provider("openai", e.to_string());
                    if e.is_timeout() || e.is_connect() {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })?;

            let status = resp.status();
            if status.as_u16() == 429 || status.is_server_error() {
                tracing::warn!(status = %status, "Transient embeddings API failure, retrying");
                return Err(backoff::Error::transient(LatticeError::provider(
                    "openai",
                    format!("status {status}"),
                )));
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_else(|_| "<unreadable body>".into());
                return Err(backoff::Error::permanent(LatticeError::provider(
                    "openai",
                    format!("status {status}: {body}"),
                )));
            }

            resp.json::<EmbeddingResponse>().await.map_err(|e| {
                backoff::Error::permanent(LatticeError::provider(
                    "openai",
                    format!("malformed embeddings response: {e}"),
                ))
            })
        })
        .await?;

        let mut vectors = vec![Vec::new(); texts.len()];
        for datum in response.data {
            if datum.index < vectors.len() {
                vectors[datum.index] = datum.embedding;
            }
        }
        for (i, v) in vectors.iter().enumerate() {
            if v.len() != self.dim {
                return Err(LatticeError::provider(
                    "openai",
                    format!("embedding {i} has dimension {} (expected {})", v.len(), self.dim),
                ));
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_call(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| LatticeError::provider("openai", "empty embeddings response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for range in plan_batches(texts) {
            let batch = &texts[range];
            tracing::debug!(batch = batch.len(), "Embedding batch");
            out.extend(self.embed_call(batch).await?);
        }
        Ok(out)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}
