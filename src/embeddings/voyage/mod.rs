#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{Config, EmbeddingConfig};
use crate::embeddings::Embedder;
use crate::remote::{self, ApiKey, RemoteService, RetryPolicy, call_with_retry};
use crate::{RagError, Result};

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 512;

const EMBEDDINGS_PATH: &str = "v1/embeddings";

/// Client for the Voyage AI embeddings endpoint
#[derive(Debug, Clone)]
pub struct VoyageClient {
    base_url: Url,
    model: String,
    dimension: usize,
    batch_size: usize,
    api_key: ApiKey,
    agent: ureq::Agent,
    retry_policy: RetryPolicy,
}

/// How the service should treat the embedded text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Document,
    Query,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
    model: &'a str,
    input_type: InputType,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl VoyageClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let base_url = remote::base_url(&config.base_url)
            .map_err(|e| RagError::Config(format!("Invalid embedding URL: {}", e)))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            dimension: config.dimension as usize,
            batch_size: config.batch_size as usize,
            api_key: ApiKey::new(api_key),
            agent,
            retry_policy: RetryPolicy::new(
                config.rate_limit_retries,
                Duration::from_millis(config.backoff_base_ms),
            ),
        })
    }

    /// Build a client whose API key comes from the configured environment variable
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .embedding
            .api_key()
            .map_err(|e| RagError::Config(e.to_string()))?;
        Self::new(&config.embedding, api_key)
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed texts on the current thread, splitting them into batches
    #[inline]
    pub fn embed_blocking(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating {:?} embeddings for {} texts", input_type, texts.len());

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            vectors.extend(self.embed_single_batch(batch, input_type)?);
        }

        debug!("Generated {} embeddings total", vectors.len());
        Ok(vectors)
    }

    fn embed_single_batch(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let service = RemoteService::Embedding;

        let url = self
            .base_url
            .join(EMBEDDINGS_PATH)
            .map_err(|e| service.failure(format!("invalid endpoint URL: {}", e)))?;

        let request = EmbedRequest {
            input: texts,
            model: &self.model,
            input_type,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| service.failure(format!("failed to serialize request: {}", e)))?;
        let authorization = format!("Bearer {}", self.api_key.expose());

        let response_text = call_with_retry(service, self.retry_policy, || {
            self.agent
                .post(url.as_str())
                .header("Authorization", &authorization)
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let mut response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| service.failure(format!("failed to parse response: {}", e)))?;

        if response.data.len() != texts.len() {
            return Err(service.failure(format!(
                "mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            )));
        }

        response.data.sort_by_key(|item| item.index);

        let mut vectors = Vec::with_capacity(response.data.len());
        for (position, item) in response.data.into_iter().enumerate() {
            if item.index != position {
                return Err(service.failure(format!(
                    "response is missing the embedding for input {}",
                    position
                )));
            }
            if item.embedding.len() != self.dimension {
                return Err(service.failure(format!(
                    "expected {} dimensions, got {}",
                    self.dimension,
                    item.embedding.len()
                )));
            }
            vectors.push(item.embedding);
        }

        Ok(vectors)
    }

    async fn embed_off_thread(&self, texts: Vec<String>, input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.embed_blocking(&texts, input_type))
            .await
            .map_err(|e| RagError::Service(format!("embedding task failed: {}", e)))?
    }
}

#[async_trait]
impl Embedder for VoyageClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_off_thread(texts.to_vec(), InputType::Document)
            .await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .embed_off_thread(vec![text.to_string()], InputType::Query)
            .await?;
        vectors.pop().ok_or_else(|| {
            RagError::Service("embedding service returned no vector for the query".to_string())
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
