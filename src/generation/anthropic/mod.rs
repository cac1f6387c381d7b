
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{Generator, Prompt, PromptMessage};
use crate::config::{Config, GenerationConfig};
use crate::remote::{self, ApiKey, RemoteService, RetryPolicy, call_with_retry};
use crate::{RagError, Result};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const MESSAGES_PATH: &str = "v1/messages";

/// Client for the Anthropic Messages API
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    base_url: Url,
    model: String,
    max_tokens: u32,
    temperature: f32,
    api_key: ApiKey,
    agent: ureq::Agent,
    retry_policy: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: &'a [PromptMessage],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl AnthropicClient {
    #[inline]
    pub fn new(config: &GenerationConfig, api_key: impl Into<String>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let base_url = remote::base_url(&config.base_url)
            .map_err(|e| RagError::Config(format!("Invalid generation URL: {}", e)))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            api_key: ApiKey::new(api_key),
            agent,
            retry_policy: RetryPolicy::new(
                config.rate_limit_retries,
                Duration::from_millis(config.backoff_base_ms),
            ),
        })
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .generation
            .api_key()
            .map_err(|e| RagError::Config(e.to_string()))?;
        Self::new(&config.generation, api_key)
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

    /// Send the prompt on the current thread and return the concatenated text
    #[inline]
    pub fn complete_blocking(&self, prompt: &Prompt) -> Result<String> {
        let service = RemoteService::Generation;

        let url = self
            .base_url
            .join(MESSAGES_PATH)
            .map_err(|e| service.failure(format!("invalid endpoint URL: {}", e)))?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: &prompt.system,
            messages: &prompt.messages,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| service.failure(format!("failed to serialize request: {}", e)))?;

        debug!(
            "Requesting completion from {} with {} messages",
            self.model,
            prompt.messages.len()
        );

        let response_text = call_with_retry(service, self.retry_policy, || {
            self.agent
                .post(url.as_str())
                .header("x-api-key", self.api_key.expose())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: MessagesResponse = serde_json::from_str(&response_text)
            .map_err(|e| service.failure(format!("failed to parse response: {}", e)))?;

        let text: String = response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();

        if text.trim().is_empty() {
            return Err(service.failure(format!(
                "model returned an empty completion (stop reason: {})",
                response.stop_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Generator for AnthropicClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let client = self.clone();
        let prompt = prompt.clone();
        tokio::task::spawn_blocking(move || client.complete_blocking(&prompt))
            .await
            .map_err(|e| RagError::Generation(format!("generation task failed: {}", e)))?
    }
}
