//! Anthropic messages API client.

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use std::time::Duration;

use super::error::LlmApiError;
use super::retry::RetryPolicy;
use super::types::{MessageRequest, MessageResponse};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::llm::LlmClient;

/// HTTP client for the messages API.
///
/// Connection pooling via reqwest, exponential-backoff retries for
/// transient errors, and a long request timeout sized for diagnosis
/// calls. Shutdown cancellation happens at the caller, which drops the
/// in-flight future.
pub struct AnthropicClient {
    http_client: ReqwestClient,
    api_key: String,
    base_url: String,
    retry_policy: RetryPolicy,
}

/// Configuration for the API client.
pub struct AnthropicClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for AnthropicClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.anthropic.com".to_string(),
            max_retries: 3,
            initial_backoff_ms: 10_000,
            max_backoff_ms: 300_000,
            timeout_secs: 300,
        }
    }
}

impl AnthropicClient {
    /// Create a client with default configuration, reading the API key
    /// from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> DomainResult<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            DomainError::Configuration("ANTHROPIC_API_KEY is not set".to_string())
        })?;
        Self::with_config(AnthropicClientConfig {
            api_key,
            ..Default::default()
        })
    }

    pub fn with_config(config: AnthropicClientConfig) -> DomainResult<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| DomainError::Llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            api_key: config.api_key,
            base_url: config.base_url,
            retry_policy: RetryPolicy::new(
                config.max_retries,
                config.initial_backoff_ms,
                config.max_backoff_ms,
            ),
        })
    }

    async fn send_request(&self, request: &MessageRequest) -> Result<MessageResponse, LlmApiError> {
        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| LlmApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error response".to_string());
            return Err(LlmApiError::from_status(status, body));
        }

        response
            .json::<MessageResponse>()
            .await
            .map_err(|e| LlmApiError::SchemaMismatch(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn send_message(&self, request: MessageRequest) -> DomainResult<MessageResponse> {
        self.retry_policy
            .execute(|| self.send_request(&request))
            .await
            .map_err(|e| DomainError::Llm(e.to_string()))
    }
}
