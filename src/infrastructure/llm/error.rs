//! LLM API error classification.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors from the messages API, classified for retry decisions.
///
/// Transient errors (429, 5xx, 529, network) are retried with backoff;
/// permanent errors (400, 401, 403, 404) are not.
#[derive(Debug, Clone, Error)]
pub enum LlmApiError {
    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Server error {0}: {1}")]
    ServerError(StatusCode, String),

    #[error("Client error {0}: {1}")]
    ClientError(StatusCode, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Response did not match the expected schema: {0}")]
    SchemaMismatch(String),
}

impl LlmApiError {
    /// Classify an HTTP status into an API error.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::InvalidApiKey,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimitExceeded,
            s if s.is_server_error() || s.as_u16() == 529 => Self::ServerError(s, body),
            s => Self::ClientError(s, body),
        }
    }

    /// Whether this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded | Self::ServerError(_, _) | Self::Network(_)
        )
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}
