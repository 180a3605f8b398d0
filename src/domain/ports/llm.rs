//! LLM client port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::infrastructure::llm::types::{MessageRequest, MessageResponse};

/// Client for the messages API used by the diagnosis pipeline.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn send_message(&self, request: MessageRequest) -> DomainResult<MessageResponse>;
}
