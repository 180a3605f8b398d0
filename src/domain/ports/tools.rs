//! Tool executor port for general (non-subject) actions.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::errors::DomainResult;

/// Executes a general tool by name with validated parameters.
///
/// Each tool receives a parameter map and returns a structured result
/// or raises. The dispatcher routes `ActionType::Tool` proposals here.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, parameters: &Map<String, Value>) -> DomainResult<Value>;
}
