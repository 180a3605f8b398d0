//! Subject port: the boundary to the external system under supervision.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::domain::errors::DomainResult;
use crate::domain::models::registry::ActionDefinition;
use crate::domain::models::ticket::Observation;

/// Interface to the supervised distributed system.
///
/// A subject provides a unified observation of its current state, a
/// catalog of the native actions it supports, and a single dispatch
/// entry point keyed by action name. Keeping dispatch behind one method
/// keeps subjects open for extension without touching the core.
#[async_trait]
pub trait Subject: Send + Sync {
    /// Query the subject for a keyed snapshot of its state.
    ///
    /// Fails with `DomainError::SubjectUnavailable` on remote failures;
    /// the monitor treats that as a tick with no observation.
    async fn observe(&self) -> DomainResult<Observation>;

    /// Definitions of all subject-native actions.
    fn action_definitions(&self) -> Vec<ActionDefinition>;

    /// Execute a subject-native action by name with validated parameters.
    async fn invoke(
        &self,
        action_name: &str,
        parameters: &Map<String, Value>,
    ) -> DomainResult<Option<Value>>;

    /// Recent log lines from the subject, if it can provide them.
    async fn log_tail(&self, _lines: usize) -> Option<String> {
        None
    }
}

/// Extension of `Subject` for chaos evaluation.
#[async_trait]
pub trait ChaosSubject: Subject {
    /// Restore the subject to a clean state.
    async fn reset(&self) -> DomainResult<()>;

    /// Poll until the subject reports healthy, bounded by `timeout`.
    /// Returns false if the deadline passes first.
    async fn wait_healthy(&self, timeout: Duration) -> DomainResult<bool>;

    /// Opaque snapshot of subject state for before/after comparison.
    async fn capture_state(&self) -> DomainResult<Value>;

    /// Inject a named chaos condition; returns metadata needed for cleanup.
    async fn inject_chaos(
        &self,
        chaos_type: &str,
        params: &Map<String, Value>,
    ) -> DomainResult<Value>;

    /// Best-effort chaos cleanup. Failure is not a trial failure.
    async fn cleanup_chaos(&self, metadata: &Value) -> DomainResult<()>;

    /// Chaos types this subject supports.
    fn chaos_types(&self) -> Vec<String>;

    /// Subject-defined health predicate over a captured state.
    fn is_state_healthy(&self, state: &Value) -> bool;
}
