//! Audit events: append-only records of action lifecycle and safety events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event types written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Proposed,
    Validated,
    Executing,
    Completed,
    Failed,
    Cancelled,
    KillSwitch,
    ModeChange,
    RetryScheduled,
    RetryExhausted,
    WorkflowCreated,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Validated => "validated",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::KillSwitch => "kill_switch",
            Self::ModeChange => "mode_change",
            Self::RetryScheduled => "retry_scheduled",
            Self::RetryExhausted => "retry_exhausted",
            Self::WorkflowCreated => "workflow_created",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "proposed" => Some(Self::Proposed),
            "validated" => Some(Self::Validated),
            "executing" => Some(Self::Executing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "kill_switch" => Some(Self::KillSwitch),
            "mode_change" => Some(Self::ModeChange),
            "retry_scheduled" => Some(Self::RetryScheduled),
            "retry_exhausted" => Some(Self::RetryExhausted),
            "workflow_created" => Some(Self::WorkflowCreated),
            _ => None,
        }
    }
}

/// One audit log entry.
///
/// Audit events are derived from state changes and exist for transparency
/// and debugging; they are never the source of truth. `event_data` is
/// redacted before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    /// Associated proposal; None for system events like kill_switch.
    pub proposal_id: Option<i64>,
    pub event_type: AuditEventType,
    pub event_data: Option<Value>,
    /// Who triggered the event: "agent", "user", or "system".
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}
