//! Action domain model.
//!
//! Actions flow through a gated lifecycle:
//! `proposed -> validated -> executing -> completed | failed | cancelled`,
//! with a retry reset path `failed -> validated`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status of an action proposal in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Requested, awaiting validation.
    Proposed,
    /// Parameters verified against the registry, ready to execute.
    Validated,
    /// Currently running.
    Executing,
    /// Finished successfully.
    Completed,
    /// Execution error occurred.
    Failed,
    /// Halted by kill switch, user, or rejection. Cancellation is final.
    Cancelled,
}

impl Default for ActionStatus {
    fn default() -> Self {
        Self::Proposed
    }
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Validated => "validated",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "proposed" => Some(Self::Proposed),
            "validated" => Some(Self::Validated),
            "executing" => Some(Self::Executing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal states forbid further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Pending states are the ones the kill switch sweeps away.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Proposed | Self::Validated)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [ActionStatus] {
        match self {
            Self::Proposed => &[Self::Validated, Self::Cancelled],
            Self::Validated => &[Self::Executing, Self::Cancelled],
            Self::Executing => &[Self::Completed, Self::Failed, Self::Cancelled],
            // Retry reset re-arms a failed proposal.
            Self::Failed => &[Self::Validated],
            Self::Completed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Source type for actions; determines how they are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Subject-native action, dispatched through the subject's callback.
    Subject,
    /// General tool shipped with the operator.
    Tool,
    /// Member of a multi-step workflow.
    Workflow,
}

impl Default for ActionType {
    fn default() -> Self {
        Self::Subject
    }
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Tool => "tool",
            Self::Workflow => "workflow",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "subject" => Some(Self::Subject),
            "tool" => Some(Self::Tool),
            "workflow" => Some(Self::Workflow),
            _ => None,
        }
    }
}

/// Who asked for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequesterType {
    User,
    System,
    Agent,
}

impl Default for RequesterType {
    fn default() -> Self {
        Self::Agent
    }
}

impl RequesterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
            Self::Agent => "agent",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Self::User),
            "system" => Some(Self::System),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }
}

/// Recorded intent to perform a named, parameterized action.
///
/// Carries dual identity in the OAuth-delegation style: `requester_id` is
/// the resource owner asking for the change, `agent_id` the client acting
/// on their behalf. Both are checked before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionProposal {
    pub id: i64,
    /// Associated ticket for traceability.
    pub ticket_id: Option<i64>,
    /// Name matching a registry definition (e.g., "reset_counter").
    pub action_name: String,
    pub action_type: ActionType,
    pub parameters: Map<String, Value>,
    /// Why this action is proposed (from the diagnosis).
    pub reason: String,
    pub status: ActionStatus,
    pub proposed_at: DateTime<Utc>,
    pub proposed_by: String,

    pub requester_id: String,
    pub requester_type: RequesterType,
    /// Identity of the agent executing the action, if delegated.
    pub agent_id: Option<String>,

    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejection_reason: Option<String>,

    /// Parent workflow, if part of a chain.
    pub workflow_id: Option<i64>,
    /// Order within the workflow, 0-indexed.
    pub execution_order: i64,
    /// Proposal that must complete before this one runs.
    pub depends_on_proposal_id: Option<i64>,

    /// Execute at this time; None means immediate.
    pub scheduled_at: Option<DateTime<Utc>>,

    pub retry_count: i64,
    pub max_retries: i64,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ActionProposal {
    pub fn is_approved(&self) -> bool {
        self.approved_at.is_some()
    }
}

/// Status of a workflow (approved-together sequence of proposals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl Default for WorkflowStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Group of related actions approved and executed together, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowProposal {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub ticket_id: Option<i64>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
}

/// Execution outcome for one attempt of a proposal.
///
/// Multiple records per proposal are allowed, one per retry attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: i64,
    pub proposal_id: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// None while executing, Some after completion.
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub result_data: Option<Value>,
}

/// Structured action recommendation from a diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecommendation {
    pub action_name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub reason: String,
    #[serde(default)]
    pub expected_outcome: String,
    #[serde(default = "default_urgency")]
    pub urgency: String,
}

fn default_urgency() -> String {
    "medium".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_transitions() {
        assert!(ActionStatus::Completed.valid_transitions().is_empty());
        assert!(ActionStatus::Cancelled.valid_transitions().is_empty());
    }

    #[test]
    fn failed_can_only_rearm_to_validated() {
        assert!(ActionStatus::Failed.can_transition_to(ActionStatus::Validated));
        assert!(!ActionStatus::Failed.can_transition_to(ActionStatus::Executing));
        assert!(!ActionStatus::Failed.can_transition_to(ActionStatus::Cancelled));
    }

    #[test]
    fn pending_states_are_killable() {
        assert!(ActionStatus::Proposed.is_pending());
        assert!(ActionStatus::Validated.is_pending());
        assert!(!ActionStatus::Executing.is_pending());
        assert!(!ActionStatus::Completed.is_pending());
    }

    #[test]
    fn status_round_trips() {
        for status in [
            ActionStatus::Proposed,
            ActionStatus::Validated,
            ActionStatus::Executing,
            ActionStatus::Completed,
            ActionStatus::Failed,
            ActionStatus::Cancelled,
        ] {
            assert_eq!(ActionStatus::from_str(status.as_str()), Some(status));
        }
    }
}
