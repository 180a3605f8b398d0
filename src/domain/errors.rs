//! Domain errors for the warden operator.

use thiserror::Error;

/// Domain-level errors that can occur across the operator.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Ticket not found: {0}")]
    TicketNotFound(i64),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(i64),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(i64),

    #[error("Campaign not found: {0}")]
    CampaignNotFound(i64),

    #[error("Trial not found: {0}")]
    TrialNotFound(i64),

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Parameter validation failed for '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error(
        "Action execution blocked: observe-only mode is active. \
         To enable action execution, set safety mode to execute."
    )]
    ObserveOnly,

    #[error(
        "Action '{action_name}' (proposal {proposal_id}) requires approval. \
         Run: warden actions approve {proposal_id}"
    )]
    ApprovalRequired { proposal_id: i64, action_name: String },

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Subject unavailable: {0}")]
    SubjectUnavailable(String),

    #[error("Chaos injection failed: {0}")]
    ChaosFailed(String),

    #[error("Action execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Script rejected: {0}")]
    ScriptRejected(String),

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether the CLI should exit with the typed-failure code (2).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TicketNotFound(_)
                | Self::ProposalNotFound(_)
                | Self::WorkflowNotFound(_)
                | Self::CampaignNotFound(_)
                | Self::TrialNotFound(_)
        )
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
