//! Audit logging for action lifecycle and safety events.

use serde_json::{json, Value};

use crate::domain::errors::DomainResult;
use crate::domain::models::action::ActionProposal;
use crate::domain::models::audit::AuditEventType;
use crate::infrastructure::database::AuditLogRepository;
use crate::infrastructure::logging::SecretRedactor;

/// Writes lifecycle events to the append-only audit log.
///
/// Secrets are redacted from event data before serialization and
/// persistence. Events are derived from state changes already written;
/// the audit log is never the source of truth.
pub struct ActionAuditor {
    repo: AuditLogRepository,
    redactor: SecretRedactor,
}

impl ActionAuditor {
    pub fn new(repo: AuditLogRepository) -> Self {
        Self {
            repo,
            redactor: SecretRedactor::new(),
        }
    }

    pub async fn log_event(
        &self,
        proposal_id: Option<i64>,
        event_type: AuditEventType,
        event_data: Option<Value>,
        actor: &str,
    ) -> DomainResult<()> {
        let redacted = event_data.map(|data| self.redactor.redact_value(&data));
        self.repo
            .append(proposal_id, event_type, redacted.as_ref(), actor)
            .await
    }

    pub async fn log_proposal_created(&self, proposal: &ActionProposal) -> DomainResult<()> {
        self.log_event(
            Some(proposal.id),
            AuditEventType::Proposed,
            Some(json!({
                "action_name": proposal.action_name,
                "action_type": proposal.action_type.as_str(),
                "parameters": proposal.parameters,
                "reason": proposal.reason,
            })),
            &proposal.proposed_by,
        )
        .await
    }

    pub async fn log_validation_passed(&self, proposal_id: i64) -> DomainResult<()> {
        self.log_event(Some(proposal_id), AuditEventType::Validated, None, "system")
            .await
    }

    /// Execution start carries the dual identity so the audit trail
    /// records who asked and which agent acted.
    pub async fn log_execution_started(
        &self,
        proposal_id: i64,
        requester_id: &str,
        agent_id: Option<&str>,
    ) -> DomainResult<()> {
        let mut data = json!({ "requester_id": requester_id });
        if let Some(agent_id) = agent_id {
            data["agent_id"] = json!(agent_id);
        }
        self.log_event(Some(proposal_id), AuditEventType::Executing, Some(data), "system")
            .await
    }

    pub async fn log_execution_completed(
        &self,
        proposal_id: i64,
        success: bool,
        error: Option<&str>,
        duration_ms: i64,
        result: Option<&Value>,
    ) -> DomainResult<()> {
        let mut data = json!({ "duration_ms": duration_ms });
        if let Some(error) = error {
            data["error"] = json!(error);
        }
        if let Some(result) = result {
            data["result"] = result.clone();
        }
        let event_type = if success {
            AuditEventType::Completed
        } else {
            AuditEventType::Failed
        };
        self.log_event(Some(proposal_id), event_type, Some(data), "system")
            .await
    }

    pub async fn log_cancelled(&self, proposal_id: i64, reason: &str) -> DomainResult<()> {
        self.log_event(
            Some(proposal_id),
            AuditEventType::Cancelled,
            Some(json!({ "reason": reason })),
            "system",
        )
        .await
    }

    pub async fn log_retry_scheduled(
        &self,
        proposal_id: i64,
        retry_count: i64,
        next_retry_at: &str,
    ) -> DomainResult<()> {
        self.log_event(
            Some(proposal_id),
            AuditEventType::RetryScheduled,
            Some(json!({ "retry_count": retry_count, "next_retry_at": next_retry_at })),
            "system",
        )
        .await
    }

    pub async fn log_retry_exhausted(
        &self,
        proposal_id: i64,
        retry_count: i64,
        max_retries: i64,
        last_error: &str,
    ) -> DomainResult<()> {
        self.log_event(
            Some(proposal_id),
            AuditEventType::RetryExhausted,
            Some(json!({
                "retry_count": retry_count,
                "max_retries": max_retries,
                "last_error": last_error,
            })),
            "system",
        )
        .await
    }

    pub async fn log_workflow_created(
        &self,
        workflow_id: i64,
        name: &str,
        action_count: usize,
    ) -> DomainResult<()> {
        self.log_event(
            None,
            AuditEventType::WorkflowCreated,
            Some(json!({
                "workflow_id": workflow_id,
                "name": name,
                "action_count": action_count,
            })),
            "agent",
        )
        .await
    }

    pub async fn log_kill_switch(
        &self,
        cancelled_count: u64,
        containers_killed: u64,
        tasks_cancelled: u64,
    ) -> DomainResult<()> {
        self.log_event(
            None,
            AuditEventType::KillSwitch,
            Some(json!({
                "cancelled_count": cancelled_count,
                "containers_killed": containers_killed,
                "tasks_cancelled": tasks_cancelled,
            })),
            "system",
        )
        .await
    }

    pub async fn log_mode_change(&self, old_mode: &str, new_mode: &str) -> DomainResult<()> {
        self.log_event(
            None,
            AuditEventType::ModeChange,
            Some(json!({ "old_mode": old_mode, "new_mode": new_mode })),
            "system",
        )
        .await
    }
}
