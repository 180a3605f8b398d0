//! Action dispatcher: proposal -> validate -> gate -> execute, plus the
//! retry and cancellation paths.
//!
//! All persistent transitions go through the action store; audit events
//! are emitted after the state change they describe.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::action::{
    ActionProposal, ActionRecommendation, ActionRecord, ActionStatus, ActionType, RequesterType,
};
use crate::domain::models::registry::{ActionDefinition, RiskTier};
use crate::domain::ports::authorization::{CapabilityChecker, PermissionChecker};
use crate::domain::ports::subject::Subject;
use crate::domain::ports::tools::ToolExecutor;
use crate::infrastructure::database::action_repo::NewProposal;
use crate::infrastructure::database::ActionRepository;
use crate::services::audit::ActionAuditor;
use crate::services::authorization::check_dual_authorization;
use crate::services::registry::ActionRegistry;
use crate::services::retry::RetryPlanner;
use crate::services::safety::SafetyController;
use crate::services::session::SessionRiskTracker;
use crate::services::validation::validate_action_params;

/// Identity attached to proposals created by this dispatcher.
pub struct DispatchIdentity {
    pub proposed_by: String,
    pub requester_id: String,
    pub requester_type: RequesterType,
    pub agent_id: Option<String>,
}

impl Default for DispatchIdentity {
    fn default() -> Self {
        Self {
            proposed_by: "agent".to_string(),
            requester_id: "agent:autonomous".to_string(),
            requester_type: RequesterType::Agent,
            agent_id: Some("agent-remediation".to_string()),
        }
    }
}

/// Coordinator for the full action lifecycle.
pub struct ActionDispatcher {
    actions: ActionRepository,
    registry: Arc<ActionRegistry>,
    safety: Arc<SafetyController>,
    auditor: Arc<ActionAuditor>,
    permissions: Box<dyn PermissionChecker>,
    capabilities: Box<dyn CapabilityChecker>,
    tools: Arc<dyn ToolExecutor>,
    retry: RetryPlanner,
    risk: Mutex<SessionRiskTracker>,
    identity: DispatchIdentity,
    /// Global approval mode: when true every execution needs approval.
    approval_mode: bool,
}

impl ActionDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        actions: ActionRepository,
        registry: Arc<ActionRegistry>,
        safety: Arc<SafetyController>,
        auditor: Arc<ActionAuditor>,
        permissions: Box<dyn PermissionChecker>,
        capabilities: Box<dyn CapabilityChecker>,
        tools: Arc<dyn ToolExecutor>,
        retry: RetryPlanner,
        approval_mode: bool,
    ) -> Self {
        Self {
            actions,
            registry,
            safety,
            auditor,
            permissions,
            capabilities,
            tools,
            retry,
            risk: Mutex::new(SessionRiskTracker::new(format!(
                "session-{}",
                uuid::Uuid::new_v4()
            ))),
            identity: DispatchIdentity::default(),
            approval_mode,
        }
    }

    pub fn actions(&self) -> &ActionRepository {
        &self.actions
    }

    fn resolve_definition(&self, action_name: &str) -> DomainResult<ActionDefinition> {
        self.registry.get_definition(action_name).ok_or_else(|| {
            DomainError::UnknownAction(format!(
                "{action_name} (available: {})",
                self.registry.list_names().join(", ")
            ))
        })
    }

    fn requires_approval(&self, definition: &ActionDefinition) -> bool {
        self.approval_mode || definition.requires_approval
    }

    /// Create a proposal from a diagnosis recommendation.
    ///
    /// Proposals are blocked in observe mode, the action must exist in
    /// the registry, and parameters are validated before anything is
    /// stored.
    pub async fn propose(
        &self,
        recommendation: &ActionRecommendation,
        ticket_id: Option<i64>,
    ) -> DomainResult<ActionProposal> {
        self.safety.check_can_execute()?;

        let definition = self.resolve_definition(&recommendation.action_name)?;
        let effective = validate_action_params(&definition, &recommendation.parameters)?;

        let proposal = self
            .actions
            .create_proposal(NewProposal {
                ticket_id,
                action_name: recommendation.action_name.clone(),
                action_type: definition.action_type,
                parameters: effective,
                reason: recommendation.reason.clone(),
                proposed_by: self.identity.proposed_by.clone(),
                requester_id: self.identity.requester_id.clone(),
                requester_type: self.identity.requester_type,
                agent_id: self.identity.agent_id.clone(),
                workflow_id: None,
                execution_order: 0,
                depends_on_proposal_id: None,
                scheduled_at: None,
                max_retries: self.retry.max_retries(),
            })
            .await?;

        self.auditor.log_proposal_created(&proposal).await?;
        info!(
            proposal_id = proposal.id,
            action = %proposal.action_name,
            "action proposed"
        );
        Ok(proposal)
    }

    /// Create a workflow with ordered member proposals. All members are
    /// validated up front; approving the workflow approves every member.
    pub async fn propose_workflow(
        &self,
        name: &str,
        description: &str,
        recommendations: &[ActionRecommendation],
        ticket_id: Option<i64>,
    ) -> DomainResult<i64> {
        self.safety.check_can_execute()?;

        if recommendations.is_empty() {
            return Err(DomainError::Validation {
                field: "actions".to_string(),
                reason: "workflow must contain at least one action".to_string(),
            });
        }

        let mut validated = Vec::with_capacity(recommendations.len());
        for rec in recommendations {
            let definition = self.resolve_definition(&rec.action_name)?;
            let effective = validate_action_params(&definition, &rec.parameters)?;
            validated.push((rec, definition, effective));
        }

        let workflow = self.actions.create_workflow(name, description, ticket_id).await?;

        let mut previous_id: Option<i64> = None;
        for (order, (rec, definition, effective)) in validated.into_iter().enumerate() {
            let proposal = self
                .actions
                .create_proposal(NewProposal {
                    ticket_id,
                    action_name: rec.action_name.clone(),
                    action_type: definition.action_type,
                    parameters: effective,
                    reason: rec.reason.clone(),
                    proposed_by: self.identity.proposed_by.clone(),
                    requester_id: self.identity.requester_id.clone(),
                    requester_type: self.identity.requester_type,
                    agent_id: self.identity.agent_id.clone(),
                    workflow_id: Some(workflow.id),
                    execution_order: i64::try_from(order).unwrap_or(0),
                    depends_on_proposal_id: previous_id,
                    scheduled_at: None,
                    max_retries: self.retry.max_retries(),
                })
                .await?;
            self.auditor.log_proposal_created(&proposal).await?;
            previous_id = Some(proposal.id);
        }

        self.auditor
            .log_workflow_created(workflow.id, name, recommendations.len())
            .await?;
        Ok(workflow.id)
    }

    /// Re-resolve the definition, revalidate parameters, and transition
    /// `proposed -> validated`. Safe to call again on a validated
    /// proposal; re-fails if the registry definition changed.
    pub async fn validate_proposal(&self, proposal_id: i64) -> DomainResult<ActionProposal> {
        let proposal = self.actions.get_proposal(proposal_id).await?;

        let definition = self.resolve_definition(&proposal.action_name)?;
        validate_action_params(&definition, &proposal.parameters)?;

        match proposal.status {
            ActionStatus::Proposed => {
                self.actions
                    .update_status(proposal_id, ActionStatus::Validated)
                    .await?;
                self.auditor.log_validation_passed(proposal_id).await?;
            }
            // Round-trip: revalidating an already validated proposal is a no-op.
            ActionStatus::Validated => {}
            other => {
                return Err(DomainError::InvalidStateTransition {
                    from: other.as_str().to_string(),
                    to: ActionStatus::Validated.as_str().to_string(),
                });
            }
        }

        self.actions.get_proposal(proposal_id).await
    }

    /// Execute a validated proposal against the subject.
    ///
    /// Gates, in order: safety mode, approval, parameter revalidation,
    /// dual authorization. The execution itself runs as an abortable
    /// task registered with the safety controller so the kill switch can
    /// stop it mid-flight.
    pub async fn execute_proposal(
        &self,
        proposal_id: i64,
        subject: Arc<dyn Subject>,
    ) -> DomainResult<ActionRecord> {
        self.safety.check_can_execute()?;

        let proposal = self.actions.get_proposal(proposal_id).await?;
        let definition = self.resolve_definition(&proposal.action_name)?;

        if self.requires_approval(&definition) && !proposal.is_approved() {
            return Err(DomainError::ApprovalRequired {
                proposal_id: proposal.id,
                action_name: proposal.action_name.clone(),
            });
        }

        if proposal.status != ActionStatus::Validated {
            return Err(DomainError::InvalidStateTransition {
                from: proposal.status.as_str().to_string(),
                to: ActionStatus::Executing.as_str().to_string(),
            });
        }

        // Definitions may have changed since validation.
        let effective = validate_action_params(&definition, &proposal.parameters)?;

        if let Err(err) = check_dual_authorization(
            &proposal,
            self.permissions.as_ref(),
            self.capabilities.as_ref(),
        ) {
            self.actions
                .update_status(proposal_id, ActionStatus::Cancelled)
                .await?;
            self.auditor
                .log_cancelled(proposal_id, &err.to_string())
                .await?;
            return Err(err);
        }

        self.note_risk(&proposal.action_name, definition.risk_level);

        self.actions
            .update_status(proposal_id, ActionStatus::Executing)
            .await?;
        let started = Utc::now();
        let record = self.actions.create_record(proposal_id, started).await?;
        self.auditor
            .log_execution_started(
                proposal_id,
                &proposal.requester_id,
                proposal.agent_id.as_deref(),
            )
            .await?;

        let outcome = self
            .run_action(definition.action_type, &proposal.action_name, &effective, subject)
            .await;
        let duration_ms = (Utc::now() - started).num_milliseconds();

        let (success, error_message, result_data) = match outcome {
            Ok(result) => (true, None, result),
            Err(err) => (false, Some(err.to_string()), None),
        };

        self.actions
            .finish_record(
                record.id,
                success,
                error_message.as_deref(),
                result_data.as_ref(),
            )
            .await?;
        let final_status = if success {
            ActionStatus::Completed
        } else {
            ActionStatus::Failed
        };
        self.actions.update_status(proposal_id, final_status).await?;
        self.auditor
            .log_execution_completed(
                proposal_id,
                success,
                error_message.as_deref(),
                duration_ms,
                result_data.as_ref(),
            )
            .await?;

        self.actions.get_record(record.id).await
    }

    /// Dispatch by action type, abortable by the kill switch.
    async fn run_action(
        &self,
        action_type: ActionType,
        action_name: &str,
        parameters: &Map<String, Value>,
        subject: Arc<dyn Subject>,
    ) -> DomainResult<Option<Value>> {
        let name = action_name.to_string();
        let params = parameters.clone();
        let tools = Arc::clone(&self.tools);

        let handle = match action_type {
            ActionType::Subject | ActionType::Workflow => tokio::spawn(async move {
                subject.invoke(&name, &params).await
            }),
            ActionType::Tool => tokio::spawn(async move {
                tools.execute(&name, &params).await.map(Some)
            }),
        };

        self.safety.track_task(handle.abort_handle());

        match handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_cancelled() => Err(DomainError::ExecutionFailed(
                "execution aborted by kill switch".to_string(),
            )),
            Err(join_err) => Err(DomainError::ExecutionFailed(join_err.to_string())),
        }
    }

    /// Record the action in the session risk tracker and surface the
    /// rolling score. Risk is observational: it is logged, not gating.
    fn note_risk(&self, action_name: &str, risk_level: RiskTier) {
        let mut tracker = self.risk.lock().expect("risk lock poisoned");
        tracker.add_action(action_name);
        let (score, level) = tracker.calculate_risk_score();
        if risk_level >= RiskTier::High {
            warn!(
                action = action_name,
                session = tracker.session_id(),
                score,
                level = level.as_str(),
                "executing high-risk action"
            );
        }
    }

    /// Session risk snapshot: (score, level).
    pub fn session_risk(&self) -> (i64, crate::services::session::RiskLevel) {
        self.risk
            .lock()
            .expect("risk lock poisoned")
            .calculate_risk_score()
    }

    /// Schedule the next retry for a failed proposal.
    ///
    /// Increments the retry counter, stores the error, and either sets
    /// `next_retry_at` with exponential backoff and jitter or emits
    /// `retry_exhausted` when the budget is spent.
    pub async fn schedule_next_retry(
        &self,
        proposal_id: i64,
        error_message: &str,
    ) -> DomainResult<Option<DateTime<Utc>>> {
        let new_count = self.actions.increment_retry(proposal_id, error_message).await?;
        let proposal = self.actions.get_proposal(proposal_id).await?;

        if !self.retry.should_retry(new_count) {
            self.auditor
                .log_retry_exhausted(proposal_id, new_count, proposal.max_retries, error_message)
                .await?;
            return Ok(None);
        }

        let next_retry = self.retry.next_retry_at(new_count);
        self.actions.set_next_retry(proposal_id, next_retry).await?;
        self.auditor
            .log_retry_scheduled(proposal_id, new_count, &next_retry.to_rfc3339())
            .await?;
        Ok(Some(next_retry))
    }

    /// Cancel a non-terminal proposal.
    pub async fn cancel_proposal(&self, proposal_id: i64, reason: &str) -> DomainResult<()> {
        let proposal = self.actions.get_proposal(proposal_id).await?;
        if proposal.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: proposal.status.as_str().to_string(),
                to: ActionStatus::Cancelled.as_str().to_string(),
            });
        }
        self.actions
            .update_status(proposal_id, ActionStatus::Cancelled)
            .await?;
        self.auditor.log_cancelled(proposal_id, reason).await?;
        Ok(())
    }
}
