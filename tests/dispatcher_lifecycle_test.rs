//! End-to-end action lifecycle: propose, validate, gate, execute,
//! retry, kill switch.

mod common;

use serde_json::json;
use std::sync::Arc;

use common::{test_pool, CounterSubject};
use warden::domain::errors::DomainError;
use warden::domain::models::action::{ActionRecommendation, ActionStatus};
use warden::domain::models::audit::AuditEventType;
use warden::domain::models::config::RetryConfig;
use warden::domain::ports::authorization::{AllowAllCapabilities, AllowAllPermissions, CapabilityChecker, PermissionChecker};
use warden::domain::ports::subject::Subject;
use warden::infrastructure::database::{ActionRepository, AuditLogRepository};
use warden::services::audit::ActionAuditor;
use warden::services::dispatcher::ActionDispatcher;
use warden::services::registry::ActionRegistry;
use warden::services::retry::RetryPlanner;
use warden::services::safety::{SafetyController, SafetyMode};
use warden::services::tools::GeneralToolExecutor;

struct Harness {
    dispatcher: ActionDispatcher,
    subject: Arc<CounterSubject>,
    actions: ActionRepository,
    audit: AuditLogRepository,
    safety: Arc<SafetyController>,
    auditor: Arc<ActionAuditor>,
}

impl Harness {
    fn subject_dyn(&self) -> Arc<dyn Subject> {
        let subject: Arc<dyn Subject> = self.subject.clone();
        subject
    }
}

async fn harness(mode: SafetyMode, approval_mode: bool) -> Harness {
    harness_with_auth(
        mode,
        approval_mode,
        Box::new(AllowAllPermissions),
        Box::new(AllowAllCapabilities),
    )
    .await
}

async fn harness_with_auth(
    mode: SafetyMode,
    approval_mode: bool,
    permissions: Box<dyn PermissionChecker>,
    capabilities: Box<dyn CapabilityChecker>,
) -> Harness {
    let pool = test_pool().await;
    let subject = CounterSubject::new(20, 10);
    let safety = Arc::new(SafetyController::with_mode(
        ActionRepository::new(pool.clone()),
        mode,
    ));
    let auditor = Arc::new(ActionAuditor::new(AuditLogRepository::new(pool.clone())));
    let subject_dyn: Arc<dyn Subject> = subject.clone();
    let registry = Arc::new(ActionRegistry::new(subject_dyn));

    let dispatcher = ActionDispatcher::new(
        ActionRepository::new(pool.clone()),
        registry,
        Arc::clone(&safety),
        Arc::clone(&auditor),
        permissions,
        capabilities,
        Arc::new(GeneralToolExecutor::new()),
        RetryPlanner::new(RetryConfig {
            max_retries: 3,
            base_delay_secs: 0.01,
            factor: 2.0,
            max_delay_secs: 1.0,
            jitter_ratio: 0.0,
        }),
        approval_mode,
    );

    Harness {
        dispatcher,
        subject,
        actions: ActionRepository::new(pool.clone()),
        audit: AuditLogRepository::new(pool),
        safety,
        auditor,
    }
}

fn reset_recommendation() -> ActionRecommendation {
    let mut parameters = serde_json::Map::new();
    parameters.insert("key".to_string(), json!("k1"));
    ActionRecommendation {
        action_name: "reset_counter".to_string(),
        parameters,
        reason: "counter stuck over limit".to_string(),
        expected_outcome: "counter returns to zero".to_string(),
        urgency: "high".to_string(),
    }
}

#[tokio::test]
async fn full_lifecycle_executes_and_audits() {
    let h = harness(SafetyMode::Execute, false).await;

    let proposal = h.dispatcher.propose(&reset_recommendation(), Some(1)).await.unwrap();
    assert_eq!(proposal.status, ActionStatus::Proposed);

    let validated = h.dispatcher.validate_proposal(proposal.id).await.unwrap();
    assert_eq!(validated.status, ActionStatus::Validated);

    let record = h
        .dispatcher
        .execute_proposal(proposal.id, h.subject_dyn())
        .await
        .unwrap();
    assert_eq!(record.success, Some(true));
    assert!(record.completed_at.is_some());

    // The subject's counter is actually reset.
    assert_eq!(h.subject.count(), 0);

    let final_proposal = h.actions.get_proposal(proposal.id).await.unwrap();
    assert_eq!(final_proposal.status, ActionStatus::Completed);

    // Audit trail: proposed, validated, executing, completed.
    let events = h.audit.list(Some(proposal.id), None, 50).await.unwrap();
    let mut types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    types.reverse();
    assert_eq!(types, vec!["proposed", "validated", "executing", "completed"]);
}

#[tokio::test]
async fn observe_mode_blocks_propose_validate_execute() {
    let h = harness(SafetyMode::Observe, false).await;

    let err = h.dispatcher.propose(&reset_recommendation(), None).await.unwrap_err();
    assert!(matches!(err, DomainError::ObserveOnly));

    // Nothing was persisted and nothing was audited.
    assert!(h.actions.list_proposals(None).await.unwrap().is_empty());
    assert!(h.audit.list(None, None, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn flipping_to_observe_cancels_nonterminal_proposals() {
    let h = harness(SafetyMode::Execute, false).await;

    let a = h.dispatcher.propose(&reset_recommendation(), None).await.unwrap();
    let b = h.dispatcher.propose(&reset_recommendation(), None).await.unwrap();
    h.dispatcher.validate_proposal(b.id).await.unwrap();

    h.safety.set_mode(SafetyMode::Observe, &h.auditor).await.unwrap();

    assert_eq!(h.actions.get_proposal(a.id).await.unwrap().status, ActionStatus::Cancelled);
    assert_eq!(h.actions.get_proposal(b.id).await.unwrap().status, ActionStatus::Cancelled);

    let err = h
        .dispatcher
        .execute_proposal(b.id, h.subject_dyn())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ObserveOnly));
}

#[tokio::test]
async fn kill_switch_leaves_no_pending_and_audits() {
    let h = harness(SafetyMode::Execute, false).await;

    h.dispatcher.propose(&reset_recommendation(), None).await.unwrap();
    let b = h.dispatcher.propose(&reset_recommendation(), None).await.unwrap();
    h.dispatcher.validate_proposal(b.id).await.unwrap();

    let report = h.safety.kill_switch(&h.auditor).await.unwrap();
    assert_eq!(report.pending_proposals, 2);
    assert_eq!(h.safety.mode(), SafetyMode::Observe);

    for status in [ActionStatus::Proposed, ActionStatus::Validated, ActionStatus::Executing] {
        assert!(
            h.actions.list_proposals(Some(status)).await.unwrap().is_empty(),
            "no proposal should remain {status:?}"
        );
    }

    let kills = h.audit.list(None, Some(AuditEventType::KillSwitch), 10).await.unwrap();
    assert_eq!(kills.len(), 1);
}

#[tokio::test]
async fn approval_gate_blocks_until_user_approves() {
    let h = harness(SafetyMode::Execute, true).await;

    let proposal = h.dispatcher.propose(&reset_recommendation(), None).await.unwrap();
    h.dispatcher.validate_proposal(proposal.id).await.unwrap();

    let err = h
        .dispatcher
        .execute_proposal(proposal.id, h.subject_dyn())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ApprovalRequired { .. }));

    // Proposal stays validated; explicit approval resumes it.
    let pending = h.actions.get_proposal(proposal.id).await.unwrap();
    assert_eq!(pending.status, ActionStatus::Validated);

    h.actions.approve_proposal(proposal.id, "user").await.unwrap();
    let record = h
        .dispatcher
        .execute_proposal(proposal.id, h.subject_dyn())
        .await
        .unwrap();
    assert_eq!(record.success, Some(true));

    let approved = h.actions.get_proposal(proposal.id).await.unwrap();
    assert_eq!(approved.approved_by.as_deref(), Some("user"));
    assert_eq!(approved.status, ActionStatus::Completed);
}

#[tokio::test]
async fn validate_is_idempotent_on_validated_proposals() {
    let h = harness(SafetyMode::Execute, false).await;

    let proposal = h.dispatcher.propose(&reset_recommendation(), None).await.unwrap();
    let first = h.dispatcher.validate_proposal(proposal.id).await.unwrap();
    let second = h.dispatcher.validate_proposal(proposal.id).await.unwrap();
    assert_eq!(first.status, ActionStatus::Validated);
    assert_eq!(second.status, ActionStatus::Validated);
}

#[tokio::test]
async fn failing_action_exhausts_retry_budget_with_increasing_times() {
    let h = harness(SafetyMode::Execute, false).await;

    let recommendation = ActionRecommendation {
        action_name: "always_fails".to_string(),
        parameters: serde_json::Map::new(),
        reason: "test retry".to_string(),
        expected_outcome: String::new(),
        urgency: "low".to_string(),
    };
    let proposal = h.dispatcher.propose(&recommendation, None).await.unwrap();
    h.dispatcher.validate_proposal(proposal.id).await.unwrap();

    let mut retry_times = Vec::new();
    loop {
        let record = h
            .dispatcher
            .execute_proposal(proposal.id, h.subject_dyn())
            .await
            .unwrap();
        assert_eq!(record.success, Some(false));

        match h
            .dispatcher
            .schedule_next_retry(proposal.id, record.error_message.as_deref().unwrap_or(""))
            .await
            .unwrap()
        {
            Some(next) => {
                retry_times.push(next);
                // Wait out the backoff, then re-arm like the agent would.
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                h.actions.reset_for_retry(proposal.id).await.unwrap();
            }
            None => break,
        }
    }

    // max_retries=3: exactly three scheduled retries, then exhaustion.
    assert_eq!(retry_times.len(), 3);
    assert!(retry_times.windows(2).all(|w| w[0] < w[1]), "next_retry_at must increase");

    let scheduled = h
        .audit
        .list(Some(proposal.id), Some(AuditEventType::RetryScheduled), 50)
        .await
        .unwrap();
    assert_eq!(scheduled.len(), 3);
    let exhausted = h
        .audit
        .list(Some(proposal.id), Some(AuditEventType::RetryExhausted), 50)
        .await
        .unwrap();
    assert_eq!(exhausted.len(), 1);

    // One record per attempt.
    let records = h.actions.records_for_proposal(proposal.id).await.unwrap();
    assert_eq!(records.len(), 4);
}

#[tokio::test]
async fn workflow_members_share_approval() {
    let h = harness(SafetyMode::Execute, false).await;

    let workflow_id = h
        .dispatcher
        .propose_workflow(
            "reset_twice",
            "Reset the counter, then reset it again",
            &[reset_recommendation(), reset_recommendation()],
            Some(1),
        )
        .await
        .unwrap();

    let members = h.actions.workflow_members(workflow_id).await.unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].execution_order, 0);
    assert_eq!(members[1].execution_order, 1);
    assert_eq!(members[1].depends_on_proposal_id, Some(members[0].id));

    h.actions.approve_workflow(workflow_id, "user").await.unwrap();
    let members = h.actions.workflow_members(workflow_id).await.unwrap();
    assert!(members.iter().all(|m| m.is_approved()));

    let created = h
        .audit
        .list(None, Some(AuditEventType::WorkflowCreated), 10)
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
}

struct DenyAgent;
impl CapabilityChecker for DenyAgent {
    fn has_capability(&self, _agent_id: &str, _action_name: &str) -> bool {
        false
    }
}

#[tokio::test]
async fn failed_capability_check_cancels_before_side_effects() {
    let h = harness_with_auth(
        SafetyMode::Execute,
        false,
        Box::new(AllowAllPermissions),
        Box::new(DenyAgent),
    )
    .await;

    let proposal = h.dispatcher.propose(&reset_recommendation(), None).await.unwrap();
    h.dispatcher.validate_proposal(proposal.id).await.unwrap();

    let err = h
        .dispatcher
        .execute_proposal(proposal.id, h.subject_dyn())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Authorization(_)));

    // No execution happened: counter untouched, no record written.
    assert_eq!(h.subject.count(), 20);
    assert!(h.actions.records_for_proposal(proposal.id).await.unwrap().is_empty());

    // Audited as cancelled, not completed/failed.
    let cancelled = h.actions.get_proposal(proposal.id).await.unwrap();
    assert_eq!(cancelled.status, ActionStatus::Cancelled);
    let events = h
        .audit
        .list(Some(proposal.id), Some(AuditEventType::Cancelled), 10)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn unknown_action_is_rejected_at_proposal() {
    let h = harness(SafetyMode::Execute, false).await;
    let recommendation = ActionRecommendation {
        action_name: "summon_gremlins".to_string(),
        parameters: serde_json::Map::new(),
        reason: "chaos".to_string(),
        expected_outcome: String::new(),
        urgency: "low".to_string(),
    };
    let err = h.dispatcher.propose(&recommendation, None).await.unwrap_err();
    assert!(matches!(err, DomainError::UnknownAction(_)));
}
