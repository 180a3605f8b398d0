//! Eval harness end to end: a fake chaos subject, a simulated operator
//! resolving the incident, and campaign scoring over the results.

mod common;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::test_pool;
use warden::domain::errors::DomainResult;
use warden::domain::models::registry::ActionDefinition;
use warden::domain::models::ticket::{Observation, Severity, Violation};
use warden::domain::ports::subject::{ChaosSubject, Subject};
use warden::infrastructure::database::{AuditLogRepository, EvalRepository, TicketRepository};
use warden::services::eval::harness::{run_campaign, EvalDeps};
use warden::services::eval::scoring::analyze_campaign;

/// Chaos subject whose "cluster" is a single boolean.
struct ToySubject {
    broken: AtomicBool,
}

impl ToySubject {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            broken: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Subject for ToySubject {
    async fn observe(&self) -> DomainResult<Observation> {
        let mut observation = Observation::new();
        observation.insert(
            "healthy".to_string(),
            json!(!self.broken.load(Ordering::SeqCst)),
        );
        Ok(observation)
    }

    fn action_definitions(&self) -> Vec<ActionDefinition> {
        vec![]
    }

    async fn invoke(
        &self,
        _action_name: &str,
        _parameters: &Map<String, Value>,
    ) -> DomainResult<Option<Value>> {
        Ok(None)
    }
}

#[async_trait]
impl ChaosSubject for ToySubject {
    async fn reset(&self) -> DomainResult<()> {
        self.broken.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_healthy(&self, _timeout: Duration) -> DomainResult<bool> {
        Ok(!self.broken.load(Ordering::SeqCst))
    }

    async fn capture_state(&self) -> DomainResult<Value> {
        Ok(json!({ "healthy": !self.broken.load(Ordering::SeqCst) }))
    }

    async fn inject_chaos(
        &self,
        _chaos_type: &str,
        _params: &Map<String, Value>,
    ) -> DomainResult<Value> {
        self.broken.store(true, Ordering::SeqCst);
        Ok(json!({ "chaos_type": "break" }))
    }

    async fn cleanup_chaos(&self, _metadata: &Value) -> DomainResult<()> {
        self.broken.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn chaos_types(&self) -> Vec<String> {
        vec!["break".to_string()]
    }

    fn is_state_healthy(&self, state: &Value) -> bool {
        state["healthy"].as_bool().unwrap_or(false)
    }
}

/// Simulated operator: once a trial is underway, detect the incident,
/// file a ticket, "fix" the subject, and resolve the ticket.
fn spawn_operator(tickets: TicketRepository, subject: Arc<ToySubject>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(200)).await;
            if subject.broken.load(Ordering::SeqCst) {
                let violation = Violation {
                    invariant_name: "subject_broken".to_string(),
                    message: "subject reports unhealthy".to_string(),
                    first_seen: Utc::now(),
                    last_seen: Utc::now(),
                    entity_id: None,
                    severity: Severity::Critical,
                };
                let ticket = tickets
                    .create_or_update(&violation, None, None, None)
                    .await
                    .expect("ticket upsert");

                tokio::time::sleep(Duration::from_millis(200)).await;
                subject.broken.store(false, Ordering::SeqCst);
                tickets.resolve(ticket.id).await.expect("resolve");
            }
        }
    });
}

#[tokio::test]
async fn trial_times_detection_and_resolution() {
    let pool = test_pool().await;
    let subject = ToySubject::new();
    let eval = EvalRepository::new(pool.clone());
    let deps = EvalDeps {
        tickets: TicketRepository::new(pool.clone()),
        audit: AuditLogRepository::new(pool.clone()),
    };

    spawn_operator(TicketRepository::new(pool.clone()), Arc::clone(&subject));

    let chaos_subject: Arc<dyn ChaosSubject> = subject.clone();
    let campaign_id = run_campaign(chaos_subject, "toy", "break", 2, false, &eval, &deps)
        .await
        .unwrap();

    let trials = eval.trials_for_campaign(campaign_id).await.unwrap();
    assert_eq!(trials.len(), 2);

    for trial in &trials {
        // Both timestamps recorded, both at or after injection.
        let created = trial.ticket_created_at.expect("ticket_created_at set");
        let resolved = trial.resolved_at.expect("resolved_at set");
        assert!(created >= trial.chaos_injected_at);
        assert!(resolved >= trial.chaos_injected_at);
        assert!(resolved >= created);
    }

    let summary = analyze_campaign(&eval, campaign_id, |state| {
        state["healthy"].as_bool().unwrap_or(false)
    })
    .await
    .unwrap();
    assert_eq!(summary.trial_count, 2);
    assert_eq!(summary.success_count, 2);
    assert!((summary.win_rate - 1.0).abs() < 1e-9);
    assert!(summary.avg_time_to_detect_sec.unwrap() >= 0.0);
    assert!(summary.avg_time_to_resolve_sec.unwrap() >= 0.0);
}

#[tokio::test]
async fn baseline_trial_records_no_ticket_timing() {
    let pool = test_pool().await;
    let subject = ToySubject::new();
    let eval = EvalRepository::new(pool.clone());
    let deps = EvalDeps {
        tickets: TicketRepository::new(pool.clone()),
        audit: AuditLogRepository::new(pool.clone()),
    };

    let chaos_subject: Arc<dyn ChaosSubject> = subject.clone();
    let campaign_id = run_campaign(chaos_subject, "toy", "break", 1, true, &eval, &deps)
        .await
        .unwrap();

    let trials = eval.trials_for_campaign(campaign_id).await.unwrap();
    assert_eq!(trials.len(), 1);
    assert!(trials[0].ticket_created_at.is_none());
    assert!(trials[0].resolved_at.is_none());

    let campaign = eval.get_campaign(campaign_id).await.unwrap();
    assert!(campaign.baseline);
}
