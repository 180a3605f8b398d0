//! Monitor loop: observe, check invariants, reconcile tickets.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::ports::checker::InvariantChecker;
use crate::domain::ports::subject::Subject;
use crate::infrastructure::database::TicketRepository;
use crate::services::shutdown::ShutdownSignal;

/// Long-running daemon that checks invariants and manages tickets.
///
/// Subject-agnostic: works with any `Subject` and `InvariantChecker`
/// pair. One tick observes, checks, creates/updates tickets for
/// violations, and auto-resolves tickets whose violations cleared.
///
/// A failed observation produces no violations and no auto-resolve
/// wave; only a successful observation may resolve tickets.
pub struct MonitorLoop {
    subject: Arc<dyn Subject>,
    checker: Box<dyn InvariantChecker>,
    tickets: TicketRepository,
    interval: Duration,
    shutdown: ShutdownSignal,
}

impl MonitorLoop {
    pub fn new(
        subject: Arc<dyn Subject>,
        checker: Box<dyn InvariantChecker>,
        tickets: TicketRepository,
        interval: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            subject,
            checker,
            tickets,
            interval,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires. Ticks complete atomically;
    /// the per-tick sleep is a bounded wait on the signal.
    pub async fn run(&mut self) -> DomainResult<()> {
        info!(interval_secs = self.interval.as_secs_f64(), "monitor loop starting");

        while !self.shutdown.is_set() {
            self.check_cycle().await;
            self.shutdown.wait_timeout(self.interval).await;
        }

        info!("monitor loop stopped");
        Ok(())
    }

    /// One observe/check/reconcile cycle.
    pub async fn check_cycle(&mut self) {
        let observation = match self.subject.observe().await {
            Ok(observation) => observation,
            Err(err) => {
                // Transient subject failure: no violations inferred, no
                // auto-resolve. Retry next tick.
                error!(error = %err, "observation failed, skipping tick");
                return;
            }
        };

        let violations = self.checker.check(&observation);
        let metric_snapshot = serde_json::Value::Object(observation);

        let batch_key = format!("batch-{}", Uuid::new_v4());
        for violation in &violations {
            if let Err(err) = self
                .tickets
                .create_or_update(violation, Some(&metric_snapshot), Some(&batch_key), None)
                .await
            {
                error!(error = %err, invariant = %violation.invariant_name, "failed to upsert ticket");
            }
        }

        let current_keys: HashSet<String> =
            violations.iter().map(|v| v.violation_key()).collect();
        match self.tickets.auto_resolve_cleared(&current_keys).await {
            Ok(resolved) if resolved > 0 => info!(resolved, "auto-resolved tickets"),
            Ok(_) => {}
            Err(err) => error!(error = %err, "auto-resolve failed"),
        }

        let status = if violations.is_empty() {
            "all passing".to_string()
        } else {
            format!("{} violations", violations.len())
        };
        info!(
            "Check complete: {} invariants, {status}",
            self.checker.invariant_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainError;
    use crate::domain::models::registry::ActionDefinition;
    use crate::domain::models::ticket::{Observation, Severity, TicketStatus, Violation};
    use crate::infrastructure::database::DatabaseConnection;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Subject whose observation is swapped by the test between ticks.
    struct ScriptedSubject {
        observation: Mutex<Option<Observation>>,
        fail: AtomicBool,
    }

    impl ScriptedSubject {
        fn new() -> Self {
            Self {
                observation: Mutex::new(Some(Observation::new())),
                fail: AtomicBool::new(false),
            }
        }

        fn set_observation(&self, obs: Observation) {
            *self.observation.lock().unwrap() = Some(obs);
        }

        fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Subject for ScriptedSubject {
        async fn observe(&self) -> DomainResult<Observation> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DomainError::SubjectUnavailable("connection refused".into()));
            }
            Ok(self.observation.lock().unwrap().clone().unwrap_or_default())
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

    /// Checker that reports `node_down` for every name under "down".
    struct DownNodeChecker;

    impl InvariantChecker for DownNodeChecker {
        fn check(&mut self, observation: &Observation) -> Vec<Violation> {
            observation
                .get("down")
                .and_then(Value::as_array)
                .map(|nodes| {
                    nodes
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|node| Violation {
                            invariant_name: "node_down".to_string(),
                            message: format!("node {node} is Down"),
                            first_seen: Utc::now(),
                            last_seen: Utc::now(),
                            entity_id: Some(node.to_string()),
                            severity: Severity::Critical,
                        })
                        .collect()
                })
                .unwrap_or_default()
        }

        fn invariant_count(&self) -> usize {
            1
        }
    }

    async fn setup(subject: Arc<ScriptedSubject>) -> (MonitorLoop, TicketRepository) {
        let db = DatabaseConnection::new("sqlite::memory:")
            .await
            .expect("failed to create connection");
        db.migrate().await.expect("failed to run migrations");
        let tickets = TicketRepository::new(db.pool().clone());
        let monitor = MonitorLoop::new(
            subject,
            Box::new(DownNodeChecker),
            TicketRepository::new(db.pool().clone()),
            Duration::from_millis(10),
            ShutdownSignal::new(),
        );
        (monitor, tickets)
    }

    fn obs(down: &[&str]) -> Observation {
        let mut map = Observation::new();
        map.insert("down".to_string(), json!(down));
        map
    }

    #[tokio::test]
    async fn violation_creates_then_clears_resolves() {
        let subject = Arc::new(ScriptedSubject::new());
        let (mut monitor, tickets) = setup(Arc::clone(&subject)).await;

        subject.set_observation(obs(&["n1"]));
        monitor.check_cycle().await;
        monitor.check_cycle().await;
        monitor.check_cycle().await;

        let open = tickets.list(Some(TicketStatus::Open)).await.unwrap();
        assert_eq!(open.len(), 1);
        assert!(open[0].occurrence_count >= 3);
        assert!(open[0].metric_snapshot.is_some());

        subject.set_observation(obs(&[]));
        monitor.check_cycle().await;

        let resolved = tickets.list(Some(TicketStatus::Resolved)).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].resolved_at.is_some());
    }

    #[tokio::test]
    async fn observation_failure_does_not_resolve_or_create() {
        let subject = Arc::new(ScriptedSubject::new());
        let (mut monitor, tickets) = setup(Arc::clone(&subject)).await;

        subject.set_observation(obs(&["n1"]));
        monitor.check_cycle().await;
        assert_eq!(tickets.list(Some(TicketStatus::Open)).await.unwrap().len(), 1);

        // API failure: the open ticket must survive the tick untouched.
        subject.set_failing(true);
        monitor.check_cycle().await;

        let open = tickets.list(Some(TicketStatus::Open)).await.unwrap();
        assert_eq!(open.len(), 1);
        assert!(tickets.list(Some(TicketStatus::Resolved)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_exits_on_shutdown() {
        let subject = Arc::new(ScriptedSubject::new());
        let (monitor, _) = setup(Arc::clone(&subject)).await;
        let shutdown = monitor.shutdown.clone();
        let mut monitor = monitor;

        let handle = tokio::spawn(async move { monitor.run().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor should stop promptly")
            .unwrap()
            .unwrap();
    }
}
