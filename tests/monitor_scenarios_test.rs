//! Monitor pipeline scenarios against the rate limiter checker.

mod common;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use common::test_pool;
use warden::domain::errors::DomainResult;
use warden::domain::models::registry::ActionDefinition;
use warden::domain::models::ticket::{Observation, TicketStatus};
use warden::domain::ports::subject::Subject;
use warden::infrastructure::database::TicketRepository;
use warden::services::monitor::MonitorLoop;
use warden::services::shutdown::ShutdownSignal;
use warden::subjects::ratelimiter::RateLimiterChecker;

/// Subject whose observation the test swaps between ticks.
struct SwappableSubject {
    observation: Mutex<Observation>,
}

impl SwappableSubject {
    fn new(observation: Observation) -> Arc<Self> {
        Arc::new(Self {
            observation: Mutex::new(observation),
        })
    }

    fn swap(&self, observation: Observation) {
        *self.observation.lock().unwrap() = observation;
    }
}

#[async_trait]
impl Subject for SwappableSubject {
    async fn observe(&self) -> DomainResult<Observation> {
        Ok(self.observation.lock().unwrap().clone())
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

fn observation(nodes: Value, counters: Value, node_metrics: Value) -> Observation {
    let mut map = Observation::new();
    map.insert("nodes".to_string(), nodes);
    map.insert("counters".to_string(), counters);
    map.insert("node_metrics".to_string(), node_metrics);
    map.insert("redis_connected".to_string(), json!(true));
    map
}

fn healthy_nodes() -> Value {
    json!([{"id": "n1", "address": "n1:8000", "state": "Up"}])
}

async fn setup(subject: Arc<SwappableSubject>) -> (MonitorLoop, TicketRepository) {
    let pool = test_pool().await;
    let monitor = MonitorLoop::new(
        subject,
        Box::new(RateLimiterChecker::new()),
        TicketRepository::new(pool.clone()),
        Duration::from_millis(10),
        ShutdownSignal::new(),
    );
    (monitor, TicketRepository::new(pool))
}

#[tokio::test]
async fn node_down_ticket_opens_and_autoresolves() {
    let subject = SwappableSubject::new(observation(
        json!([{"id": "n1", "address": "n1:8000", "state": "Down"}]),
        json!([]),
        json!({}),
    ));
    let (mut monitor, tickets) = setup(Arc::clone(&subject)).await;

    // Violation persists across three ticks: one ticket, three detections.
    monitor.check_cycle().await;
    monitor.check_cycle().await;
    monitor.check_cycle().await;

    let open = tickets.list(Some(TicketStatus::Open)).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].invariant_name, "node_down");
    assert_eq!(open[0].entity_id.as_deref(), Some("n1"));
    assert!(open[0].occurrence_count >= 3);

    // Node recovers: the next tick auto-resolves.
    subject.swap(observation(healthy_nodes(), json!([]), json!({})));
    monitor.check_cycle().await;

    let resolved = tickets.list(Some(TicketStatus::Resolved)).await.unwrap();
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].resolved_at.is_some());
}

#[tokio::test]
async fn transient_latency_spike_never_creates_a_ticket() {
    // Latency above the 100ms threshold, but shorter than the 60s
    // grace period: no ticket may ever appear.
    let subject = SwappableSubject::new(observation(
        healthy_nodes(),
        json!([]),
        json!({"n1": {"latency_p99_ms": 150.0}}),
    ));
    let (mut monitor, tickets) = setup(Arc::clone(&subject)).await;

    monitor.check_cycle().await;
    monitor.check_cycle().await;

    // Spike clears well inside the grace window.
    subject.swap(observation(
        healthy_nodes(),
        json!([]),
        json!({"n1": {"latency_p99_ms": 50.0}}),
    ));
    monitor.check_cycle().await;

    assert!(tickets.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn over_limit_ticket_carries_entity_and_counts() {
    let subject = SwappableSubject::new(observation(
        healthy_nodes(),
        json!([{"key": "k1", "count": 20, "limit": 10, "remaining": 0}]),
        json!({}),
    ));
    let (mut monitor, tickets) = setup(subject).await;

    monitor.check_cycle().await;

    let open = tickets.list(Some(TicketStatus::Open)).await.unwrap();
    assert_eq!(open.len(), 1);
    let ticket = &open[0];
    assert_eq!(ticket.invariant_name, "over_limit");
    assert_eq!(ticket.entity_id.as_deref(), Some("k1"));
    assert!(ticket.message.contains("count=20"));
    assert!(ticket.message.contains("limit=10"));
    assert!(ticket.metric_snapshot.is_some());
}

#[tokio::test]
async fn held_ticket_survives_clearing_until_unheld() {
    let subject = SwappableSubject::new(observation(
        json!([{"id": "n1", "address": "n1:8000", "state": "Down"}]),
        json!([]),
        json!({}),
    ));
    let (mut monitor, tickets) = setup(Arc::clone(&subject)).await;

    monitor.check_cycle().await;
    let ticket_id = tickets.list(Some(TicketStatus::Open)).await.unwrap()[0].id;
    tickets.hold(ticket_id).await.unwrap();

    // Violation clears but the hold pins the ticket open.
    subject.swap(observation(healthy_nodes(), json!([]), json!({})));
    monitor.check_cycle().await;
    assert_eq!(tickets.get(ticket_id).await.unwrap().status, TicketStatus::Open);

    // Unhold: the next clear tick resolves it.
    tickets.unhold(ticket_id).await.unwrap();
    monitor.check_cycle().await;
    assert_eq!(tickets.get(ticket_id).await.unwrap().status, TicketStatus::Resolved);
}
