//! Shared test fixtures.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use warden::domain::errors::{DomainError, DomainResult};
use warden::domain::models::action::ActionType;
use warden::domain::models::registry::{ActionDefinition, ParamDef, ParamType, RiskTier};
use warden::domain::models::ticket::Observation;
use warden::domain::ports::subject::Subject;
use warden::infrastructure::database::DatabaseConnection;

/// In-memory database with migrations applied.
pub async fn test_pool() -> SqlitePool {
    let db = DatabaseConnection::new("sqlite::memory:")
        .await
        .expect("failed to create test database");
    db.migrate().await.expect("failed to run migrations");
    db.pool().clone()
}

/// Fake rate-limited subject with one counter that actions can reset.
///
/// `observe()` reports the counter; `reset_counter` zeroes it.
pub struct CounterSubject {
    pub counter: AtomicI64,
    pub limit: i64,
}

impl CounterSubject {
    pub fn new(count: i64, limit: i64) -> Arc<Self> {
        Arc::new(Self {
            counter: AtomicI64::new(count),
            limit,
        })
    }

    pub fn count(&self) -> i64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Subject for CounterSubject {
    async fn observe(&self) -> DomainResult<Observation> {
        let count = self.count();
        let mut observation = Observation::new();
        observation.insert(
            "counters".to_string(),
            json!([{
                "key": "k1",
                "count": count,
                "limit": self.limit,
                "remaining": (self.limit - count).max(0),
            }]),
        );
        observation.insert("redis_connected".to_string(), json!(true));
        Ok(observation)
    }

    fn action_definitions(&self) -> Vec<ActionDefinition> {
        vec![
            ActionDefinition::new(
                "reset_counter",
                "Reset a rate-limit counter to zero",
                ActionType::Subject,
            )
            .with_param("key", ParamDef::required(ParamType::Str, "Counter key"))
            .with_risk(RiskTier::High),
            ActionDefinition::new("always_fails", "An action that always fails", ActionType::Subject),
        ]
    }

    async fn invoke(
        &self,
        action_name: &str,
        _parameters: &Map<String, Value>,
    ) -> DomainResult<Option<Value>> {
        match action_name {
            "reset_counter" => {
                self.counter.store(0, Ordering::SeqCst);
                Ok(Some(json!({ "reset": true })))
            }
            "always_fails" => Err(DomainError::ExecutionFailed("simulated failure".to_string())),
            other => Err(DomainError::UnknownAction(other.to_string())),
        }
    }
}
