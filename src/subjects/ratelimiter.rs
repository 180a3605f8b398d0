//! Rate limiter subject adapter.
//!
//! Observes a distributed rate limiter through its management API and
//! Prometheus, exposes its native remediation actions, and implements
//! the chaos contract for the eval harness.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::registry::{ActionDefinition, ParamDef, ParamType, RiskTier};
use crate::domain::models::action::ActionType;
use crate::domain::models::ticket::{Observation, Severity, Violation};
use crate::domain::ports::checker::InvariantChecker;
use crate::domain::ports::subject::{ChaosSubject, Subject};
use crate::services::grace::{GraceTracker, InvariantConfig};

#[derive(Debug, Deserialize)]
struct NodeInfo {
    id: String,
    address: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct NodesResponse {
    nodes: Vec<NodeInfo>,
}

#[derive(Debug, Deserialize)]
struct CounterInfo {
    key: String,
    count: i64,
    limit: i64,
    remaining: i64,
}

#[derive(Debug, Deserialize)]
struct CountersResponse {
    counters: Vec<CounterInfo>,
}

/// Subject adapter for a distributed rate limiter.
///
/// Observation shape:
/// ```json
/// {
///   "nodes": [{"id", "address", "state"}],
///   "counters": [{"key", "count", "limit", "remaining"}],
///   "node_metrics": {"<node>": {"latency_p99_ms": f64}},
///   "redis_connected": bool
/// }
/// ```
pub struct RateLimiterSubject {
    http: reqwest::Client,
    endpoint: String,
    prometheus_url: Option<String>,
    /// Containers the reset/chaos paths manage, by docker name.
    containers: Vec<String>,
    redis_container: String,
}

impl RateLimiterSubject {
    /// Build from `RATELIMITER_ENDPOINT`, `PROMETHEUS_URL`, and
    /// `RATELIMITER_CONTAINERS` (comma-separated docker names).
    pub fn from_env() -> DomainResult<Self> {
        let endpoint = std::env::var("RATELIMITER_ENDPOINT").map_err(|_| {
            DomainError::Configuration("RATELIMITER_ENDPOINT is not set".to_string())
        })?;
        let containers = std::env::var("RATELIMITER_CONTAINERS")
            .unwrap_or_else(|_| "warden-ratelimiter-1".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(Self::new(
            endpoint,
            std::env::var("PROMETHEUS_URL").ok(),
            containers,
            std::env::var("RATELIMITER_REDIS_CONTAINER")
                .unwrap_or_else(|_| "warden-redis".to_string()),
        ))
    }

    pub fn new(
        endpoint: String,
        prometheus_url: Option<String>,
        containers: Vec<String>,
        redis_container: String,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint,
            prometheus_url,
            containers,
            redis_container,
        }
    }

    async fn get_nodes(&self) -> DomainResult<Vec<NodeInfo>> {
        let response = self
            .http
            .get(format!("{}/api/nodes", self.endpoint))
            .send()
            .await
            .map_err(|e| DomainError::SubjectUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DomainError::SubjectUnavailable(format!(
                "GET /api/nodes returned {}",
                response.status()
            )));
        }
        let parsed: NodesResponse = response
            .json()
            .await
            .map_err(|e| DomainError::SubjectUnavailable(format!("bad nodes payload: {e}")))?;
        Ok(parsed.nodes)
    }

    /// Counters live in Redis; a failed fetch reads as Redis being
    /// unreachable rather than a failed observation.
    async fn get_counters(&self) -> (Vec<CounterInfo>, bool) {
        let result = async {
            let response = self
                .http
                .get(format!("{}/api/counters", self.endpoint))
                .send()
                .await
                .ok()?;
            if !response.status().is_success() {
                return None;
            }
            response.json::<CountersResponse>().await.ok()
        }
        .await;

        match result {
            Some(parsed) => (parsed.counters, true),
            None => (Vec::new(), false),
        }
    }

    /// P99 check latency per node from Prometheus. Failures are skipped
    /// so a metrics outage never blocks the observation.
    async fn node_latency_p99(&self, node_id: &str) -> Option<f64> {
        let base = self.prometheus_url.as_ref()?;
        let query = format!(
            "histogram_quantile(0.99, sum(rate(ratelimit_check_duration_ms_bucket{{node=\"{node_id}\"}}[1m])) by (le))"
        );
        let response = self
            .http
            .get(format!("{base}/api/v1/query"))
            .query(&[("query", query.as_str())])
            .send()
            .await
            .ok()?;
        let body: Value = response.json().await.ok()?;
        body["data"]["result"]
            .as_array()?
            .first()?
            .get("value")?
            .as_array()?
            .get(1)?
            .as_str()?
            .parse()
            .ok()
    }

    async fn post(&self, path: &str, body: Value) -> DomainResult<Value> {
        let response = self
            .http
            .post(format!("{}{path}", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::ExecutionFailed(e.to_string()))?;
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(DomainError::ExecutionFailed(format!(
                "POST {path} returned {status}: {payload}"
            )));
        }
        Ok(payload)
    }

    async fn docker(&self, args: &[&str]) -> DomainResult<()> {
        let output = Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| DomainError::ChaosFailed(format!("docker unavailable: {e}")))?;
        if !output.status.success() {
            return Err(DomainError::ChaosFailed(format!(
                "docker {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

}

/// Health predicate over a captured observation: every node Up, Redis
/// reachable, and no counter over its limit.
pub fn state_healthy(observation: &Value) -> bool {
    let nodes_up = observation["nodes"]
        .as_array()
        .is_some_and(|nodes| !nodes.is_empty() && nodes.iter().all(|n| n["state"] == "Up"));
    let redis = observation["redis_connected"].as_bool().unwrap_or(false);
    let counters_ok = observation["counters"]
        .as_array()
        .is_none_or(|counters| counters.iter().all(|c| {
            c["count"].as_i64().unwrap_or(0) <= c["limit"].as_i64().unwrap_or(i64::MAX)
        }));
    nodes_up && redis && counters_ok
}

#[async_trait]
impl Subject for RateLimiterSubject {
    async fn observe(&self) -> DomainResult<Observation> {
        let nodes = self.get_nodes().await?;
        let (counters, redis_connected) = self.get_counters().await;

        let mut node_metrics = Map::new();
        for node in nodes.iter().filter(|n| n.state == "Up") {
            if let Some(latency) = self.node_latency_p99(&node.id).await {
                node_metrics.insert(node.id.clone(), json!({ "latency_p99_ms": latency }));
            }
        }

        let mut observation = Observation::new();
        observation.insert(
            "nodes".to_string(),
            json!(nodes
                .iter()
                .map(|n| json!({"id": n.id, "address": n.address, "state": n.state}))
                .collect::<Vec<_>>()),
        );
        observation.insert(
            "counters".to_string(),
            json!(counters
                .iter()
                .map(|c| json!({
                    "key": c.key,
                    "count": c.count,
                    "limit": c.limit,
                    "remaining": c.remaining
                }))
                .collect::<Vec<_>>()),
        );
        observation.insert("node_metrics".to_string(), Value::Object(node_metrics));
        observation.insert("redis_connected".to_string(), json!(redis_connected));
        Ok(observation)
    }

    fn action_definitions(&self) -> Vec<ActionDefinition> {
        vec![
            ActionDefinition::new(
                "reset_counter",
                "Reset a rate-limit counter to zero",
                ActionType::Subject,
            )
            .with_param("key", ParamDef::required(ParamType::Str, "Counter key to reset"))
            .with_risk(RiskTier::High),
            ActionDefinition::new(
                "set_limit",
                "Set the rate limit for a key",
                ActionType::Subject,
            )
            .with_param("key", ParamDef::required(ParamType::Str, "Rate limit key"))
            .with_param("limit", ParamDef::required(ParamType::Int, "Requests per window"))
            .with_param(
                "window_ms",
                ParamDef::optional(ParamType::Int, "Window length", json!(60_000)),
            )
            .with_risk(RiskTier::Medium),
            ActionDefinition::new(
                "reload_node",
                "Ask a rate limiter node to re-register and reload config",
                ActionType::Subject,
            )
            .with_param("node_id", ParamDef::required(ParamType::Str, "Node to reload"))
            .with_risk(RiskTier::Medium),
        ]
    }

    async fn invoke(
        &self,
        action_name: &str,
        parameters: &Map<String, Value>,
    ) -> DomainResult<Option<Value>> {
        match action_name {
            "reset_counter" => {
                let key = parameters
                    .get("key")
                    .and_then(Value::as_str)
                    .ok_or_else(|| DomainError::Validation {
                        field: "key".to_string(),
                        reason: "expected a string".to_string(),
                    })?;
                let result = self
                    .post(&format!("/api/counters/{key}/reset"), json!({}))
                    .await?;
                Ok(Some(result))
            }
            "set_limit" => {
                let result = self
                    .post("/api/limits", Value::Object(parameters.clone()))
                    .await?;
                Ok(Some(result))
            }
            "reload_node" => {
                let node_id = parameters
                    .get("node_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| DomainError::Validation {
                        field: "node_id".to_string(),
                        reason: "expected a string".to_string(),
                    })?;
                let result = self
                    .post(&format!("/api/nodes/{node_id}/reload"), json!({}))
                    .await?;
                Ok(Some(result))
            }
            other => Err(DomainError::UnknownAction(other.to_string())),
        }
    }
}

#[async_trait]
impl ChaosSubject for RateLimiterSubject {
    /// Restore clean state: start every managed container and clear all
    /// counters through the management API.
    async fn reset(&self) -> DomainResult<()> {
        let mut names: Vec<&str> = self.containers.iter().map(String::as_str).collect();
        names.push(self.redis_container.as_str());
        for name in names {
            if let Err(err) = self.docker(&["start", name]).await {
                debug!(container = name, error = %err, "container start skipped");
            }
        }
        // Counter reset is best-effort: the API may still be coming up.
        if let Err(err) = self.post("/api/counters/reset-all", json!({})).await {
            debug!(error = %err, "counter reset skipped during reset");
        }
        Ok(())
    }

    async fn wait_healthy(&self, timeout: Duration) -> DomainResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(observation) = self.observe().await {
                if state_healthy(&Value::Object(observation)) {
                    return Ok(true);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    async fn capture_state(&self) -> DomainResult<Value> {
        Ok(Value::Object(self.observe().await.unwrap_or_default()))
    }

    async fn inject_chaos(
        &self,
        chaos_type: &str,
        params: &Map<String, Value>,
    ) -> DomainResult<Value> {
        match chaos_type {
            "node_kill" => {
                let container = params
                    .get("container")
                    .and_then(Value::as_str)
                    .or_else(|| self.containers.first().map(String::as_str))
                    .ok_or_else(|| {
                        DomainError::ChaosFailed("no rate limiter container configured".to_string())
                    })?
                    .to_string();
                self.docker(&["kill", container.as_str()]).await?;
                Ok(json!({ "chaos_type": "node_kill", "container": container }))
            }
            "redis_down" => {
                self.docker(&["stop", self.redis_container.as_str()]).await?;
                Ok(json!({ "chaos_type": "redis_down", "container": self.redis_container }))
            }
            "burst_traffic" => {
                // Over-drive one key to trip the over_limit invariant.
                let key = params
                    .get("key")
                    .and_then(Value::as_str)
                    .unwrap_or("chaos-key")
                    .to_string();
                let limit = params.get("limit").and_then(Value::as_i64).unwrap_or(10);
                let multiplier = params.get("multiplier").and_then(Value::as_i64).unwrap_or(2);

                let mut allowed = 0i64;
                let mut denied = 0i64;
                for _ in 0..(limit * multiplier) {
                    match self
                        .http
                        .post(format!("{}/check", self.endpoint))
                        .json(&json!({ "key": key }))
                        .send()
                        .await
                    {
                        Ok(response) if response.status().as_u16() == 200 => allowed += 1,
                        Ok(response) if response.status().as_u16() == 429 => denied += 1,
                        _ => {}
                    }
                }
                Ok(json!({
                    "chaos_type": "burst_traffic",
                    "key": key,
                    "allowed": allowed,
                    "denied": denied,
                }))
            }
            other => Err(DomainError::ChaosFailed(format!(
                "unknown chaos type '{other}' (available: node_kill, redis_down, burst_traffic)"
            ))),
        }
    }

    async fn cleanup_chaos(&self, metadata: &Value) -> DomainResult<()> {
        match metadata["chaos_type"].as_str() {
            Some("node_kill" | "redis_down") => {
                if let Some(container) = metadata["container"].as_str() {
                    self.docker(&["start", container]).await?;
                }
                Ok(())
            }
            Some("burst_traffic") => {
                if let Some(key) = metadata["key"].as_str() {
                    if let Err(err) = self
                        .post(&format!("/api/counters/{key}/reset"), json!({}))
                        .await
                    {
                        warn!(error = %err, "burst cleanup reset failed");
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn chaos_types(&self) -> Vec<String> {
        vec![
            "node_kill".to_string(),
            "redis_down".to_string(),
            "burst_traffic".to_string(),
        ]
    }

    fn is_state_healthy(&self, state: &Value) -> bool {
        state_healthy(state)
    }
}

// ---------------------------------------------------------------------------
// Invariant checker
// ---------------------------------------------------------------------------

const NODE_DOWN: InvariantConfig = InvariantConfig::new("node_down", Severity::Critical);
const REDIS_DISCONNECTED: InvariantConfig =
    InvariantConfig::new("redis_disconnected", Severity::Critical);
const HIGH_LATENCY: InvariantConfig = InvariantConfig::new("high_latency", Severity::Warning)
    .with_grace(ChronoDuration::seconds(60))
    .with_threshold(100.0);
const COUNTER_DRIFT: InvariantConfig = InvariantConfig::new("counter_drift", Severity::Warning)
    .with_grace(ChronoDuration::seconds(30))
    .with_threshold(5.0);
const OVER_LIMIT: InvariantConfig = InvariantConfig::new("over_limit", Severity::Warning);
const GHOST_ALLOWING: InvariantConfig = InvariantConfig::new("ghost_allowing", Severity::Warning);

/// Rate limiter invariants:
/// 1. node_down: a node is not in "Up" state
/// 2. redis_disconnected: Redis connectivity lost
/// 3. high_latency: P99 check latency above threshold (60s grace)
/// 4. over_limit: a counter exceeds its limit
/// 5. ghost_allowing: a key allows requests with limit=0
/// 6. counter_drift: API counter disagrees with raw Redis count (30s grace)
pub struct RateLimiterChecker {
    tracker: GraceTracker,
}

impl RateLimiterChecker {
    pub fn new() -> Self {
        Self {
            tracker: GraceTracker::new(),
        }
    }
}

impl Default for RateLimiterChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantChecker for RateLimiterChecker {
    fn check(&mut self, observation: &Observation) -> Vec<Violation> {
        let mut violations = Vec::new();

        // Redis connectivity (cluster-wide).
        let redis_connected = observation
            .get("redis_connected")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if let Some(v) = self.tracker.check(
            &REDIS_DISCONNECTED,
            !redis_connected,
            "Redis connection lost - rate limiting may not work correctly".to_string(),
            None,
        ) {
            violations.push(v);
        }

        // Node states.
        let empty = Vec::new();
        let nodes = observation
            .get("nodes")
            .and_then(Value::as_array)
            .unwrap_or(&empty);
        let mut node_ids = Vec::new();
        for node in nodes {
            let (Some(id), Some(address), Some(state)) = (
                node["id"].as_str(),
                node["address"].as_str(),
                node["state"].as_str(),
            ) else {
                continue;
            };
            node_ids.push(id);
            if let Some(v) = self.tracker.check(
                &NODE_DOWN,
                state != "Up",
                format!("Node {id} at {address} is {state}"),
                Some(id),
            ) {
                violations.push(v);
            }
        }
        self.tracker.retain_entities("node_down", &node_ids);

        // Per-node latency.
        if let Some(metrics) = observation.get("node_metrics").and_then(Value::as_object) {
            for (node_id, node_metrics) in metrics {
                let latency = node_metrics["latency_p99_ms"].as_f64().unwrap_or(0.0);
                if let Some(v) = self.tracker.check(
                    &HIGH_LATENCY,
                    latency > HIGH_LATENCY.threshold,
                    format!(
                        "Node {node_id} P99 latency {latency:.1}ms exceeds threshold {:.1}ms",
                        HIGH_LATENCY.threshold
                    ),
                    Some(node_id),
                ) {
                    violations.push(v);
                }
            }
        }

        // Counter invariants.
        let counters = observation
            .get("counters")
            .and_then(Value::as_array)
            .unwrap_or(&empty);
        let mut counter_keys = Vec::new();
        for counter in counters {
            let Some(key) = counter["key"].as_str() else {
                continue;
            };
            counter_keys.push(key);
            let count = counter["count"].as_i64().unwrap_or(0);
            let limit = counter["limit"].as_i64().unwrap_or(0);
            let remaining = counter["remaining"].as_i64().unwrap_or(0);

            if let Some(v) = self.tracker.check(
                &OVER_LIMIT,
                count > limit,
                format!(
                    "Counter {key} over limit: count={count}, limit={limit} (excess={})",
                    count - limit
                ),
                Some(key),
            ) {
                violations.push(v);
            }

            if let Some(v) = self.tracker.check(
                &GHOST_ALLOWING,
                limit == 0 && remaining > 0,
                format!("Counter {key} has limit=0 but remaining={remaining} (ghost allowing)"),
                Some(key),
            ) {
                violations.push(v);
            }

            // Drift against raw Redis counts when the observation carries them.
            if let Some(redis_count) = observation
                .get("redis_counts")
                .and_then(|counts| counts[key].as_i64())
            {
                let drift = (count - redis_count).abs();
                if let Some(v) = self.tracker.check(
                    &COUNTER_DRIFT,
                    drift as f64 > COUNTER_DRIFT.threshold,
                    format!(
                        "Counter {key} drift: API={count}, Redis={redis_count}, drift={drift}"
                    ),
                    Some(key),
                ) {
                    violations.push(v);
                }
            }
        }
        self.tracker.retain_entities("over_limit", &counter_keys);
        self.tracker.retain_entities("ghost_allowing", &counter_keys);

        violations
    }

    fn invariant_count(&self) -> usize {
        6
    }
}
