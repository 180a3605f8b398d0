//! Ticket domain model.
//!
//! A ticket is the persistent incarnation of an invariant violation,
//! deduplicated by violation key and auto-resolved when the violation
//! clears.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keyed snapshot of subject state at one point in time.
///
/// Opaque to the operator core; its schema is known only to the paired
/// invariant checker. Lives for one monitor tick and is never persisted.
pub type Observation = serde_json::Map<String, serde_json::Value>;

/// Severity of a violation or ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Warning
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// An observed failure of an invariant, scoped to an entity or cluster-wide.
///
/// Regenerated on each monitor tick; only its derivation into a ticket
/// is persistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Name of the violated invariant (e.g., "node_down").
    pub invariant_name: String,
    /// Human-readable description with the offending values.
    pub message: String,
    /// When this violation was first observed (grace-period aware).
    pub first_seen: DateTime<Utc>,
    /// When this violation was last observed.
    pub last_seen: DateTime<Utc>,
    /// Optional scope (node id, counter key). None means cluster-wide.
    pub entity_id: Option<String>,
    pub severity: Severity,
}

impl Violation {
    /// Deterministic fingerprint used for ticket deduplication.
    ///
    /// Two violations with the same key in successive ticks are the same
    /// incident.
    pub fn violation_key(&self) -> String {
        match &self.entity_id {
            Some(entity) => format!("{}:{}", self.invariant_name, entity),
            None => self.invariant_name.clone(),
        }
    }
}

/// Status of a ticket in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Active violation, not yet diagnosed.
    Open,
    /// A human has seen it; still undiagnosed.
    Acknowledged,
    /// The agent stored a diagnosis.
    Diagnosed,
    /// Violation cleared or explicitly resolved.
    Resolved,
}

impl Default for TicketStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Diagnosed => "diagnosed",
            Self::Resolved => "resolved",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "acknowledged" => Some(Self::Acknowledged),
            "diagnosed" => Some(Self::Diagnosed),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved)
    }
}

/// Persistent incident record tracking one violation over its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    /// Unique per open ticket; matches `Violation::violation_key`.
    pub violation_key: String,
    pub invariant_name: String,
    pub entity_id: Option<String>,
    pub message: String,
    pub severity: Severity,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub status: TicketStatus,
    /// Held tickets are never auto-resolved.
    pub held: bool,
    /// Incremented on each re-detection of the same violation key.
    pub occurrence_count: i64,
    /// Groups tickets created in the same monitor tick.
    pub batch_key: Option<String>,
    /// Metrics captured at first detection.
    pub metric_snapshot: Option<serde_json::Value>,
    /// Markdown diagnosis from the agent; None until diagnosed.
    pub diagnosis: Option<String>,
    /// Subject-specific context carried into the diagnosis prompt.
    pub subject_context: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(invariant: &str, entity: Option<&str>) -> Violation {
        Violation {
            invariant_name: invariant.to_string(),
            message: "test".to_string(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            entity_id: entity.map(String::from),
            severity: Severity::Warning,
        }
    }

    #[test]
    fn violation_key_scopes_by_entity() {
        assert_eq!(violation("node_down", Some("n1")).violation_key(), "node_down:n1");
        assert_eq!(violation("node_down", Some("n2")).violation_key(), "node_down:n2");
        assert_eq!(violation("redis_disconnected", None).violation_key(), "redis_disconnected");
    }

    #[test]
    fn violation_key_is_deterministic() {
        let a = violation("over_limit", Some("k1"));
        let b = violation("over_limit", Some("k1"));
        assert_eq!(a.violation_key(), b.violation_key());
    }

    #[test]
    fn status_round_trips() {
        for status in [
            TicketStatus::Open,
            TicketStatus::Acknowledged,
            TicketStatus::Diagnosed,
            TicketStatus::Resolved,
        ] {
            assert_eq!(TicketStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TicketStatus::from_str("bogus"), None);
    }
}
