//! Grace-period tracking shared by invariant checkers.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::domain::models::ticket::{Severity, Violation};

/// Configuration for one invariant check.
#[derive(Debug, Clone)]
pub struct InvariantConfig {
    pub name: &'static str,
    /// How long a condition must hold before a violation is reported.
    pub grace_period: Duration,
    /// Numeric threshold; interpretation varies by invariant.
    pub threshold: f64,
    pub severity: Severity,
}

impl InvariantConfig {
    pub const fn new(name: &'static str, severity: Severity) -> Self {
        Self {
            name,
            grace_period: Duration::zero(),
            threshold: 0.0,
            severity,
        }
    }

    pub const fn with_grace(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

/// Tracks `(invariant, entity) -> first_seen` so violations are only
/// reported once they persist past their grace period.
#[derive(Default)]
pub struct GraceTracker {
    first_seen: HashMap<String, DateTime<Utc>>,
}

impl GraceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(invariant: &str, entity: Option<&str>) -> String {
        match entity {
            Some(entity) => format!("{invariant}:{entity}"),
            None => invariant.to_string(),
        }
    }

    /// Evaluate one condition under its grace period.
    ///
    /// Returns a violation only when the condition is currently violated
    /// and has been continuously violated for at least the grace period.
    /// A cleared condition drops its tracking entry.
    pub fn check(
        &mut self,
        config: &InvariantConfig,
        is_violated: bool,
        message: String,
        entity: Option<&str>,
    ) -> Option<Violation> {
        let key = Self::key(config.name, entity);
        let now = Utc::now();

        if !is_violated {
            self.first_seen.remove(&key);
            return None;
        }

        let first_seen = *self.first_seen.entry(key).or_insert(now);
        if now - first_seen < config.grace_period {
            return None;
        }

        Some(Violation {
            invariant_name: config.name.to_string(),
            message,
            first_seen,
            last_seen: now,
            entity_id: entity.map(String::from),
            severity: config.severity,
        })
    }

    /// Drop tracking entries for an invariant except the listed entities.
    /// Used when the set of entities in an observation shrinks.
    pub fn retain_entities(&mut self, invariant: &str, current: &[&str]) {
        let prefix = format!("{invariant}:");
        self.first_seen.retain(|key, _| {
            key.strip_prefix(&prefix)
                .is_none_or(|entity| current.contains(&entity))
        });
    }

    /// Clear all tracking state.
    pub fn clear(&mut self) {
        self.first_seen.clear();
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, invariant: &str, entity: Option<&str>, by: Duration) {
        let key = Self::key(invariant, entity);
        if let Some(ts) = self.first_seen.get_mut(&key) {
            *ts -= by;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LATENCY: InvariantConfig = InvariantConfig::new("high_latency", Severity::Warning)
        .with_grace(Duration::seconds(60))
        .with_threshold(100.0);

    const NODE_DOWN: InvariantConfig = InvariantConfig::new("node_down", Severity::Critical);

    #[test]
    fn zero_grace_reports_immediately() {
        let mut tracker = GraceTracker::new();
        let violation = tracker.check(&NODE_DOWN, true, "n1 is Down".to_string(), Some("n1"));
        assert!(violation.is_some());
    }

    #[test]
    fn grace_period_suppresses_until_elapsed() {
        let mut tracker = GraceTracker::new();

        // First sighting: tracked but suppressed.
        assert!(tracker
            .check(&LATENCY, true, "p99 150ms".to_string(), Some("n1"))
            .is_none());
        // Still within grace.
        assert!(tracker
            .check(&LATENCY, true, "p99 150ms".to_string(), Some("n1"))
            .is_none());

        // Simulate the condition having held for the full grace period.
        tracker.backdate("high_latency", Some("n1"), Duration::seconds(61));
        let violation = tracker
            .check(&LATENCY, true, "p99 150ms".to_string(), Some("n1"))
            .expect("violation after grace");
        assert_eq!(violation.invariant_name, "high_latency");
        assert!(violation.first_seen < violation.last_seen);
    }

    #[test]
    fn clearing_resets_the_clock() {
        let mut tracker = GraceTracker::new();
        assert!(tracker
            .check(&LATENCY, true, "p99 150ms".to_string(), Some("n1"))
            .is_none());
        tracker.backdate("high_latency", Some("n1"), Duration::seconds(61));

        // Condition clears: tracking drops.
        assert!(tracker
            .check(&LATENCY, false, String::new(), Some("n1"))
            .is_none());

        // Re-violation starts a fresh grace window.
        assert!(tracker
            .check(&LATENCY, true, "p99 150ms".to_string(), Some("n1"))
            .is_none());
    }

    #[test]
    fn entities_are_tracked_independently() {
        let mut tracker = GraceTracker::new();
        assert!(tracker
            .check(&LATENCY, true, "p99 150ms".to_string(), Some("n1"))
            .is_none());
        tracker.backdate("high_latency", Some("n1"), Duration::seconds(61));

        assert!(tracker
            .check(&LATENCY, true, "p99 150ms".to_string(), Some("n1"))
            .is_some());
        // n2 just started violating; still in grace.
        assert!(tracker
            .check(&LATENCY, true, "p99 140ms".to_string(), Some("n2"))
            .is_none());
    }

    #[test]
    fn retain_entities_drops_vanished_ones() {
        let mut tracker = GraceTracker::new();
        tracker.check(&NODE_DOWN, true, "n1 down".to_string(), Some("n1"));
        tracker.check(&NODE_DOWN, true, "n2 down".to_string(), Some("n2"));

        tracker.retain_entities("node_down", &["n2"]);

        // n1's history is gone, so it re-enters as a fresh sighting.
        tracker.backdate("node_down", Some("n2"), Duration::seconds(30));
        let v2 = tracker
            .check(&NODE_DOWN, true, "n2 down".to_string(), Some("n2"))
            .expect("n2 still tracked");
        assert!(v2.first_seen < v2.last_seen);
    }
}
