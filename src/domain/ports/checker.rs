//! Invariant checker port.

use crate::domain::models::ticket::{Observation, Violation};

/// Evaluates invariants against an observation.
///
/// Pure in its observation argument but stateful over ticks: checkers
/// track `(invariant, entity) -> first_seen` internally to implement
/// grace periods. For a condition with grace `g`:
/// - violating and untracked: record `first_seen = now`, suppress
/// - violating and tracked: emit only once `now - first_seen >= g`
/// - not violating: clear tracking
pub trait InvariantChecker: Send {
    /// Check all invariants, returning one violation per distinct
    /// `(invariant, entity)` currently past its grace period.
    fn check(&mut self, observation: &Observation) -> Vec<Violation>;

    /// Number of configured invariants, for the heartbeat line.
    fn invariant_count(&self) -> usize;
}
