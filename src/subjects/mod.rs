//! Built-in subject adapters.
//!
//! The operator core is subject-agnostic; adapters implement the
//! `Subject`/`ChaosSubject`/`InvariantChecker` contracts for a concrete
//! system. One adapter ships in-tree: a distributed rate limiter,
//! which also serves as the default eval target.

pub mod ratelimiter;

use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::checker::InvariantChecker;
use crate::domain::ports::subject::{ChaosSubject, Subject};
use ratelimiter::{RateLimiterChecker, RateLimiterSubject};

/// Build a subject by name. Unknown names are a typed error listing
/// what is available.
pub fn build_subject(name: &str) -> DomainResult<Arc<dyn Subject>> {
    match name {
        "ratelimiter" => Ok(Arc::new(RateLimiterSubject::from_env()?)),
        other => Err(DomainError::Configuration(format!(
            "unknown subject '{other}' (available: ratelimiter)"
        ))),
    }
}

/// Build a chaos-capable subject by name, for the eval harness.
pub fn build_chaos_subject(name: &str) -> DomainResult<Arc<dyn ChaosSubject>> {
    match name {
        "ratelimiter" => Ok(Arc::new(RateLimiterSubject::from_env()?)),
        other => Err(DomainError::Configuration(format!(
            "unknown subject '{other}' (available: ratelimiter)"
        ))),
    }
}

/// Health predicate for scoring a subject's captured state.
pub fn health_predicate(name: &str) -> DomainResult<fn(&serde_json::Value) -> bool> {
    match name {
        "ratelimiter" => Ok(ratelimiter::state_healthy),
        other => Err(DomainError::Configuration(format!(
            "unknown subject '{other}' (available: ratelimiter)"
        ))),
    }
}

/// Build the invariant checker paired with a subject.
pub fn build_checker(name: &str) -> DomainResult<Box<dyn InvariantChecker>> {
    match name {
        "ratelimiter" => Ok(Box::new(RateLimiterChecker::new())),
        other => Err(DomainError::Configuration(format!(
            "unknown subject '{other}' (available: ratelimiter)"
        ))),
    }
}
