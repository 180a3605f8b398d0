//! Dual authorization ports.
//!
//! Actions are verified against both the requester's permission and, when
//! delegated, the executing agent's capability. This follows the OAuth
//! delegation pattern: `requester_id` is the resource owner, `agent_id`
//! the client acting on their behalf.

/// Checks whether a requester may ask for an action.
pub trait PermissionChecker: Send + Sync {
    fn has_permission(&self, requester_id: &str, action_name: &str) -> bool;
}

/// Checks whether an agent may execute an action.
pub trait CapabilityChecker: Send + Sync {
    fn has_capability(&self, agent_id: &str, action_name: &str) -> bool;
}

/// Default permission checker that allows all requests.
///
/// Permissive to avoid blocking during development; replace with a real
/// policy engine in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllPermissions;

impl PermissionChecker for AllowAllPermissions {
    fn has_permission(&self, _requester_id: &str, _action_name: &str) -> bool {
        true
    }
}

/// Default capability checker that allows all agents.
///
/// Permissive to avoid blocking during development; replace with an agent
/// capability registry in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllCapabilities;

impl CapabilityChecker for AllowAllCapabilities {
    fn has_capability(&self, _agent_id: &str, _action_name: &str) -> bool {
        true
    }
}
