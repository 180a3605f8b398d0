//! Dual authorization checking at execution time.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::action::ActionProposal;
use crate::domain::ports::authorization::{CapabilityChecker, PermissionChecker};

/// Verify dual authorization for a proposal.
///
/// Checks that the requester has permission to ask for the action and,
/// when the action is delegated to an agent, that the agent has the
/// capability to execute it. Either failing blocks execution before any
/// side effect; the order of the checks does not matter for correctness.
pub fn check_dual_authorization(
    proposal: &ActionProposal,
    permissions: &dyn PermissionChecker,
    capabilities: &dyn CapabilityChecker,
) -> DomainResult<()> {
    if !permissions.has_permission(&proposal.requester_id, &proposal.action_name) {
        return Err(DomainError::Authorization(format!(
            "requester '{}' lacks permission for action '{}'",
            proposal.requester_id, proposal.action_name
        )));
    }

    if let Some(agent_id) = &proposal.agent_id {
        if !capabilities.has_capability(agent_id, &proposal.action_name) {
            return Err(DomainError::Authorization(format!(
                "agent '{}' lacks capability for action '{}'",
                agent_id, proposal.action_name
            )));
        }
    }

    Ok(())
}
