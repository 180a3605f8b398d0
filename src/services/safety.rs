//! Safety controls for action execution.
//!
//! The safety controller is the gatekeeper: every proposal and execution
//! path checks it first. It owns the observe/execute mode and the
//! emergency kill switch.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, RwLock};
use tokio::process::Command;
use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::infrastructure::database::ActionRepository;
use crate::services::audit::ActionAuditor;

/// Label applied to containers the operator manages; the kill switch
/// only force-terminates containers carrying it.
pub const MANAGED_LABEL: &str = "warden.managed=true";

/// Safety modes for action execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyMode {
    /// Observe-only: no action execution (default).
    Observe,
    /// Actions can be executed (opt-in).
    Execute,
}

impl SafetyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observe => "observe",
            Self::Execute => "execute",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "observe" => Some(Self::Observe),
            "execute" => Some(Self::Execute),
            _ => None,
        }
    }
}

/// Counts returned by a kill switch activation.
#[derive(Debug, Clone, Serialize)]
pub struct KillSwitchReport {
    pub pending_proposals: u64,
    pub docker_containers: u64,
    pub tasks_cancelled: u64,
}

/// Safety controller: mode state plus the kill switch.
///
/// Defaults to observe mode. Switching to observe cancels all pending
/// proposals (same sweep as the kill switch, quiet form). The dispatcher
/// registers in-flight task handles here so the kill switch can abort
/// them.
pub struct SafetyController {
    mode: RwLock<SafetyMode>,
    actions: ActionRepository,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl SafetyController {
    pub fn new(actions: ActionRepository) -> Self {
        Self {
            mode: RwLock::new(SafetyMode::Observe),
            actions,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_mode(actions: ActionRepository, mode: SafetyMode) -> Self {
        Self {
            mode: RwLock::new(mode),
            actions,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn mode(&self) -> SafetyMode {
        *self.mode.read().expect("safety mode lock poisoned")
    }

    pub fn is_observe_only(&self) -> bool {
        self.mode() == SafetyMode::Observe
    }

    /// Fails with the observe-only error when execution is blocked.
    pub fn check_can_execute(&self) -> DomainResult<()> {
        if self.is_observe_only() {
            return Err(DomainError::ObserveOnly);
        }
        Ok(())
    }

    /// Register an in-flight task so the kill switch can abort it.
    pub fn track_task(&self, handle: AbortHandle) {
        let mut tasks = self.tasks.lock().expect("task lock poisoned");
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Set the safety mode, logging the change.
    ///
    /// Switching to observe cancels all pending proposals.
    pub async fn set_mode(&self, mode: SafetyMode, auditor: &ActionAuditor) -> DomainResult<()> {
        let old_mode = {
            let mut guard = self.mode.write().expect("safety mode lock poisoned");
            let old = *guard;
            if old == mode {
                return Ok(());
            }
            *guard = mode;
            old
        };

        auditor.log_mode_change(old_mode.as_str(), mode.as_str()).await?;
        info!(from = old_mode.as_str(), to = mode.as_str(), "safety mode changed");

        if mode == SafetyMode::Observe {
            let cancelled = self.actions.cancel_all_pending().await?;
            if cancelled > 0 {
                info!(cancelled, "cancelled pending proposals on switch to observe");
            }
        }
        Ok(())
    }

    /// Emergency stop.
    ///
    /// 1. Cancels all pending (proposed/validated) proposals.
    /// 2. Force-terminates managed docker containers.
    /// 3. Aborts registered in-flight tasks.
    /// 4. Switches mode to observe.
    /// 5. Logs a kill_switch audit event with counts.
    pub async fn kill_switch(&self, auditor: &ActionAuditor) -> DomainResult<KillSwitchReport> {
        let pending_proposals = self.actions.cancel_all_pending().await?;
        let docker_containers = self.force_kill_managed_containers().await;
        let tasks_cancelled = self.abort_tracked_tasks();

        *self.mode.write().expect("safety mode lock poisoned") = SafetyMode::Observe;

        auditor
            .log_kill_switch(pending_proposals, docker_containers, tasks_cancelled)
            .await?;

        warn!(
            pending_proposals,
            docker_containers, tasks_cancelled, "kill switch activated"
        );

        Ok(KillSwitchReport {
            pending_proposals,
            docker_containers,
            tasks_cancelled,
        })
    }

    fn abort_tracked_tasks(&self) -> u64 {
        let mut tasks = self.tasks.lock().expect("task lock poisoned");
        let mut aborted = 0u64;
        for handle in tasks.drain(..) {
            if !handle.is_finished() {
                handle.abort();
                aborted += 1;
            }
        }
        aborted
    }

    /// Force-terminate managed containers via the docker CLI.
    ///
    /// Task abort cannot interrupt a blocked container operation, so the
    /// kill goes straight to the daemon. Docker being absent is not an
    /// error here.
    async fn force_kill_managed_containers(&self) -> u64 {
        let filter = format!("label={MANAGED_LABEL}");
        let list = Command::new("docker")
            .args(["ps", "-q", "--filter", filter.as_str()])
            .output()
            .await;

        let ids: Vec<String> = match list {
            Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .lines()
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            _ => return 0,
        };

        if ids.is_empty() {
            return 0;
        }

        let kill = Command::new("docker")
            .arg("kill")
            .args(&ids)
            .output()
            .await;

        match kill {
            Ok(output) if output.status.success() => ids.len() as u64,
            _ => 0,
        }
    }
}
