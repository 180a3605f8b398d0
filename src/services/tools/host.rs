//! Host-level tools: service control and process termination.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

use crate::domain::errors::{DomainError, DomainResult};

pub struct HostActions;

impl HostActions {
    pub fn new() -> Self {
        Self
    }

    /// systemctl start/stop/restart for a named service.
    pub async fn service_action(&self, verb: &str, service: &str) -> DomainResult<Value> {
        let output = Command::new("systemctl")
            .args([verb, service])
            .output()
            .await
            .map_err(|e| DomainError::ExecutionFailed(format!("systemctl unavailable: {e}")))?;

        if !output.status.success() {
            return Err(DomainError::ExecutionFailed(format!(
                "systemctl {verb} {service} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(json!({ "service": service, "action": verb, "ok": true }))
    }

    /// Kill a process: SIGTERM, bounded wait, then SIGKILL.
    ///
    /// Rejects PID <= 1 and kernel threads (empty /proc/<pid>/cmdline).
    pub async fn kill_process(&self, pid: i64, term_timeout: Duration) -> DomainResult<Value> {
        if pid <= 1 {
            return Err(DomainError::Validation {
                field: "pid".to_string(),
                reason: format!("refusing to signal pid {pid}"),
            });
        }
        let pid_i32 = i32::try_from(pid).map_err(|_| DomainError::Validation {
            field: "pid".to_string(),
            reason: "pid out of range".to_string(),
        })?;

        let cmdline = std::fs::read(format!("/proc/{pid}/cmdline")).unwrap_or_default();
        if cmdline.is_empty() {
            return Err(DomainError::Validation {
                field: "pid".to_string(),
                reason: format!("pid {pid} is a kernel thread or does not exist"),
            });
        }

        let target = Pid::from_raw(pid_i32);
        kill(target, Signal::SIGTERM)
            .map_err(|e| DomainError::ExecutionFailed(format!("SIGTERM failed: {e}")))?;

        // Poll for exit until the grace period runs out.
        let deadline = tokio::time::Instant::now() + term_timeout;
        loop {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if kill(target, None).is_err() {
                return Ok(json!({ "pid": pid, "signal": "SIGTERM", "escalated": false }));
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
        }

        warn!(pid, "process survived SIGTERM, escalating to SIGKILL");
        kill(target, Signal::SIGKILL)
            .map_err(|e| DomainError::ExecutionFailed(format!("SIGKILL failed: {e}")))?;
        Ok(json!({ "pid": pid, "signal": "SIGKILL", "escalated": true }))
    }
}

impl Default for HostActions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_init_pid() {
        let host = HostActions::new();
        let err = host.kill_process(1, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[tokio::test]
    async fn rejects_negative_pid() {
        let host = HostActions::new();
        let err = host.kill_process(-5, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[tokio::test]
    async fn rejects_nonexistent_pid() {
        let host = HostActions::new();
        // PIDs wrap well below this value on Linux.
        let err = host
            .kill_process(4_000_000, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
    }
}
