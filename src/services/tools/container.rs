//! Container lifecycle tools, backed by the docker CLI.
//!
//! Destructive operations (stop, restart, exec, network disconnect) are
//! restricted to containers carrying the operator's managed label.

use serde_json::{json, Value};
use tokio::process::Command;

use crate::domain::errors::{DomainError, DomainResult};
use crate::services::safety::MANAGED_LABEL;

pub struct ContainerRuntime;

impl ContainerRuntime {
    pub fn new() -> Self {
        Self
    }

    async fn docker(&self, args: &[&str]) -> DomainResult<std::process::Output> {
        Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| DomainError::ExecutionFailed(format!("docker unavailable: {e}")))
    }

    async fn docker_checked(&self, args: &[&str]) -> DomainResult<String> {
        let output = self.docker(args).await?;
        if !output.status.success() {
            return Err(DomainError::ExecutionFailed(format!(
                "docker {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Destructive operations only touch operator-managed containers.
    async fn assert_managed(&self, container: &str) -> DomainResult<()> {
        let (label_key, label_value) = MANAGED_LABEL
            .split_once('=')
            .unwrap_or((MANAGED_LABEL, "true"));
        let format = format!("{{{{ index .Config.Labels \"{label_key}\" }}}}");
        let value = self
            .docker_checked(&["inspect", "--format", format.as_str(), container])
            .await?;
        if value.trim() != label_value {
            return Err(DomainError::Authorization(format!(
                "container '{container}' is not operator-managed ({label_key} label missing)"
            )));
        }
        Ok(())
    }

    pub async fn start(&self, container: &str) -> DomainResult<Value> {
        self.docker_checked(&["start", container]).await?;
        Ok(json!({ "container": container, "state": "started" }))
    }

    pub async fn stop(&self, container: &str) -> DomainResult<Value> {
        self.assert_managed(container).await?;
        self.docker_checked(&["stop", container]).await?;
        Ok(json!({ "container": container, "state": "stopped" }))
    }

    pub async fn restart(&self, container: &str) -> DomainResult<Value> {
        self.assert_managed(container).await?;
        self.docker_checked(&["restart", container]).await?;
        Ok(json!({ "container": container, "state": "restarted" }))
    }

    pub async fn inspect(&self, container: &str) -> DomainResult<Value> {
        let raw = self.docker_checked(&["inspect", container]).await?;
        let parsed: Value = serde_json::from_str(&raw)?;
        // docker inspect returns an array; unwrap the single entry.
        Ok(parsed
            .as_array()
            .and_then(|items| items.first().cloned())
            .unwrap_or(parsed))
    }

    pub async fn logs(&self, container: &str, tail: i64) -> DomainResult<Value> {
        let tail_arg = tail.to_string();
        let output = self
            .docker(&["logs", "--tail", tail_arg.as_str(), container])
            .await?;
        // docker writes container logs to both streams.
        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(json!({ "container": container, "logs": text }))
    }

    pub async fn network_connect(&self, network: &str, container: &str) -> DomainResult<Value> {
        self.docker_checked(&["network", "connect", network, container])
            .await?;
        Ok(json!({ "network": network, "container": container, "connected": true }))
    }

    pub async fn network_disconnect(&self, network: &str, container: &str) -> DomainResult<Value> {
        self.assert_managed(container).await?;
        self.docker_checked(&["network", "disconnect", network, container])
            .await?;
        Ok(json!({ "network": network, "container": container, "connected": false }))
    }

    pub async fn exec(&self, container: &str, command: &str) -> DomainResult<Value> {
        self.assert_managed(container).await?;
        let output = self
            .docker(&["exec", container, "sh", "-c", command])
            .await?;
        Ok(json!({
            "container": container,
            "exit_code": output.status.code().unwrap_or(-1),
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
        }))
    }
}

impl Default for ContainerRuntime {
    fn default() -> Self {
        Self::new()
    }
}
