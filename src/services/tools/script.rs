//! Sandboxed script execution.
//!
//! Scripts are validated before running (size cap, deny-list of
//! dangerous patterns, secret scan, syntax check) and executed inside an
//! ephemeral container with no network, resource caps, a read-only
//! filesystem, and a non-root user. Hard timeout of five minutes.

use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::domain::errors::{DomainError, DomainResult};
use crate::infrastructure::logging::SecretRedactor;

/// Maximum script size in bytes.
const MAX_SCRIPT_BYTES: usize = 64 * 1024;

/// Hard ceiling on execution time.
const MAX_TIMEOUT_SECS: i64 = 300;

/// Patterns that are never allowed in a script, regardless of sandbox.
const DENY_PATTERNS: &[&str] = &[
    "rm -rf /",
    "mkfs",
    "dd if=",
    "dd of=/dev",
    ":(){",
    "shutdown",
    "reboot",
    "init 0",
    "halt",
    "/dev/sda",
    "chmod -R 777 /",
    "curl | sh",
    "| sh",
    "| bash",
    "nc -l",
];

/// Container images per script type.
fn image_for(script_type: &str) -> Option<(&'static str, &'static [&'static str])> {
    match script_type {
        "bash" => Some(("bash:5.2-alpine", &["bash", "-s"])),
        "python" => Some(("python:3.11-slim", &["python", "-"])),
        _ => None,
    }
}

pub struct ScriptExecutor {
    redactor: SecretRedactor,
}

impl ScriptExecutor {
    pub fn new() -> Self {
        Self {
            redactor: SecretRedactor::new(),
        }
    }

    /// Validate script content before execution.
    pub fn validate(&self, content: &str, script_type: &str) -> DomainResult<()> {
        if image_for(script_type).is_none() {
            return Err(DomainError::ScriptRejected(format!(
                "unsupported script type '{script_type}'; must be bash or python"
            )));
        }
        if content.is_empty() {
            return Err(DomainError::ScriptRejected("script is empty".to_string()));
        }
        if content.len() > MAX_SCRIPT_BYTES {
            return Err(DomainError::ScriptRejected(format!(
                "script exceeds {MAX_SCRIPT_BYTES} byte limit"
            )));
        }
        for pattern in DENY_PATTERNS {
            if content.contains(pattern) {
                return Err(DomainError::ScriptRejected(format!(
                    "script contains forbidden pattern '{pattern}'"
                )));
            }
        }
        // Secret scan: if redaction changes the content, it carries a secret.
        if self.redactor.redact_str(content) != content {
            return Err(DomainError::ScriptRejected(
                "script appears to contain a secret".to_string(),
            ));
        }
        Ok(())
    }

    /// Syntax-check bash content with `bash -n` before running it.
    async fn check_bash_syntax(&self, content: &str) -> DomainResult<()> {
        let mut child = Command::new("bash")
            .arg("-n")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DomainError::ExecutionFailed(format!("bash unavailable: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(content.as_bytes())
                .await
                .map_err(|e| DomainError::ExecutionFailed(e.to_string()))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DomainError::ExecutionFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(DomainError::ScriptRejected(format!(
                "bash syntax error: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Validate and run a script in the sandbox.
    pub async fn execute(
        &self,
        content: &str,
        script_type: &str,
        timeout_secs: i64,
    ) -> DomainResult<Value> {
        self.validate(content, script_type)?;
        if script_type == "bash" {
            self.check_bash_syntax(content).await?;
        }

        let (image, interpreter) = image_for(script_type)
            .ok_or_else(|| DomainError::ScriptRejected("unsupported script type".to_string()))?;
        let effective_timeout = timeout_secs.clamp(1, MAX_TIMEOUT_SECS) as u64;

        let mut args: Vec<&str> = vec![
            "run",
            "--rm",
            "-i",
            "--network",
            "none",
            "--memory",
            "512m",
            "--cpus",
            "1",
            "--pids-limit",
            "100",
            "--read-only",
            "--user",
            "nobody",
            "--label",
            crate::services::safety::MANAGED_LABEL,
            image,
        ];
        args.extend_from_slice(interpreter);

        let mut child = Command::new("docker")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DomainError::ExecutionFailed(format!("docker unavailable: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(content.as_bytes())
                .await
                .map_err(|e| DomainError::ExecutionFailed(e.to_string()))?;
        }

        let result = tokio::time::timeout(
            Duration::from_secs(effective_timeout),
            child.wait_with_output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => Ok(json!({
                "exit_code": output.status.code().unwrap_or(-1),
                "stdout": String::from_utf8_lossy(&output.stdout),
                "stderr": String::from_utf8_lossy(&output.stderr),
                "timeout": false,
            })),
            Ok(Err(e)) => Err(DomainError::ExecutionFailed(e.to_string())),
            Err(_) => Ok(json!({
                "exit_code": -1,
                "stdout": "",
                "stderr": format!("script timed out after {effective_timeout}s"),
                "timeout": true,
            })),
        }
    }
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new()
    }
}
