//! General tools shipped with the operator.
//!
//! Each tool is advertised through the same `ActionDefinition` shape as
//! subject actions, carries its own risk level and approval flag, and is
//! executed by `GeneralToolExecutor` keyed by action name.

pub mod container;
pub mod host;
pub mod script;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::action::ActionType;
use crate::domain::models::registry::{ActionDefinition, ParamDef, ParamType, RiskTier};
use crate::domain::ports::tools::ToolExecutor;

use container::ContainerRuntime;
use host::HostActions;
use script::ScriptExecutor;

/// The fixed catalog of general tools.
pub fn general_tool_definitions() -> Vec<ActionDefinition> {
    vec![
        ActionDefinition::new("wait", "Pause for a number of seconds", ActionType::Tool)
            .with_param("seconds", ParamDef::required(ParamType::Float, "How long to wait")),
        ActionDefinition::new("log_message", "Emit a log line", ActionType::Tool)
            .with_param("message", ParamDef::required(ParamType::Str, "Message to log")),
        ActionDefinition::new("container_start", "Start a container", ActionType::Tool)
            .with_param("container", ParamDef::required(ParamType::Str, "Container name or id"))
            .with_risk(RiskTier::Medium),
        ActionDefinition::new("container_stop", "Stop a managed container", ActionType::Tool)
            .with_param("container", ParamDef::required(ParamType::Str, "Container name or id"))
            .with_risk(RiskTier::High)
            .with_approval(),
        ActionDefinition::new("container_restart", "Restart a managed container", ActionType::Tool)
            .with_param("container", ParamDef::required(ParamType::Str, "Container name or id"))
            .with_risk(RiskTier::High),
        ActionDefinition::new("container_inspect", "Inspect a container", ActionType::Tool)
            .with_param("container", ParamDef::required(ParamType::Str, "Container name or id")),
        ActionDefinition::new("container_logs", "Tail container logs", ActionType::Tool)
            .with_param("container", ParamDef::required(ParamType::Str, "Container name or id"))
            .with_param(
                "tail",
                ParamDef::optional(ParamType::Int, "Number of lines", json!(100)),
            ),
        ActionDefinition::new(
            "container_network_connect",
            "Connect a container to a network",
            ActionType::Tool,
        )
        .with_param("network", ParamDef::required(ParamType::Str, "Network name"))
        .with_param("container", ParamDef::required(ParamType::Str, "Container name or id"))
        .with_risk(RiskTier::Medium),
        ActionDefinition::new(
            "container_network_disconnect",
            "Disconnect a container from a network",
            ActionType::Tool,
        )
        .with_param("network", ParamDef::required(ParamType::Str, "Network name"))
        .with_param("container", ParamDef::required(ParamType::Str, "Container name or id"))
        .with_risk(RiskTier::High),
        ActionDefinition::new(
            "container_exec",
            "Run a command inside a managed container",
            ActionType::Tool,
        )
        .with_param("container", ParamDef::required(ParamType::Str, "Container name or id"))
        .with_param("command", ParamDef::required(ParamType::Str, "Command to run"))
        .with_risk(RiskTier::High)
        .with_approval(),
        ActionDefinition::new("host_service_start", "Start a host service", ActionType::Tool)
            .with_param("service", ParamDef::required(ParamType::Str, "Service name"))
            .with_risk(RiskTier::Medium),
        ActionDefinition::new("host_service_stop", "Stop a host service", ActionType::Tool)
            .with_param("service", ParamDef::required(ParamType::Str, "Service name"))
            .with_risk(RiskTier::High)
            .with_approval(),
        ActionDefinition::new("host_service_restart", "Restart a host service", ActionType::Tool)
            .with_param("service", ParamDef::required(ParamType::Str, "Service name"))
            .with_risk(RiskTier::High),
        ActionDefinition::new(
            "host_kill_process",
            "Kill a process with SIGTERM, escalating to SIGKILL",
            ActionType::Tool,
        )
        .with_param("pid", ParamDef::required(ParamType::Int, "Process id"))
        .with_param(
            "term_timeout_secs",
            ParamDef::optional(ParamType::Float, "Grace before SIGKILL", json!(5.0)),
        )
        .with_risk(RiskTier::High)
        .with_approval(),
        ActionDefinition::new(
            "execute_script",
            "Run a validated script in an isolated sandbox",
            ActionType::Tool,
        )
        .with_param("content", ParamDef::required(ParamType::Str, "Script content"))
        .with_param(
            "script_type",
            ParamDef::optional(ParamType::Str, "bash or python", json!("bash")),
        )
        .with_param(
            "timeout_secs",
            ParamDef::optional(ParamType::Int, "Execution timeout", json!(60)),
        )
        .with_risk(RiskTier::High)
        .with_approval(),
    ]
}

/// Executor for the general tool catalog.
pub struct GeneralToolExecutor {
    containers: ContainerRuntime,
    host: HostActions,
    scripts: ScriptExecutor,
}

impl GeneralToolExecutor {
    pub fn new() -> Self {
        Self {
            containers: ContainerRuntime::new(),
            host: HostActions::new(),
            scripts: ScriptExecutor::new(),
        }
    }

    fn str_param<'a>(params: &'a Map<String, Value>, name: &str) -> DomainResult<&'a str> {
        params
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| DomainError::Validation {
                field: name.to_string(),
                reason: "expected a string".to_string(),
            })
    }
}

impl Default for GeneralToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for GeneralToolExecutor {
    async fn execute(&self, name: &str, parameters: &Map<String, Value>) -> DomainResult<Value> {
        match name {
            "wait" => {
                let seconds = parameters
                    .get("seconds")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0)
                    .clamp(0.0, 300.0);
                tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
                Ok(json!({ "slept_secs": seconds }))
            }
            "log_message" => {
                let message = Self::str_param(parameters, "message")?;
                info!(target: "warden::tool", "{message}");
                Ok(json!({ "logged": true }))
            }
            "container_start" => {
                let container = Self::str_param(parameters, "container")?;
                self.containers.start(container).await
            }
            "container_stop" => {
                let container = Self::str_param(parameters, "container")?;
                self.containers.stop(container).await
            }
            "container_restart" => {
                let container = Self::str_param(parameters, "container")?;
                self.containers.restart(container).await
            }
            "container_inspect" => {
                let container = Self::str_param(parameters, "container")?;
                self.containers.inspect(container).await
            }
            "container_logs" => {
                let container = Self::str_param(parameters, "container")?;
                let tail = parameters.get("tail").and_then(Value::as_i64).unwrap_or(100);
                self.containers.logs(container, tail).await
            }
            "container_network_connect" => {
                let network = Self::str_param(parameters, "network")?;
                let container = Self::str_param(parameters, "container")?;
                self.containers.network_connect(network, container).await
            }
            "container_network_disconnect" => {
                let network = Self::str_param(parameters, "network")?;
                let container = Self::str_param(parameters, "container")?;
                self.containers.network_disconnect(network, container).await
            }
            "container_exec" => {
                let container = Self::str_param(parameters, "container")?;
                let command = Self::str_param(parameters, "command")?;
                self.containers.exec(container, command).await
            }
            "host_service_start" => {
                let service = Self::str_param(parameters, "service")?;
                self.host.service_action("start", service).await
            }
            "host_service_stop" => {
                let service = Self::str_param(parameters, "service")?;
                self.host.service_action("stop", service).await
            }
            "host_service_restart" => {
                let service = Self::str_param(parameters, "service")?;
                self.host.service_action("restart", service).await
            }
            "host_kill_process" => {
                let pid = parameters
                    .get("pid")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| DomainError::Validation {
                        field: "pid".to_string(),
                        reason: "expected an integer".to_string(),
                    })?;
                let timeout = parameters
                    .get("term_timeout_secs")
                    .and_then(Value::as_f64)
                    .unwrap_or(5.0);
                self.host.kill_process(pid, Duration::from_secs_f64(timeout)).await
            }
            "execute_script" => {
                let content = Self::str_param(parameters, "content")?;
                let script_type = parameters
                    .get("script_type")
                    .and_then(Value::as_str)
                    .unwrap_or("bash");
                let timeout = parameters
                    .get("timeout_secs")
                    .and_then(Value::as_i64)
                    .unwrap_or(60);
                self.scripts.execute(content, script_type, timeout).await
            }
            other => Err(DomainError::UnknownAction(other.to_string())),
        }
    }
}
