//! Command extraction and classification for trial analysis.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::audit::{AuditEvent, AuditEventType};
use crate::domain::ports::llm::LlmClient;
use crate::infrastructure::llm::types::{Message, MessageRequest, ToolChoice, ToolDefinition};

/// One command the agent issued during a trial, extracted from the
/// audit log's `proposed` events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandExtract {
    pub tool_name: String,
    pub tool_params: Value,
    pub timestamp: DateTime<Utc>,
}

/// Classification buckets for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandClass {
    Diagnostic,
    Remediation,
    Destructive,
    Other,
}

/// Aggregate command metrics for one trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAnalysis {
    pub total_count: usize,
    pub unique_count: usize,
    pub destructive_count: usize,
    /// Three or more identical commands within 60 seconds.
    pub thrashing: bool,
}

/// Pull agent commands out of an audit event window.
pub fn extract_commands(events: &[AuditEvent]) -> Vec<CommandExtract> {
    events
        .iter()
        .filter(|event| event.event_type == AuditEventType::Proposed)
        .filter_map(|event| {
            let data = event.event_data.as_ref()?;
            Some(CommandExtract {
                tool_name: data.get("action_name")?.as_str()?.to_string(),
                tool_params: data.get("parameters").cloned().unwrap_or(Value::Null),
                timestamp: event.timestamp,
            })
        })
        .collect()
}

/// Rule-based classification by action name.
pub fn classify_command(tool_name: &str) -> CommandClass {
    match tool_name {
        "wait" | "log_message" | "container_inspect" | "container_logs" | "get_status"
        | "check_health" => CommandClass::Diagnostic,
        "reset_counter" | "set_limit" | "reload_node" | "container_start"
        | "container_restart" | "host_service_start" | "host_service_restart"
        | "container_network_connect" | "transfer_leader" | "add_peer" => CommandClass::Remediation,
        "container_stop" | "container_exec" | "container_network_disconnect"
        | "host_service_stop" | "host_kill_process" | "execute_script" | "remove_peer"
        | "host_delete_file" => CommandClass::Destructive,
        _ => CommandClass::Other,
    }
}

/// Compute aggregate metrics over a trial's commands.
pub fn analyze_commands(commands: &[CommandExtract]) -> CommandAnalysis {
    let mut unique = std::collections::HashSet::new();
    let mut destructive = 0usize;
    for command in commands {
        unique.insert(format!("{}:{}", command.tool_name, command.tool_params));
        if classify_command(&command.tool_name) == CommandClass::Destructive {
            destructive += 1;
        }
    }

    CommandAnalysis {
        total_count: commands.len(),
        unique_count: unique.len(),
        destructive_count: destructive,
        thrashing: detect_thrashing(commands),
    }
}

/// Thrashing: at least three identical commands inside a 60 s window.
pub fn detect_thrashing(commands: &[CommandExtract]) -> bool {
    let window = Duration::seconds(60);
    for (i, first) in commands.iter().enumerate() {
        let identical: Vec<&CommandExtract> = commands[i..]
            .iter()
            .filter(|c| {
                c.tool_name == first.tool_name
                    && c.tool_params == first.tool_params
                    && c.timestamp - first.timestamp <= window
                    && c.timestamp >= first.timestamp
            })
            .collect();
        if identical.len() >= 3 {
            return true;
        }
    }
    false
}

/// Optional second pass: ask the model to classify commands. Falls back
/// to the rule table per command when the response is unusable.
pub async fn classify_commands_llm(
    llm: &dyn LlmClient,
    model: &str,
    commands: &[CommandExtract],
) -> DomainResult<Vec<CommandClass>> {
    if commands.is_empty() {
        return Ok(Vec::new());
    }

    let listing: Vec<Value> = commands
        .iter()
        .map(|c| json!({ "tool_name": c.tool_name, "tool_params": c.tool_params }))
        .collect();

    let request = MessageRequest {
        model: model.to_string(),
        max_tokens: 1024,
        system: Some(
            "Classify each operator command as diagnostic, remediation, destructive, or other."
                .to_string(),
        ),
        messages: vec![Message::user(
            serde_json::to_string_pretty(&listing).unwrap_or_default(),
        )],
        tools: vec![ToolDefinition {
            name: "record_classification".to_string(),
            description: "Record one class per command, in input order".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["classes"],
                "properties": {
                    "classes": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": ["diagnostic", "remediation", "destructive", "other"]
                        }
                    }
                }
            }),
        }],
        tool_choice: Some(ToolChoice::Tool {
            name: "record_classification".to_string(),
        }),
    };

    let response = llm.send_message(request).await?;
    let classes: Option<Vec<CommandClass>> = response
        .tool_input("record_classification")
        .and_then(|input| input.get("classes"))
        .and_then(|classes| serde_json::from_value(classes.clone()).ok());

    match classes {
        Some(classes) if classes.len() == commands.len() => Ok(classes),
        _ => Err(DomainError::Llm(
            "command classification did not match the expected schema".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(name: &str, at_secs: i64) -> CommandExtract {
        CommandExtract {
            tool_name: name.to_string(),
            tool_params: json!({"key": "k1"}),
            timestamp: Utc::now() + Duration::seconds(at_secs),
        }
    }

    #[test]
    fn extraction_reads_proposed_events() {
        let events = vec![
            AuditEvent {
                id: 1,
                proposal_id: Some(1),
                event_type: AuditEventType::Proposed,
                event_data: Some(json!({
                    "action_name": "reset_counter",
                    "parameters": {"key": "k1"}
                })),
                actor: "agent".to_string(),
                timestamp: Utc::now(),
            },
            AuditEvent {
                id: 2,
                proposal_id: Some(1),
                event_type: AuditEventType::Completed,
                event_data: None,
                actor: "system".to_string(),
                timestamp: Utc::now(),
            },
        ];
        let commands = extract_commands(&events);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].tool_name, "reset_counter");
    }

    #[test]
    fn classification_rules() {
        assert_eq!(classify_command("container_logs"), CommandClass::Diagnostic);
        assert_eq!(classify_command("reset_counter"), CommandClass::Remediation);
        assert_eq!(classify_command("host_kill_process"), CommandClass::Destructive);
        assert_eq!(classify_command("mystery"), CommandClass::Other);
    }

    #[test]
    fn thrashing_needs_three_identical_within_window() {
        let calm = vec![command("reset_counter", 0), command("reset_counter", 30)];
        assert!(!detect_thrashing(&calm));

        let thrash = vec![
            command("reset_counter", 0),
            command("reset_counter", 20),
            command("reset_counter", 40),
        ];
        assert!(detect_thrashing(&thrash));

        let spread = vec![
            command("reset_counter", 0),
            command("reset_counter", 70),
            command("reset_counter", 140),
        ];
        assert!(!detect_thrashing(&spread));
    }

    #[test]
    fn analysis_counts_unique_and_destructive() {
        let commands = vec![
            command("container_logs", 0),
            command("container_logs", 5),
            command("host_kill_process", 10),
        ];
        let analysis = analyze_commands(&commands);
        assert_eq!(analysis.total_count, 3);
        assert_eq!(analysis.unique_count, 2);
        assert_eq!(analysis.destructive_count, 1);
    }
}
