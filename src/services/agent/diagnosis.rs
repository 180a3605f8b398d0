//! Schema-constrained diagnosis parsing.
//!
//! The diagnosis request forces a tool call whose input schema matches
//! `DiagnosisOutput`. Responses that do not conform are rejected; the
//! three terminal stop reasons are surfaced for the runner to handle.

use serde_json::json;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::diagnosis::DiagnosisOutput;
use crate::infrastructure::llm::types::{MessageResponse, StopReason, ToolDefinition};

/// Name of the forced tool carrying the structured diagnosis.
pub const DIAGNOSIS_TOOL_NAME: &str = "record_diagnosis";

/// Tool definition whose input schema is the diagnosis shape.
pub fn diagnosis_tool() -> ToolDefinition {
    ToolDefinition {
        name: DIAGNOSIS_TOOL_NAME.to_string(),
        description: "Record the structured differential diagnosis for the ticket".to_string(),
        input_schema: json!({
            "type": "object",
            "required": ["severity", "primary_diagnosis", "recommended_action"],
            "properties": {
                "severity": {
                    "type": "string",
                    "enum": ["Critical", "Warning", "Info"],
                    "description": "Overall severity of the incident"
                },
                "primary_diagnosis": {
                    "type": "string",
                    "description": "Most likely root cause with supporting evidence"
                },
                "alternatives_considered": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Other possibilities and why they were (not) ruled out"
                },
                "recommended_action": {
                    "type": "string",
                    "description": "Conceptual remediation, runbook style; 'wait and observe' is valid"
                },
                "recommended_actions": {
                    "type": "array",
                    "description": "Structured actions from the available-actions list",
                    "items": {
                        "type": "object",
                        "required": ["action_name", "parameters", "reason"],
                        "properties": {
                            "action_name": {"type": "string"},
                            "parameters": {"type": "object"},
                            "reason": {"type": "string"},
                            "expected_outcome": {"type": "string"},
                            "urgency": {
                                "type": "string",
                                "enum": ["low", "medium", "high"]
                            }
                        }
                    }
                }
            }
        }),
    }
}

/// How a diagnosis request terminated.
#[derive(Debug)]
pub enum DiagnosisOutcome {
    /// Normal completion with a conforming payload.
    Complete(DiagnosisOutput),
    /// The model declined to diagnose. Terminal for this ticket until
    /// the violation re-fires.
    Refused,
    /// Output was cut off at the token limit; a partial payload may
    /// still be usable.
    Truncated(Option<DiagnosisOutput>),
}

/// Interpret a diagnosis response, handling the three terminal stop
/// reasons and rejecting non-conforming payloads.
pub fn parse_diagnosis_response(response: &MessageResponse) -> DomainResult<DiagnosisOutcome> {
    match response.stop_reason {
        Some(StopReason::Refusal) => Ok(DiagnosisOutcome::Refused),
        Some(StopReason::MaxTokens) => {
            let partial = response
                .tool_input(DIAGNOSIS_TOOL_NAME)
                .and_then(|input| serde_json::from_value(input.clone()).ok());
            Ok(DiagnosisOutcome::Truncated(partial))
        }
        _ => {
            let input = response.tool_input(DIAGNOSIS_TOOL_NAME).ok_or_else(|| {
                DomainError::Llm("response carried no diagnosis tool call".to_string())
            })?;
            let output: DiagnosisOutput =
                serde_json::from_value(input.clone()).map_err(|e| {
                    DomainError::Llm(format!("diagnosis did not match the expected schema: {e}"))
                })?;
            Ok(DiagnosisOutcome::Complete(output))
        }
    }
}
