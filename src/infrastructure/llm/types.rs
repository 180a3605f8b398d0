//! Messages API request and response shapes.
//!
//! Structured diagnosis output is obtained by forcing a tool call whose
//! input schema matches `DiagnosisOutput`; the response's `tool_use`
//! block carries the validated payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Tool definition with a JSON schema for its input.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tool choice directive; `tool` forces the named tool.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Tool { name: String },
}

/// Terminal stop reasons the agent must handle explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    Refusal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<StopReason>,
}

impl MessageResponse {
    /// The input payload of the first tool_use block, if any.
    pub fn tool_input(&self, tool_name: &str) -> Option<&Value> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::ToolUse { name, input, .. } if name == tool_name => Some(input),
            _ => None,
        })
    }

    /// Concatenated text content.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::ToolUse { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_deserializes_tool_use() {
        let raw = json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-5",
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "Diagnosing."},
                {"type": "tool_use", "id": "tu_1", "name": "record_diagnosis",
                 "input": {"severity": "Warning"}}
            ]
        });
        let response: MessageResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
        let input = response.tool_input("record_diagnosis").unwrap();
        assert_eq!(input["severity"], "Warning");
        assert_eq!(response.text(), "Diagnosing.");
    }

    #[test]
    fn request_serializes_forced_tool_choice() {
        let request = MessageRequest {
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 1024,
            system: Some("You are an SRE.".to_string()),
            messages: vec![Message::user("diagnose")],
            tools: vec![ToolDefinition {
                name: "record_diagnosis".to_string(),
                description: "Record the diagnosis".to_string(),
                input_schema: json!({"type": "object"}),
            }],
            tool_choice: Some(ToolChoice::Tool {
                name: "record_diagnosis".to_string(),
            }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["tool_choice"]["type"], "tool");
        assert_eq!(value["tool_choice"]["name"], "record_diagnosis");
    }
}
