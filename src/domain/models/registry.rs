//! Action definitions: the runtime catalog entries the registry serves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::action::ActionType;

/// Declared type of an action parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Int,
    Float,
    Str,
    Bool,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Bool => "bool",
        }
    }

    /// Whether a JSON value matches this declared type.
    ///
    /// Integers are accepted where floats are declared; the reverse is not.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Int => value.as_i64().is_some() || value.as_u64().is_some(),
            Self::Float => value.is_number(),
            Self::Str => value.is_string(),
            Self::Bool => value.is_boolean(),
        }
    }
}

/// Parameter definition for an action argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    pub param_type: ParamType,
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Default value filled in when an optional parameter is omitted.
    #[serde(default)]
    pub default: Option<Value>,
}

fn default_required() -> bool {
    true
}

impl ParamDef {
    pub fn required(param_type: ParamType, description: &str) -> Self {
        Self {
            param_type,
            description: description.to_string(),
            required: true,
            default: None,
        }
    }

    pub fn optional(param_type: ParamType, description: &str, default: Value) -> Self {
        Self {
            param_type,
            description: description.to_string(),
            required: false,
            default: Some(default),
        }
    }
}

/// Risk tier assigned to an action definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl Default for RiskTier {
    fn default() -> Self {
        Self::Low
    }
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Complete definition of an executable action.
///
/// Subjects advertise their native actions through this shape; general
/// tools ship with the operator using the same shape and
/// `ActionType::Tool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    /// Human-readable description, surfaced in diagnosis prompts.
    pub description: String,
    /// Parameter definitions keyed by parameter name. BTreeMap keeps
    /// prompt rendering deterministic.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamDef>,
    #[serde(default)]
    pub action_type: ActionType,
    #[serde(default)]
    pub risk_level: RiskTier,
    #[serde(default)]
    pub requires_approval: bool,
}

impl ActionDefinition {
    pub fn new(name: &str, description: &str, action_type: ActionType) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: BTreeMap::new(),
            action_type,
            risk_level: RiskTier::Low,
            requires_approval: false,
        }
    }

    pub fn with_param(mut self, name: &str, def: ParamDef) -> Self {
        self.parameters.insert(name.to_string(), def);
        self
    }

    pub fn with_risk(mut self, risk: RiskTier) -> Self {
        self.risk_level = risk;
        self
    }

    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn int_matches_json_integers_only() {
        assert!(ParamType::Int.matches(&json!(7)));
        assert!(!ParamType::Int.matches(&json!(7.5)));
        assert!(!ParamType::Int.matches(&json!("7")));
    }

    #[test]
    fn float_accepts_integers() {
        assert!(ParamType::Float.matches(&json!(7)));
        assert!(ParamType::Float.matches(&json!(7.5)));
        assert!(!ParamType::Float.matches(&json!(true)));
    }

    #[test]
    fn builder_collects_params() {
        let def = ActionDefinition::new("reset_counter", "Reset a counter", ActionType::Subject)
            .with_param("key", ParamDef::required(ParamType::Str, "Counter key"))
            .with_risk(RiskTier::High);
        assert_eq!(def.parameters.len(), 1);
        assert_eq!(def.risk_level, RiskTier::High);
    }
}
