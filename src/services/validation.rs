//! Parameter validation against registry definitions.
//!
//! Runs twice in the action lifecycle: at proposal creation and again
//! immediately before execution, since definitions may have changed in
//! between.

use serde_json::{Map, Value};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::registry::ActionDefinition;

/// Validate parameters against a definition.
///
/// Checks that every required parameter is present, each value matches
/// its declared type, and no unknown parameters were passed. Optional
/// parameters are filled in from their defaults. Returns the effective
/// parameter map.
pub fn validate_action_params(
    definition: &ActionDefinition,
    parameters: &Map<String, Value>,
) -> DomainResult<Map<String, Value>> {
    for key in parameters.keys() {
        if !definition.parameters.contains_key(key) {
            return Err(DomainError::Validation {
                field: key.clone(),
                reason: format!("unknown parameter for action '{}'", definition.name),
            });
        }
    }

    let mut effective = Map::new();
    for (name, def) in &definition.parameters {
        match parameters.get(name) {
            Some(value) => {
                if !def.param_type.matches(value) {
                    return Err(DomainError::Validation {
                        field: name.clone(),
                        reason: format!(
                            "expected {}, got {}",
                            def.param_type.as_str(),
                            json_type_name(value)
                        ),
                    });
                }
                effective.insert(name.clone(), value.clone());
            }
            None if def.required => {
                return Err(DomainError::Validation {
                    field: name.clone(),
                    reason: "required parameter is missing".to_string(),
                });
            }
            None => {
                if let Some(default) = &def.default {
                    effective.insert(name.clone(), default.clone());
                }
            }
        }
    }

    Ok(effective)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
