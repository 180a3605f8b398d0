//! Structured diagnosis output from the LLM.
//!
//! The schema is fixed; responses that do not conform are rejected.

use serde::{Deserialize, Serialize};

use super::action::ActionRecommendation;

/// Schema-constrained diagnosis response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisOutput {
    /// "Critical", "Warning", or "Info".
    pub severity: String,
    /// The most likely root cause, with supporting evidence.
    pub primary_diagnosis: String,
    /// Ranked alternatives with reasons they were (not) ruled out.
    #[serde(default)]
    pub alternatives_considered: Vec<String>,
    /// Conceptual description of what to do, runbook style.
    pub recommended_action: String,
    /// Structured actions ready for the dispatcher, if any.
    #[serde(default)]
    pub recommended_actions: Vec<ActionRecommendation>,
}

impl DiagnosisOutput {
    /// Render the diagnosis as the markdown blob stored on the ticket.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str(&format!("# Diagnosis ({})\n\n", self.severity));
        md.push_str("## Primary Diagnosis\n\n");
        md.push_str(&self.primary_diagnosis);
        md.push_str("\n\n");

        if !self.alternatives_considered.is_empty() {
            md.push_str("## Alternatives Considered\n\n");
            for alt in &self.alternatives_considered {
                md.push_str(&format!("- {alt}\n"));
            }
            md.push('\n');
        }

        md.push_str("## Recommended Action\n\n");
        md.push_str(&self.recommended_action);
        md.push('\n');

        if !self.recommended_actions.is_empty() {
            md.push_str("\n## Structured Actions\n\n");
            for rec in &self.recommended_actions {
                let params = serde_json::to_string(&rec.parameters).unwrap_or_default();
                md.push_str(&format!(
                    "- `{}` {} (urgency: {}) - {}\n",
                    rec.action_name, params, rec.urgency, rec.reason
                ));
            }
        }

        md
    }
}
