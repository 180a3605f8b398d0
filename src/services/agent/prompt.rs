//! System prompt and prompt builder for diagnosis requests.

use std::fmt::Write as _;

use super::context::DiagnosisContext;

/// Clinical, runbook-style system prompt for differential diagnosis.
pub const SYSTEM_PROMPT: &str = "\
You are an expert SRE diagnosing incidents in a distributed system.

For each ticket, produce a differential diagnosis:

1. TIMELINE: what happened, in order.
2. AFFECTED COMPONENTS: which nodes, services, or cluster-wide systems.
3. METRIC READINGS: key values at violation time.
4. PRIMARY DIAGNOSIS: the most likely root cause, with supporting
   evidence and your confidence stated in natural language.
5. ALTERNATIVES CONSIDERED: what else this could be, with the evidence
   for and against each. 'Insufficient data' is an acceptable
   conclusion; state what is missing.
6. RECOMMENDED ACTION: conceptual remediation with risks and side
   effects. 'Wait and observe' is a valid recommendation.
7. STRUCTURED ACTIONS: when Available Actions are listed, fill
   recommended_actions with every required parameter taken from the
   observation data. An action with missing parameters fails validation.

Write in a clinical, terse, metric-focused tone. Reference specific
values and thresholds. Show your reasoning.";

/// Render the structured context into the user prompt.
pub fn build_diagnosis_prompt(context: &DiagnosisContext) -> String {
    let ticket = &context.ticket;
    let mut prompt = String::new();

    let _ = writeln!(prompt, "## Ticket {}", ticket.id);
    let _ = writeln!(prompt, "- Invariant: {}", ticket.invariant_name);
    if let Some(entity) = &ticket.entity_id {
        let _ = writeln!(prompt, "- Entity: {entity}");
    }
    let _ = writeln!(prompt, "- Severity: {}", ticket.severity.as_str());
    let _ = writeln!(prompt, "- Message: {}", ticket.message);
    let _ = writeln!(prompt, "- First seen: {}", ticket.first_seen_at.to_rfc3339());
    let _ = writeln!(prompt, "- Last seen: {}", ticket.last_seen_at.to_rfc3339());
    let _ = writeln!(prompt, "- Occurrences: {}", ticket.occurrence_count);
    prompt.push('\n');

    if let Some(context_note) = &ticket.subject_context {
        let _ = writeln!(prompt, "## Subject Context\n{context_note}\n");
    }

    if let Some(snapshot) = &ticket.metric_snapshot {
        let rendered = serde_json::to_string_pretty(snapshot).unwrap_or_default();
        let _ = writeln!(prompt, "## Metrics At Detection\n```json\n{rendered}\n```\n");
    }

    match &context.observation {
        Some(observation) => {
            let rendered = serde_json::to_string_pretty(observation).unwrap_or_default();
            let _ = writeln!(prompt, "## Current Observation\n```json\n{rendered}\n```\n");
        }
        None => {
            let _ = writeln!(
                prompt,
                "## Current Observation\nUnavailable (subject unreachable); \
                 reason from the detection-time metrics above.\n"
            );
        }
    }

    if let Some(log_tail) = &context.log_tail {
        let _ = writeln!(prompt, "## Recent Logs\n```\n{log_tail}\n```\n");
    }

    if !context.similar_tickets.is_empty() {
        let _ = writeln!(prompt, "## Similar Past Tickets");
        for similar in &context.similar_tickets {
            let _ = writeln!(
                prompt,
                "- #{} {} [{}] {} (x{})",
                similar.id,
                similar.invariant_name,
                similar.status.as_str(),
                similar.message,
                similar.occurrence_count
            );
        }
        prompt.push('\n');
    }

    if !context.available_actions.is_empty() {
        let _ = writeln!(prompt, "## Available Actions");
        for action in &context.available_actions {
            let params: Vec<String> = action
                .parameters
                .iter()
                .map(|(name, def)| {
                    let req = if def.required { "required" } else { "optional" };
                    format!("{name}: {} ({req})", def.param_type.as_str())
                })
                .collect();
            let _ = writeln!(
                prompt,
                "- {} [{}]: {} ({})",
                action.name,
                action.risk_level.as_str(),
                action.description,
                params.join(", ")
            );
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::action::ActionType;
    use crate::domain::models::registry::{ActionDefinition, ParamDef, ParamType};
    use crate::domain::models::ticket::{Severity, Ticket, TicketStatus};
    use chrono::Utc;
    use serde_json::json;

    fn ticket() -> Ticket {
        Ticket {
            id: 7,
            violation_key: "over_limit:k1".to_string(),
            invariant_name: "over_limit".to_string(),
            entity_id: Some("k1".to_string()),
            message: "Counter k1 over limit: count=20, limit=10".to_string(),
            severity: Severity::Warning,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            resolved_at: None,
            status: TicketStatus::Open,
            held: false,
            occurrence_count: 2,
            batch_key: None,
            metric_snapshot: Some(json!({"counters": [{"key": "k1", "count": 20}]})),
            diagnosis: None,
            subject_context: None,
        }
    }

    #[test]
    fn prompt_includes_ticket_and_actions() {
        let context = DiagnosisContext {
            ticket: ticket(),
            observation: None,
            log_tail: None,
            similar_tickets: vec![],
            available_actions: vec![ActionDefinition::new(
                "reset_counter",
                "Reset a counter",
                ActionType::Subject,
            )
            .with_param("key", ParamDef::required(ParamType::Str, "Counter key"))],
        };
        let prompt = build_diagnosis_prompt(&context);
        assert!(prompt.contains("Ticket 7"));
        assert!(prompt.contains("over_limit"));
        assert!(prompt.contains("Entity: k1"));
        assert!(prompt.contains("reset_counter"));
        assert!(prompt.contains("key: str (required)"));
        assert!(prompt.contains("Metrics At Detection"));
        assert!(prompt.contains("subject unreachable"));
    }
}
