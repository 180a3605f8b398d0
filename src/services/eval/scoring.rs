//! Trial scoring and campaign analysis.
//!
//! Scoring is idempotent and read-only over stored trials: it never
//! mutates the database, so it can be re-run as analysis evolves.

use serde::Serialize;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::models::eval::{CampaignSummary, Trial, TrialOutcome, TrialScore};
use crate::infrastructure::database::EvalRepository;
use crate::services::eval::commands::{analyze_commands, CommandExtract};

/// Score one trial against the subject's health predicate.
pub fn score_trial(trial: &Trial, healthy: impl Fn(&Value) -> bool) -> TrialScore {
    let time_to_detect_sec = trial
        .ticket_created_at
        .map(|created| (created - trial.chaos_injected_at).num_milliseconds() as f64 / 1000.0);
    let time_to_resolve_sec = trial
        .resolved_at
        .map(|resolved| (resolved - trial.chaos_injected_at).num_milliseconds() as f64 / 1000.0);

    let final_healthy = serde_json::from_str::<Value>(&trial.final_state)
        .map(|state| healthy(&state))
        .unwrap_or(false);
    let resolved = trial.resolved_at.is_some() && final_healthy;

    let outcome = if resolved {
        TrialOutcome::Success
    } else if trial.resolved_at.is_none() && !final_healthy {
        TrialOutcome::Timeout
    } else {
        TrialOutcome::Failure
    };

    let commands: Vec<CommandExtract> =
        serde_json::from_str(&trial.commands_json).unwrap_or_default();
    let analysis = analyze_commands(&commands);

    TrialScore {
        trial_id: trial.id,
        outcome,
        resolved,
        time_to_detect_sec,
        time_to_resolve_sec,
        command_count: analysis.total_count,
        unique_commands: analysis.unique_count,
        destructive_count: analysis.destructive_count,
        thrashing: analysis.thrashing,
    }
}

/// Compute the campaign summary. Read-only.
pub async fn analyze_campaign(
    eval: &EvalRepository,
    campaign_id: i64,
    healthy: impl Fn(&Value) -> bool,
) -> DomainResult<CampaignSummary> {
    let campaign = eval.get_campaign(campaign_id).await?;
    let trials = eval.trials_for_campaign(campaign_id).await?;
    let scores: Vec<TrialScore> = trials.iter().map(|t| score_trial(t, &healthy)).collect();

    let success_count = scores.iter().filter(|s| s.outcome == TrialOutcome::Success).count();
    let failure_count = scores.iter().filter(|s| s.outcome == TrialOutcome::Failure).count();
    let timeout_count = scores.iter().filter(|s| s.outcome == TrialOutcome::Timeout).count();
    let win_rate = if scores.is_empty() {
        0.0
    } else {
        success_count as f64 / scores.len() as f64
    };

    // Mean detect/resolve over successful trials only.
    let detect: Vec<f64> = scores
        .iter()
        .filter(|s| s.outcome == TrialOutcome::Success)
        .filter_map(|s| s.time_to_detect_sec)
        .collect();
    let resolve: Vec<f64> = scores
        .iter()
        .filter(|s| s.outcome == TrialOutcome::Success)
        .filter_map(|s| s.time_to_resolve_sec)
        .collect();

    Ok(CampaignSummary {
        campaign_id,
        subject_name: campaign.subject_name,
        chaos_type: campaign.chaos_type,
        trial_count: scores.len(),
        success_count,
        failure_count,
        timeout_count,
        win_rate,
        avg_time_to_detect_sec: mean(&detect),
        avg_time_to_resolve_sec: mean(&resolve),
        total_commands: scores.iter().map(|s| s.command_count).sum(),
        total_unique_commands: scores.iter().map(|s| s.unique_commands).sum(),
        total_destructive_commands: scores.iter().map(|s| s.destructive_count).sum(),
        thrashing_trials: scores.iter().filter(|s| s.thrashing).count(),
    })
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Side-by-side comparison of two campaigns (agent vs baseline, A vs B,
/// or variant scorecards).
#[derive(Debug, Clone, Serialize)]
pub struct CampaignComparison {
    pub left: CampaignSummary,
    pub right: CampaignSummary,
    pub win_rate_delta: f64,
    pub detect_delta_sec: Option<f64>,
    pub resolve_delta_sec: Option<f64>,
}

pub fn compare_campaigns(left: CampaignSummary, right: CampaignSummary) -> CampaignComparison {
    let win_rate_delta = left.win_rate - right.win_rate;
    let detect_delta_sec = match (left.avg_time_to_detect_sec, right.avg_time_to_detect_sec) {
        (Some(l), Some(r)) => Some(l - r),
        _ => None,
    };
    let resolve_delta_sec = match (left.avg_time_to_resolve_sec, right.avg_time_to_resolve_sec) {
        (Some(l), Some(r)) => Some(l - r),
        _ => None,
    };
    CampaignComparison {
        left,
        right,
        win_rate_delta,
        detect_delta_sec,
        resolve_delta_sec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn trial(
        detect_after: Option<i64>,
        resolve_after: Option<i64>,
        final_state: &str,
    ) -> Trial {
        let injected = Utc::now();
        Trial {
            id: 1,
            campaign_id: 1,
            started_at: injected - Duration::seconds(10),
            chaos_injected_at: injected,
            ticket_created_at: detect_after.map(|s| injected + Duration::seconds(s)),
            resolved_at: resolve_after.map(|s| injected + Duration::seconds(s)),
            ended_at: injected + Duration::seconds(120),
            initial_state: r#"{"healthy": true}"#.to_string(),
            final_state: final_state.to_string(),
            chaos_metadata: "{}".to_string(),
            commands_json: "[]".to_string(),
        }
    }

    fn healthy(state: &Value) -> bool {
        state.get("healthy").and_then(Value::as_bool).unwrap_or(false)
    }

    #[test]
    fn timing_is_relative_to_injection_and_nonnegative() {
        let score = score_trial(&trial(Some(3), Some(45), r#"{"healthy": true}"#), healthy);
        assert_eq!(score.time_to_detect_sec, Some(3.0));
        assert_eq!(score.time_to_resolve_sec, Some(45.0));
        assert!(score.time_to_detect_sec.unwrap() >= 0.0);
        assert!(score.time_to_resolve_sec.unwrap() >= 0.0);
        assert_eq!(score.outcome, TrialOutcome::Success);
    }

    #[test]
    fn unresolved_unhealthy_is_timeout() {
        let score = score_trial(&trial(Some(3), None, r#"{"healthy": false}"#), healthy);
        assert_eq!(score.outcome, TrialOutcome::Timeout);
        assert!(!score.resolved);
    }

    #[test]
    fn resolved_but_unhealthy_is_failure() {
        let score = score_trial(&trial(Some(3), Some(45), r#"{"healthy": false}"#), healthy);
        assert_eq!(score.outcome, TrialOutcome::Failure);
        assert!(!score.resolved);
    }

    #[test]
    fn comparison_deltas() {
        let mut left = CampaignSummary {
            campaign_id: 1,
            subject_name: "ratelimiter".to_string(),
            chaos_type: "node_kill".to_string(),
            trial_count: 4,
            success_count: 3,
            failure_count: 1,
            timeout_count: 0,
            win_rate: 0.75,
            avg_time_to_detect_sec: Some(4.0),
            avg_time_to_resolve_sec: Some(50.0),
            total_commands: 12,
            total_unique_commands: 8,
            total_destructive_commands: 1,
            thrashing_trials: 0,
        };
        let right = left.clone();
        left.win_rate = 0.5;
        left.avg_time_to_resolve_sec = Some(80.0);

        let comparison = compare_campaigns(left, right);
        assert!((comparison.win_rate_delta - (-0.25)).abs() < 1e-9);
        assert_eq!(comparison.resolve_delta_sec, Some(30.0));
    }
}
