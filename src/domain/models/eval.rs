//! Evaluation harness records: campaigns, trials, and scores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A matrix of chaos experiments against one or more subjects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub subject_name: String,
    pub chaos_type: String,
    pub trial_count: i64,
    /// Baseline campaigns run without the agent (self-heal only).
    pub baseline: bool,
    pub variant_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One chaos experiment. Immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    pub id: i64,
    pub campaign_id: i64,
    pub started_at: DateTime<Utc>,
    pub chaos_injected_at: DateTime<Utc>,
    pub ticket_created_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    /// Opaque subject state snapshots, JSON-encoded.
    pub initial_state: String,
    pub final_state: String,
    pub chaos_metadata: String,
    /// Commands extracted from the audit log during the trial window.
    pub commands_json: String,
}

/// Outcome classification for a scored trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    Success,
    Failure,
    Timeout,
}

impl TrialOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
        }
    }
}

/// Computed score for one trial. Scoring is idempotent and read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialScore {
    pub trial_id: i64,
    pub outcome: TrialOutcome,
    pub resolved: bool,
    /// `ticket_created - chaos_injected`, seconds.
    pub time_to_detect_sec: Option<f64>,
    /// `resolved - chaos_injected`, seconds.
    pub time_to_resolve_sec: Option<f64>,
    pub command_count: usize,
    pub unique_commands: usize,
    pub destructive_count: usize,
    /// Three or more identical commands within 60 seconds.
    pub thrashing: bool,
}

/// Aggregated campaign metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub campaign_id: i64,
    pub subject_name: String,
    pub chaos_type: String,
    pub trial_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub timeout_count: usize,
    pub win_rate: f64,
    pub avg_time_to_detect_sec: Option<f64>,
    pub avg_time_to_resolve_sec: Option<f64>,
    pub total_commands: usize,
    pub total_unique_commands: usize,
    pub total_destructive_commands: usize,
    pub thrashing_trials: usize,
}
