//! Session-level risk tracking for multi-action pattern detection.
//!
//! Accumulates a weighted score over the recent actions of a session to
//! surface aggressive remediation, privilege-escalation sequences, and
//! repeated destructive operations.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Risk levels by cumulative score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Normal operation, score < 10.
    Low,
    /// Multiple actions, score 10-24.
    Medium,
    /// Significant changes, score 25-49.
    High,
    /// Dangerous patterns, score >= 50.
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Base risk scores per action. Read-only ops score 1, reconfiguration
/// 3-5, container restarts 6, file writes 7, exec/kill/delete 8-10.
fn action_risk_score(action_name: &str) -> i64 {
    match action_name {
        "get_status" | "check_health" | "wait" | "log_message" | "container_inspect"
        | "container_logs" => 1,
        "set_limit" | "set_leader_schedule_limit" | "update_config" => 4,
        "transfer_leader" => 3,
        "add_peer" => 4,
        "remove_peer" | "reload_node" => 5,
        "container_restart" | "host_service_restart" => 6,
        "host_write_file" => 7,
        "container_exec" | "execute_script" => 8,
        "host_kill_process" | "host_delete_file" => 9,
        "reset_counter" | "container_stop" => 6,
        _ => 3,
    }
}

/// Time window for scoring; older actions decay out.
const SCORE_WINDOW: Duration = Duration::minutes(5);

/// Consecutive actions closer than this get the rapid multiplier.
const RAPID_THRESHOLD: Duration = Duration::seconds(30);

/// Multiplier applied to the base score when actions come rapidly.
const RAPID_MULTIPLIER: f64 = 1.5;

/// Escalation sequences and their score bonuses.
const ESCALATION_PATTERNS: &[(&[&str], i64)] = &[
    // Restart followed by exec looks like a container-escape setup.
    (&["container_restart", "container_exec"], 20),
    (&["remove_peer", "remove_peer"], 15),
    (&["host_delete_file", "host_delete_file"], 15),
];

/// Thresholds for risk levels: low/medium/high/critical.
const RISK_THRESHOLDS: [(RiskLevel, i64); 4] = [
    (RiskLevel::Critical, 50),
    (RiskLevel::High, 25),
    (RiskLevel::Medium, 10),
    (RiskLevel::Low, 0),
];

/// Rolling multi-action risk scorer for one session.
pub struct SessionRiskTracker {
    session_id: String,
    history: Vec<(String, DateTime<Utc>)>,
}

impl SessionRiskTracker {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            history: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Record an action in the session history.
    pub fn add_action(&mut self, action_name: &str) {
        self.add_action_at(action_name, Utc::now());
    }

    /// Record an action with an explicit timestamp (test hook).
    pub fn add_action_at(&mut self, action_name: &str, at: DateTime<Utc>) {
        self.history.push((action_name.to_string(), at));
    }

    /// Compute the cumulative score and level for the session.
    ///
    /// 1. Drop entries older than the score window.
    /// 2. Sum per-action base scores.
    /// 3. Apply the rapid multiplier to the overage when two or more
    ///    consecutive gaps fall under the rapid threshold.
    /// 4. Add fixed bonuses for each escalation pattern match.
    /// 5. Map the total to a risk level.
    pub fn calculate_risk_score(&self) -> (i64, RiskLevel) {
        let cutoff = Utc::now() - SCORE_WINDOW;
        let recent: Vec<&(String, DateTime<Utc>)> =
            self.history.iter().filter(|(_, ts)| *ts >= cutoff).collect();

        if recent.is_empty() {
            return (0, RiskLevel::Low);
        }

        let base_score: i64 = recent.iter().map(|(name, _)| action_risk_score(name)).sum();

        let rapid_count = recent
            .windows(2)
            .filter(|pair| pair[1].1 - pair[0].1 < RAPID_THRESHOLD)
            .count();
        let frequency_bonus = if rapid_count >= 2 {
            (base_score as f64 * (RAPID_MULTIPLIER - 1.0)) as i64
        } else {
            0
        };

        let names: Vec<&str> = recent.iter().map(|(name, _)| name.as_str()).collect();
        let mut pattern_bonus = 0i64;
        for (sequence, bonus) in ESCALATION_PATTERNS {
            for window in names.windows(sequence.len()) {
                if window == *sequence {
                    pattern_bonus += bonus;
                }
            }
        }

        let total = base_score + frequency_bonus + pattern_bonus;
        let level = RISK_THRESHOLDS
            .iter()
            .find(|(_, threshold)| total >= *threshold)
            .map_or(RiskLevel::Low, |(level, _)| *level);

        (total, level)
    }

    /// Recent action names, most recent first.
    pub fn action_history(&self, limit: Option<usize>) -> Vec<&str> {
        let mut names: Vec<&str> = self.history.iter().rev().map(|(n, _)| n.as_str()).collect();
        if let Some(limit) = limit {
            names.truncate(limit);
        }
        names
    }
}
