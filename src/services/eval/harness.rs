//! Trial and campaign runner.
//!
//! A trial drives one chaos experiment end to end: reset, wait for
//! health, snapshot, inject, wait for the operator to detect and
//! resolve (or for self-healing in baseline mode), snapshot again,
//! clean up, persist. Campaigns expand a matrix and run trials under a
//! concurrency bound; one trial failing never aborts the campaign.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ticket::TicketStatus;
use crate::domain::ports::subject::ChaosSubject;
use crate::infrastructure::database::eval_repo::NewTrial;
use crate::infrastructure::database::{AuditLogRepository, EvalRepository, TicketRepository};
use crate::services::eval::campaign::{expand_campaign_matrix, CampaignConfig};
use crate::services::eval::commands::extract_commands;

/// Shared stores the harness reads while a trial runs: the operator's
/// ticket store for detection/resolution timing and the audit log for
/// command extraction.
pub struct EvalDeps {
    pub tickets: TicketRepository,
    pub audit: AuditLogRepository,
}

/// How long to wait for the subject to become healthy after reset.
const RESET_HEALTH_TIMEOUT: Duration = Duration::from_secs(120);

/// How long to wait for detection and resolution (or self-heal).
const RESOLUTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Poll cadence while waiting on ticket state.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Run one trial and return the row to persist.
pub async fn run_trial(
    subject: Arc<dyn ChaosSubject>,
    chaos_type: &str,
    chaos_params: &Map<String, Value>,
    campaign_id: i64,
    baseline: bool,
    deps: &EvalDeps,
) -> DomainResult<NewTrial> {
    let started_at = Utc::now();

    info!(campaign_id, chaos_type, baseline, "trial starting: resetting subject");
    subject.reset().await?;

    if !subject.wait_healthy(RESET_HEALTH_TIMEOUT).await? {
        warn!("subject failed to become healthy before injection");
    }

    let initial_state = subject.capture_state().await?;

    info!(chaos_type, "injecting chaos");
    let chaos_injected_at = Utc::now();
    let chaos_metadata = subject.inject_chaos(chaos_type, chaos_params).await?;

    let mut ticket_created_at = None;
    let mut resolved_at = None;
    let mut commands_json = "[]".to_string();

    if baseline {
        // Baseline trials run without the agent: wait for self-healing.
        subject.wait_healthy(RESOLUTION_TIMEOUT).await?;
    } else {
        let (created, resolved) =
            wait_for_ticket_resolution(&deps.tickets, chaos_injected_at, RESOLUTION_TIMEOUT).await?;
        ticket_created_at = created;
        resolved_at = resolved;

        if ticket_created_at.is_some() {
            let events = deps.audit.list_between(started_at, Utc::now()).await?;
            let commands = extract_commands(&events);
            info!(count = commands.len(), "extracted agent commands");
            commands_json = serde_json::to_string(&commands)?;
        }
    }

    // Capture the "during chaos" state before reverting it.
    let final_state = subject.capture_state().await?;
    let ended_at = Utc::now();

    if let Err(err) = subject.cleanup_chaos(&chaos_metadata).await {
        // Expected for chaos types that destroy their own target.
        warn!(error = %err, "chaos cleanup failed (non-fatal)");
    }

    Ok(NewTrial {
        campaign_id,
        started_at,
        chaos_injected_at,
        ticket_created_at,
        resolved_at,
        ended_at,
        initial_state: serde_json::to_string(&initial_state)?,
        final_state: serde_json::to_string(&final_state)?,
        chaos_metadata: serde_json::to_string(&chaos_metadata)?,
        commands_json,
    })
}

/// Poll the shared ticket store for a ticket created after the chaos
/// injection, then for its resolution. Returns what it has at timeout.
async fn wait_for_ticket_resolution(
    tickets: &TicketRepository,
    after: DateTime<Utc>,
    timeout: Duration,
) -> DomainResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut created_at = None;

    loop {
        let all = tickets.list(None).await?;
        let candidate = all
            .iter()
            .filter(|t| t.created_at >= after)
            .min_by_key(|t| t.id);

        if let Some(ticket) = candidate {
            created_at = Some(ticket.created_at);
            if ticket.status == TicketStatus::Resolved {
                return Ok((created_at, ticket.resolved_at));
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Ok((created_at, None));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Run a simple single-subject campaign of N sequential trials.
pub async fn run_campaign(
    subject: Arc<dyn ChaosSubject>,
    subject_name: &str,
    chaos_type: &str,
    trial_count: i64,
    baseline: bool,
    eval: &EvalRepository,
    deps: &EvalDeps,
) -> DomainResult<i64> {
    let campaign = eval
        .insert_campaign(subject_name, chaos_type, trial_count, baseline, None)
        .await?;
    info!(campaign_id = campaign.id, "campaign started");

    for trial_num in 1..=trial_count {
        info!(trial_num, trial_count, "running trial");
        match run_trial(
            Arc::clone(&subject),
            chaos_type,
            &Map::new(),
            campaign.id,
            baseline,
            deps,
        )
        .await
        {
            Ok(new_trial) => {
                let trial = eval.insert_trial(new_trial).await?;
                info!(trial_id = trial.id, "trial completed");
            }
            Err(err) => {
                // Individual trial failure never aborts the campaign.
                error!(error = %err, trial_num, "trial failed");
            }
        }
    }

    info!(campaign_id = campaign.id, "campaign complete");
    Ok(campaign.id)
}

/// Run a YAML-configured campaign matrix with bounded concurrency and a
/// cooldown between trials.
pub async fn run_campaign_from_config<F>(
    config: &CampaignConfig,
    eval: &EvalRepository,
    deps: Arc<EvalDeps>,
    subject_factory: F,
) -> DomainResult<i64>
where
    F: Fn(&str) -> DomainResult<Arc<dyn ChaosSubject>>,
{
    let specs = expand_campaign_matrix(config);
    let total = specs.len();

    let campaign = eval
        .insert_campaign(
            &config.subjects.join(","),
            &config
                .chaos_types
                .iter()
                .map(|c| c.chaos_type.clone())
                .collect::<Vec<_>>()
                .join(","),
            i64::try_from(total).unwrap_or(0),
            config.include_baseline,
            config.variant.as_deref(),
        )
        .await?;
    info!(campaign_id = campaign.id, total, "campaign matrix started");

    let semaphore = Arc::new(Semaphore::new(config.parallel.max(1)));
    let mut handles = Vec::with_capacity(total);

    for (index, spec) in specs.into_iter().enumerate() {
        let subject = subject_factory(&spec.subject)?;
        let semaphore = Arc::clone(&semaphore);
        let deps = Arc::clone(&deps);
        let campaign_id = campaign.id;
        let cooldown = config.cooldown_seconds;

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(|e| {
                DomainError::ExecutionFailed(format!("semaphore closed: {e}"))
            })?;
            info!(trial = index + 1, total, subject = %spec.subject, chaos = %spec.chaos_type, "trial starting");
            let result = run_trial(
                subject,
                &spec.chaos_type,
                &spec.chaos_params,
                campaign_id,
                spec.baseline,
                &deps,
            )
            .await;
            if cooldown > 0 {
                tokio::time::sleep(Duration::from_secs(cooldown)).await;
            }
            result
        }));
    }

    let mut completed = 0usize;
    let mut failed = 0usize;
    for handle in futures::future::join_all(handles).await {
        match handle {
            Ok(Ok(new_trial)) => {
                eval.insert_trial(new_trial).await?;
                completed += 1;
            }
            Ok(Err(err)) => {
                error!(error = %err, "trial failed");
                failed += 1;
            }
            Err(join_err) => {
                error!(error = %join_err, "trial task panicked");
                failed += 1;
            }
        }
    }

    info!(campaign_id = campaign.id, completed, failed, "campaign matrix complete");
    Ok(campaign.id)
}
