//! `warden eval ...`

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::cli::commands::AppContext;
use crate::cli::output;
use crate::infrastructure::database::{DatabaseConnection, EvalRepository};
use crate::services::eval::campaign::CampaignConfig;
use crate::services::eval::harness::{run_campaign, run_campaign_from_config, EvalDeps};
use crate::services::eval::scoring::{analyze_campaign, compare_campaigns};
use crate::subjects;

/// Open (and migrate) the eval database, which lives in its own file.
async fn open_eval_db(ctx: &AppContext) -> Result<EvalRepository> {
    if let Some(parent) = Path::new(&ctx.config.database.eval_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = DatabaseConnection::new(&format!("sqlite:{}", ctx.config.database.eval_path))
        .await
        .context("Failed to connect to eval database")?;
    db.migrate().await.context("Failed to migrate eval database")?;
    Ok(EvalRepository::new(db.pool().clone()))
}

fn deps(ctx: &AppContext) -> EvalDeps {
    EvalDeps {
        tickets: ctx.tickets(),
        audit: ctx.audit(),
    }
}

pub async fn handle_run(
    ctx: &AppContext,
    subject_name: &str,
    chaos: &str,
    baseline: bool,
    trials: i64,
) -> Result<()> {
    let subject = subjects::build_chaos_subject(subject_name)?;
    if !subject.chaos_types().iter().any(|t| t == chaos) {
        bail!(
            "subject '{subject_name}' does not support chaos '{chaos}' (available: {})",
            subject.chaos_types().join(", ")
        );
    }

    let eval = open_eval_db(ctx).await?;
    let campaign_id = run_campaign(
        subject,
        subject_name,
        chaos,
        trials,
        baseline,
        &eval,
        &deps(ctx),
    )
    .await?;

    let summary = analyze_campaign(&eval, campaign_id, subjects::health_predicate(subject_name)?).await?;
    output::print_summary(&summary);
    Ok(())
}

pub async fn handle_campaign(ctx: &AppContext, config_path: &Path) -> Result<()> {
    let config = CampaignConfig::load(config_path)?;
    let eval = open_eval_db(ctx).await?;
    let campaign_id = run_campaign_from_config(
        &config,
        &eval,
        Arc::new(deps(ctx)),
        subjects::build_chaos_subject,
    )
    .await?;
    println!("Campaign {campaign_id} complete; analyze with: warden eval analyze {campaign_id}");
    Ok(())
}

pub async fn handle_analyze(ctx: &AppContext, campaign_id: i64, json: bool) -> Result<()> {
    let eval = open_eval_db(ctx).await?;
    let campaign = eval.get_campaign(campaign_id).await?;
    let healthy = subjects::health_predicate(primary_subject(&campaign.subject_name))?;
    let summary = analyze_campaign(&eval, campaign_id, healthy).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        output::print_summary(&summary);
    }
    Ok(())
}

pub async fn handle_compare(ctx: &AppContext, left_id: i64, right_id: i64) -> Result<()> {
    let eval = open_eval_db(ctx).await?;
    let left_campaign = eval.get_campaign(left_id).await?;
    let right_campaign = eval.get_campaign(right_id).await?;

    let left = analyze_campaign(
        &eval,
        left_id,
        subjects::health_predicate(primary_subject(&left_campaign.subject_name))?,
    )
    .await?;
    let right = analyze_campaign(
        &eval,
        right_id,
        subjects::health_predicate(primary_subject(&right_campaign.subject_name))?,
    )
    .await?;

    print_comparison(&compare_campaigns(left, right));
    Ok(())
}

/// Compare an agent campaign against the most recent baseline campaign
/// for the same subject and chaos type.
pub async fn handle_compare_baseline(ctx: &AppContext, agent_campaign_id: i64) -> Result<()> {
    let eval = open_eval_db(ctx).await?;
    let agent_campaign = eval.get_campaign(agent_campaign_id).await?;
    if agent_campaign.baseline {
        bail!("campaign {agent_campaign_id} is itself a baseline campaign");
    }

    let baseline = eval
        .list_campaigns()
        .await?
        .into_iter()
        .find(|c| {
            c.baseline
                && c.subject_name == agent_campaign.subject_name
                && c.chaos_type == agent_campaign.chaos_type
        })
        .with_context(|| {
            format!(
                "no baseline campaign found for {}/{}",
                agent_campaign.subject_name, agent_campaign.chaos_type
            )
        })?;

    let healthy = subjects::health_predicate(primary_subject(&agent_campaign.subject_name))?;
    let left = analyze_campaign(&eval, agent_campaign_id, healthy).await?;
    let right = analyze_campaign(&eval, baseline.id, healthy).await?;

    println!("Agent campaign {} vs baseline campaign {}", left.campaign_id, right.campaign_id);
    print_comparison(&compare_campaigns(left, right));
    Ok(())
}

/// Scorecards per variant for one subject and chaos type.
pub async fn handle_compare_variants(ctx: &AppContext, subject: &str, chaos: &str) -> Result<()> {
    let eval = open_eval_db(ctx).await?;
    let healthy = subjects::health_predicate(subject)?;

    let campaigns: Vec<_> = eval
        .list_campaigns()
        .await?
        .into_iter()
        .filter(|c| {
            !c.baseline && c.subject_name.contains(subject) && c.chaos_type.contains(chaos)
        })
        .collect();
    if campaigns.is_empty() {
        bail!("no campaigns found for {subject}/{chaos}");
    }

    for campaign in campaigns {
        let variant = campaign.variant_name.clone().unwrap_or_else(|| "default".to_string());
        let summary = analyze_campaign(&eval, campaign.id, healthy).await?;
        println!("\n=== variant: {variant} ===");
        output::print_summary(&summary);
    }
    Ok(())
}

pub async fn handle_show(ctx: &AppContext, id: i64, trial: bool, json: bool) -> Result<()> {
    let eval = open_eval_db(ctx).await?;
    if trial {
        let trial = eval.get_trial(id).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&trial)?);
        } else {
            println!("Trial #{} (campaign {})", trial.id, trial.campaign_id);
            println!("  Started:        {}", trial.started_at.to_rfc3339());
            println!("  Chaos injected: {}", trial.chaos_injected_at.to_rfc3339());
            match trial.ticket_created_at {
                Some(t) => println!("  Ticket created: {}", t.to_rfc3339()),
                None => println!("  Ticket created: -"),
            }
            match trial.resolved_at {
                Some(t) => println!("  Resolved:       {}", t.to_rfc3339()),
                None => println!("  Resolved:       -"),
            }
            println!("  Ended:          {}", trial.ended_at.to_rfc3339());
            println!("  Chaos metadata: {}", trial.chaos_metadata);
            println!("  Commands:       {}", trial.commands_json);
        }
    } else {
        let campaign = eval.get_campaign(id).await?;
        let trials = eval.trials_for_campaign(id).await?;
        if json {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "campaign": campaign,
                    "trials": trials,
                }))?
            );
        } else {
            println!("{}", output::campaign_table(std::slice::from_ref(&campaign)));
            println!("{} trial(s)", trials.len());
        }
    }
    Ok(())
}

pub async fn handle_list(ctx: &AppContext, json: bool) -> Result<()> {
    let eval = open_eval_db(ctx).await?;
    let campaigns = eval.list_campaigns().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&campaigns)?);
    } else {
        println!("{}", output::campaign_table(&campaigns));
    }
    Ok(())
}

/// Matrix campaigns store a comma-joined subject list; score with the
/// first subject's predicate.
fn primary_subject(subject_name: &str) -> &str {
    subject_name.split(',').next().unwrap_or(subject_name)
}

fn print_comparison(comparison: &crate::services::eval::scoring::CampaignComparison) {
    output::print_summary(&comparison.left);
    println!();
    output::print_summary(&comparison.right);
    println!();
    println!(
        "Win rate delta:    {:+.1}%",
        comparison.win_rate_delta * 100.0
    );
    match comparison.detect_delta_sec {
        Some(delta) => println!("Detect delta:      {delta:+.1}s"),
        None => println!("Detect delta:      -"),
    }
    match comparison.resolve_delta_sec {
        Some(delta) => println!("Resolve delta:     {delta:+.1}s"),
        None => println!("Resolve delta:     -"),
    }
}
