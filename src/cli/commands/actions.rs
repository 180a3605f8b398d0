//! `warden actions ...`

use anyhow::Result;

use crate::cli::commands::AppContext;
use crate::cli::output;
use crate::domain::models::action::ActionStatus;
use crate::services::safety::SafetyMode;

pub async fn handle_list(ctx: &AppContext, status: Option<String>, json: bool) -> Result<()> {
    let status = match status.as_deref() {
        Some(raw) => Some(
            ActionStatus::from_str(raw)
                .ok_or_else(|| anyhow::anyhow!("unknown action status '{raw}'"))?,
        ),
        None => None,
    };

    let proposals = ctx.actions().list_proposals(status).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&proposals)?);
    } else {
        println!("{}", output::proposal_table(&proposals));
    }
    Ok(())
}

pub async fn handle_show(ctx: &AppContext, proposal_id: i64, json: bool) -> Result<()> {
    let actions = ctx.actions();
    let proposal = actions.get_proposal(proposal_id).await?;
    let records = actions.records_for_proposal(proposal_id).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "proposal": proposal,
                "records": records,
            }))?
        );
    } else {
        output::print_proposal(&proposal, &records);
    }
    Ok(())
}

pub async fn handle_approve(ctx: &AppContext, proposal_id: i64) -> Result<()> {
    ctx.actions().approve_proposal(proposal_id, "user").await?;
    println!("Proposal {proposal_id} approved");
    Ok(())
}

pub async fn handle_reject(ctx: &AppContext, proposal_id: i64, reason: &str) -> Result<()> {
    ctx.actions().reject_proposal(proposal_id, "user", reason).await?;
    ctx.auditor().log_cancelled(proposal_id, reason).await?;
    println!("Proposal {proposal_id} rejected");
    Ok(())
}

pub async fn handle_cancel(ctx: &AppContext, proposal_id: i64, reason: &str) -> Result<()> {
    let actions = ctx.actions();
    let proposal = actions.get_proposal(proposal_id).await?;
    if proposal.status.is_terminal() {
        anyhow::bail!(
            "proposal {proposal_id} is already {}",
            proposal.status.as_str()
        );
    }
    actions.update_status(proposal_id, ActionStatus::Cancelled).await?;
    ctx.auditor().log_cancelled(proposal_id, reason).await?;
    println!("Proposal {proposal_id} cancelled");
    Ok(())
}

pub async fn handle_kill_switch(ctx: &AppContext) -> Result<()> {
    // The kill switch acts on durable state (pending proposals, managed
    // containers); daemons observe the sweep through the action store.
    let safety = ctx.safety(SafetyMode::Execute);
    let auditor = ctx.auditor();
    let report = safety.kill_switch(&auditor).await?;
    println!(
        "Kill switch: cancelled {} proposal(s), killed {} container(s), aborted {} task(s); mode is observe",
        report.pending_proposals, report.docker_containers, report.tasks_cancelled
    );
    Ok(())
}

pub async fn handle_mode(ctx: &AppContext, mode: &str) -> Result<()> {
    let mode = SafetyMode::from_str(mode)
        .ok_or_else(|| anyhow::anyhow!("mode must be 'observe' or 'execute'"))?;

    match mode {
        SafetyMode::Observe => {
            // Durable part of the switch: sweep pending proposals and audit.
            let safety = ctx.safety(SafetyMode::Execute);
            safety.set_mode(SafetyMode::Observe, &ctx.auditor()).await?;
            println!("Safety mode set to observe; pending proposals cancelled");
        }
        SafetyMode::Execute => {
            let safety = ctx.safety(SafetyMode::Observe);
            safety.set_mode(SafetyMode::Execute, &ctx.auditor()).await?;
            println!(
                "Safety mode change audited. Start daemons with --execute to run in execute mode."
            );
        }
    }
    Ok(())
}
