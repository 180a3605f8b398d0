//! Terminal output helpers.

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Table};

use crate::domain::models::action::{ActionProposal, ActionRecord};
use crate::domain::models::eval::{Campaign, CampaignSummary};
use crate::domain::models::ticket::Ticket;

pub fn ticket_table(tickets: &[Ticket]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        "ID", "Status", "Invariant", "Entity", "Severity", "Count", "Held", "First Seen",
    ]);
    for ticket in tickets {
        table.add_row(vec![
            Cell::new(ticket.id),
            Cell::new(ticket.status.as_str()),
            Cell::new(&ticket.invariant_name),
            Cell::new(ticket.entity_id.as_deref().unwrap_or("-")),
            Cell::new(ticket.severity.as_str()),
            Cell::new(ticket.occurrence_count),
            Cell::new(if ticket.held { "yes" } else { "no" }),
            Cell::new(ticket.first_seen_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    table
}

pub fn proposal_table(proposals: &[ActionProposal]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        "ID", "Status", "Action", "Type", "Ticket", "Approved", "Retries", "Proposed At",
    ]);
    for proposal in proposals {
        table.add_row(vec![
            Cell::new(proposal.id),
            Cell::new(proposal.status.as_str()),
            Cell::new(&proposal.action_name),
            Cell::new(proposal.action_type.as_str()),
            Cell::new(
                proposal
                    .ticket_id
                    .map_or_else(|| "-".to_string(), |id| id.to_string()),
            ),
            Cell::new(if proposal.is_approved() { "yes" } else { "no" }),
            Cell::new(format!("{}/{}", proposal.retry_count, proposal.max_retries)),
            Cell::new(proposal.proposed_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    table
}

pub fn campaign_table(campaigns: &[Campaign]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        "ID", "Subject", "Chaos", "Trials", "Baseline", "Variant", "Created",
    ]);
    for campaign in campaigns {
        table.add_row(vec![
            Cell::new(campaign.id),
            Cell::new(&campaign.subject_name),
            Cell::new(&campaign.chaos_type),
            Cell::new(campaign.trial_count),
            Cell::new(if campaign.baseline { "yes" } else { "no" }),
            Cell::new(campaign.variant_name.as_deref().unwrap_or("-")),
            Cell::new(campaign.created_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    table
}

pub fn print_ticket(ticket: &Ticket) {
    println!("Ticket #{}", ticket.id);
    println!("  Status:      {}", ticket.status.as_str());
    println!("  Invariant:   {}", ticket.invariant_name);
    if let Some(entity) = &ticket.entity_id {
        println!("  Entity:      {entity}");
    }
    println!("  Severity:    {}", ticket.severity.as_str());
    println!("  Message:     {}", ticket.message);
    println!("  Occurrences: {}", ticket.occurrence_count);
    println!("  Held:        {}", if ticket.held { "yes" } else { "no" });
    println!("  First seen:  {}", ticket.first_seen_at.to_rfc3339());
    println!("  Last seen:   {}", ticket.last_seen_at.to_rfc3339());
    if let Some(resolved) = ticket.resolved_at {
        println!("  Resolved:    {}", resolved.to_rfc3339());
    }
    if let Some(diagnosis) = &ticket.diagnosis {
        println!("\n{diagnosis}");
    }
}

pub fn print_proposal(proposal: &ActionProposal, records: &[ActionRecord]) {
    println!("Proposal #{}", proposal.id);
    println!("  Status:    {}", proposal.status.as_str());
    println!("  Action:    {} ({})", proposal.action_name, proposal.action_type.as_str());
    println!(
        "  Params:    {}",
        serde_json::to_string(&proposal.parameters).unwrap_or_default()
    );
    println!("  Reason:    {}", proposal.reason);
    println!("  Requester: {} ({})", proposal.requester_id, proposal.requester_type.as_str());
    if let Some(agent_id) = &proposal.agent_id {
        println!("  Agent:     {agent_id}");
    }
    if let Some(ticket_id) = proposal.ticket_id {
        println!("  Ticket:    {ticket_id}");
    }
    if let Some(workflow_id) = proposal.workflow_id {
        println!("  Workflow:  {workflow_id} (order {})", proposal.execution_order);
    }
    if let Some(scheduled) = proposal.scheduled_at {
        println!("  Scheduled: {}", scheduled.to_rfc3339());
    }
    if proposal.is_approved() {
        println!(
            "  Approved:  {} by {}",
            proposal.approved_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            proposal.approved_by.as_deref().unwrap_or("?")
        );
    }
    if let Some(reason) = &proposal.rejection_reason {
        println!("  Rejected:  {reason}");
    }
    if proposal.retry_count > 0 {
        println!(
            "  Retries:   {}/{} (last error: {})",
            proposal.retry_count,
            proposal.max_retries,
            proposal.last_error.as_deref().unwrap_or("-")
        );
    }

    if !records.is_empty() {
        println!("\nExecution records:");
        for record in records {
            let outcome = match record.success {
                Some(true) => "success",
                Some(false) => "failure",
                None => "running",
            };
            println!(
                "  #{} {} started={} completed={}{}",
                record.id,
                outcome,
                record
                    .started_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
                record
                    .completed_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
                record
                    .error_message
                    .as_deref()
                    .map(|e| format!(" error={e}"))
                    .unwrap_or_default()
            );
        }
    }
}

pub fn print_summary(summary: &CampaignSummary) {
    println!("Campaign #{} ({} / {})", summary.campaign_id, summary.subject_name, summary.chaos_type);
    println!("  Trials:        {}", summary.trial_count);
    println!(
        "  Outcomes:      {} success, {} failure, {} timeout",
        summary.success_count, summary.failure_count, summary.timeout_count
    );
    println!("  Win rate:      {:.1}%", summary.win_rate * 100.0);
    match summary.avg_time_to_detect_sec {
        Some(avg) => println!("  Avg detect:    {avg:.1}s"),
        None => println!("  Avg detect:    -"),
    }
    match summary.avg_time_to_resolve_sec {
        Some(avg) => println!("  Avg resolve:   {avg:.1}s"),
        None => println!("  Avg resolve:   -"),
    }
    println!(
        "  Commands:      {} total, {} unique, {} destructive",
        summary.total_commands, summary.total_unique_commands, summary.total_destructive_commands
    );
    println!("  Thrashing:     {} trial(s)", summary.thrashing_trials);
}
