//! `warden tickets ...`

use anyhow::Result;

use crate::cli::commands::AppContext;
use crate::cli::output;
use crate::domain::models::ticket::TicketStatus;

pub async fn handle_list(ctx: &AppContext, status: Option<String>, json: bool) -> Result<()> {
    let status = match status.as_deref() {
        Some(raw) => Some(
            TicketStatus::from_str(raw)
                .ok_or_else(|| anyhow::anyhow!("unknown ticket status '{raw}'"))?,
        ),
        None => None,
    };

    let tickets = ctx.tickets().list(status).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tickets)?);
    } else {
        println!("{}", output::ticket_table(&tickets));
    }
    Ok(())
}

pub async fn handle_show(ctx: &AppContext, ticket_id: i64, json: bool) -> Result<()> {
    let ticket = ctx.tickets().get(ticket_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ticket)?);
    } else {
        output::print_ticket(&ticket);
    }
    Ok(())
}

pub async fn handle_resolve(ctx: &AppContext, ticket_id: i64) -> Result<()> {
    let tickets = ctx.tickets();
    tickets.resolve(ticket_id).await?;
    let ticket = tickets.get(ticket_id).await?;
    if ticket.status == TicketStatus::Resolved {
        println!("Ticket {ticket_id} resolved");
    } else {
        println!("Ticket {ticket_id} is held; unhold it first");
    }
    Ok(())
}

pub async fn handle_hold(ctx: &AppContext, ticket_id: i64) -> Result<()> {
    ctx.tickets().hold(ticket_id).await?;
    println!("Ticket {ticket_id} held (auto-resolve disabled)");
    Ok(())
}

pub async fn handle_unhold(ctx: &AppContext, ticket_id: i64) -> Result<()> {
    ctx.tickets().unhold(ticket_id).await?;
    println!("Ticket {ticket_id} unheld");
    Ok(())
}
