//! Warden CLI entry point.

use clap::Parser;
use std::process::ExitCode;

use warden::cli::commands::{actions, agent, eval, monitor, tickets, AppContext};
use warden::cli::{ActionCommands, Cli, Commands, EvalCommands, TicketCommands};
use warden::cli::types::{AgentCommands, MonitorCommands};
use warden::domain::DomainError;
use warden::infrastructure::config::ConfigLoader;
use warden::infrastructure::logging::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            // Typed not-found failures exit 2; everything else exits 1.
            let not_found = err
                .downcast_ref::<DomainError>()
                .is_some_and(DomainError::is_not_found);
            if not_found {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load()?;
    init_logging(&config.logging);

    let ctx = AppContext::open(config).await?;

    match cli.command {
        Commands::Monitor(MonitorCommands::Run { subject, interval }) => {
            monitor::handle_run(&ctx, &subject, interval).await
        }
        Commands::Agent(agent_cmd) => match agent_cmd {
            AgentCommands::Start { subject, execute } => {
                agent::handle_start(&ctx, &subject, execute).await
            }
            AgentCommands::Diagnose { ticket_id, subject } => {
                agent::handle_diagnose(&ctx, ticket_id, &subject).await
            }
        },
        Commands::Tickets(ticket_cmd) => match ticket_cmd {
            TicketCommands::List { status } => tickets::handle_list(&ctx, status, cli.json).await,
            TicketCommands::Show { ticket_id } => {
                tickets::handle_show(&ctx, ticket_id, cli.json).await
            }
            TicketCommands::Resolve { ticket_id } => tickets::handle_resolve(&ctx, ticket_id).await,
            TicketCommands::Hold { ticket_id } => tickets::handle_hold(&ctx, ticket_id).await,
            TicketCommands::Unhold { ticket_id } => tickets::handle_unhold(&ctx, ticket_id).await,
        },
        Commands::Actions(action_cmd) => match action_cmd {
            ActionCommands::List { status } => actions::handle_list(&ctx, status, cli.json).await,
            ActionCommands::Show { proposal_id } => {
                actions::handle_show(&ctx, proposal_id, cli.json).await
            }
            ActionCommands::Approve { proposal_id } => {
                actions::handle_approve(&ctx, proposal_id).await
            }
            ActionCommands::Reject { proposal_id, reason } => {
                actions::handle_reject(&ctx, proposal_id, &reason).await
            }
            ActionCommands::Cancel { proposal_id, reason } => {
                actions::handle_cancel(&ctx, proposal_id, &reason).await
            }
            ActionCommands::KillSwitch => actions::handle_kill_switch(&ctx).await,
            ActionCommands::Mode { mode } => actions::handle_mode(&ctx, &mode).await,
        },
        Commands::Eval(eval_cmd) => match eval_cmd {
            EvalCommands::Run {
                subject,
                chaos,
                baseline,
                trials,
            } => eval::handle_run(&ctx, &subject, &chaos, baseline, trials).await,
            EvalCommands::Campaign { config } => eval::handle_campaign(&ctx, &config).await,
            EvalCommands::Analyze { campaign_id } => {
                eval::handle_analyze(&ctx, campaign_id, cli.json).await
            }
            EvalCommands::Compare { left_id, right_id } => {
                eval::handle_compare(&ctx, left_id, right_id).await
            }
            EvalCommands::CompareBaseline { agent_campaign_id } => {
                eval::handle_compare_baseline(&ctx, agent_campaign_id).await
            }
            EvalCommands::CompareVariants { subject, chaos } => {
                eval::handle_compare_variants(&ctx, &subject, &chaos).await
            }
            EvalCommands::Show { id, trial } => eval::handle_show(&ctx, id, trial, cli.json).await,
            EvalCommands::List => eval::handle_list(&ctx, cli.json).await,
        },
    }
}
