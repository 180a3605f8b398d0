//! CLI type definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden - Autonomous SRE Operator", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the monitor daemon
    #[command(subcommand)]
    Monitor(MonitorCommands),

    /// Run or drive the diagnosis agent
    #[command(subcommand)]
    Agent(AgentCommands),

    /// Ticket management commands
    #[command(subcommand)]
    Tickets(TicketCommands),

    /// Action lifecycle commands
    #[command(subcommand)]
    Actions(ActionCommands),

    /// Chaos evaluation commands
    #[command(subcommand)]
    Eval(EvalCommands),
}

#[derive(Subcommand)]
pub enum MonitorCommands {
    /// Run the monitor loop until interrupted
    Run {
        /// Subject to supervise
        #[arg(short, long)]
        subject: String,

        /// Seconds between check cycles
        #[arg(short, long)]
        interval: Option<f64>,
    },
}

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Run the agent loop until interrupted
    Start {
        /// Subject to supervise
        #[arg(short, long)]
        subject: String,

        /// Start in execute mode (default is observe-only)
        #[arg(long)]
        execute: bool,
    },

    /// Diagnose a single ticket and exit
    Diagnose {
        /// Ticket ID
        ticket_id: i64,

        /// Subject to gather context from
        #[arg(short, long)]
        subject: String,
    },
}

#[derive(Subcommand)]
pub enum TicketCommands {
    /// List tickets
    List {
        /// Filter by status (open, acknowledged, diagnosed, resolved)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show one ticket in full
    Show {
        ticket_id: i64,
    },

    /// Resolve a ticket (no-op when held)
    Resolve {
        ticket_id: i64,
    },

    /// Prevent a ticket from being auto-resolved
    Hold {
        ticket_id: i64,
    },

    /// Allow a ticket to be auto-resolved again
    Unhold {
        ticket_id: i64,
    },
}

#[derive(Subcommand)]
pub enum ActionCommands {
    /// List action proposals
    List {
        /// Filter by status (proposed, validated, executing, completed, failed, cancelled)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show one proposal with its execution records and audit trail
    Show {
        proposal_id: i64,
    },

    /// Approve a validated proposal
    Approve {
        proposal_id: i64,
    },

    /// Reject a validated proposal (cancels it)
    Reject {
        proposal_id: i64,

        /// Why the proposal is rejected
        #[arg(short, long, default_value = "")]
        reason: String,
    },

    /// Cancel a non-terminal proposal
    Cancel {
        proposal_id: i64,

        /// Why the proposal is cancelled
        #[arg(short, long, default_value = "cancelled by user")]
        reason: String,
    },

    /// Emergency stop: cancel all pending actions, force observe mode
    KillSwitch,

    /// Set the safety mode (switching to observe cancels pending actions)
    Mode {
        /// observe or execute
        mode: String,
    },
}

#[derive(Subcommand)]
pub enum EvalCommands {
    /// Run a single-subject campaign of N trials
    Run {
        /// Subject to test
        #[arg(short, long)]
        subject: String,

        /// Chaos type to inject
        #[arg(short, long)]
        chaos: String,

        /// Run without the agent (self-heal baseline)
        #[arg(long)]
        baseline: bool,

        /// Number of trials
        #[arg(short = 'n', long, default_value = "1")]
        trials: i64,
    },

    /// Run a campaign matrix from a YAML config
    Campaign {
        /// Path to the campaign config
        config: PathBuf,
    },

    /// Score a campaign
    Analyze {
        campaign_id: i64,
    },

    /// Compare two campaigns
    Compare {
        left_id: i64,
        right_id: i64,
    },

    /// Compare an agent campaign against its most recent baseline
    CompareBaseline {
        agent_campaign_id: i64,
    },

    /// Scorecards per variant for a subject and chaos type
    CompareVariants {
        subject: String,
        chaos: String,
    },

    /// Show a campaign, or a single trial with --trial
    Show {
        id: i64,

        /// Interpret the id as a trial id
        #[arg(long)]
        trial: bool,
    },

    /// List campaigns
    List,
}
