//! Command-line interface: clap types, command handlers, and output.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{ActionCommands, Cli, Commands, EvalCommands, TicketCommands};
