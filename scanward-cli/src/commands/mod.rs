//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;
mod scheduler;

pub use job::JobCommands;
pub use scheduler::SchedulerCommands;

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Scan job management
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Scheduler administration
    Scheduler {
        #[command(subcommand)]
        command: SchedulerCommands,
    },
}

/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Scheduler { command } => {
            scheduler::handle_scheduler_command(command, config).await
        }
    }
}

/// Prints a response as pretty JSON
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
