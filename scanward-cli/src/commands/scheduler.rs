//! Scheduler command handlers
//!
//! Status inspection and the job processing switch.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use scanward_client::SchedulerClient;
use scanward_core::domain::status::SchedulerStatusSnapshot;

use super::print_json;
use crate::config::Config;

/// Scheduler subcommands
#[derive(Subcommand)]
pub enum SchedulerCommands {
    /// Show job counts and local jobs of the answering instance
    Status,
    /// Recompute the status and publish it to listeners
    Refresh,
    /// Enable job processing
    Enable,
    /// Disable job processing, running jobs continue
    Disable,
}

pub async fn handle_scheduler_command(command: SchedulerCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        SchedulerCommands::Status => {
            let status = client.scheduler_status().await?;
            show_status(&status, config.json)
        }
        SchedulerCommands::Refresh => {
            let status = client.refresh_status().await?;
            show_status(&status, config.json)
        }
        SchedulerCommands::Enable => set_processing(&client, true).await,
        SchedulerCommands::Disable => set_processing(&client, false).await,
    }
}

async fn set_processing(client: &SchedulerClient, enabled: bool) -> Result<()> {
    client.set_job_processing(enabled).await?;

    if enabled {
        println!("{} Job processing enabled", "✓".green());
    } else {
        println!("{} Job processing disabled", "✓".yellow());
    }
    Ok(())
}

fn show_status(status: &SchedulerStatusSnapshot, json: bool) -> Result<()> {
    if json {
        return print_json(status);
    }

    let processing = if status.job_processing_enabled {
        "enabled".green()
    } else {
        "disabled".red()
    };

    println!("{}", "Scheduler Status:".bold());
    println!("  Instance:          {}", status.instance_id.cyan());
    println!("  Processing:        {}", processing);
    println!(
        "  Taken at:          {}",
        status.taken_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!();
    println!("  All jobs:          {}", status.all);
    println!("  Ready to start:    {}", status.ready_to_start);
    println!("  Queued:            {}", status.queued);
    println!("  Running:           {}", status.running.to_string().cyan());
    println!("  Suspended:         {}", status.suspended);
    println!("  Cancel requested:  {}", status.cancel_requested);

    if !status.local_jobs.is_empty() {
        println!("\n{}", "Executed here:".bold());
        for id in &status.local_jobs {
            println!("  {} {}", "▸".cyan(), id.to_string().dimmed());
        }
    }

    Ok(())
}
