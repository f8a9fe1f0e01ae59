//! Scanward CLI
//!
//! Command-line interface for submitting scan jobs and operating the
//! Scanward scheduler.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "scanward")]
#[command(about = "Scanward security scan CLI", long_about = None)]
struct Cli {
    /// Scheduler URL
    #[arg(
        long,
        env = "SCANWARD_SCHEDULER_URL",
        default_value = "http://localhost:8080"
    )]
    scheduler_url: String,

    /// Print raw JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        scheduler_url: cli.scheduler_url,
        json: cli.json,
    };

    handle_command(cli.command, &config).await
}
