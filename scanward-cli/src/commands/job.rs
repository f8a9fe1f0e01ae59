//! Job command handlers
//!
//! Handles job submission, inspection, cancellation and restarts.

use anyhow::{Context, Result, anyhow};
use clap::Subcommand;
use colored::*;
use scanward_client::SchedulerClient;
use scanward_core::domain::finding::Severity;
use scanward_core::domain::job::{JobConfiguration, JobState};
use scanward_core::domain::message::{JobMessage, MessageLevel};
use scanward_core::dto::job::{CreateJobRequest, JobDto};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::print_json;
use crate::config::Config;
use crate::id_resolver::resolve_job_id;
use crate::types::{IdOrPrefix, ScanTypeArg};

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Create a scan job
    Create {
        /// Project the job belongs to
        #[arg(short, long)]
        project: String,

        /// Job owner
        #[arg(long, env = "USER")]
        owner: String,

        /// Scan types to run (repeatable)
        #[arg(short = 't', long = "scan-type", value_enum, required = true)]
        scan_types: Vec<ScanTypeArg>,

        /// Target URL for web scans
        #[arg(long)]
        web_target: Option<String>,

        /// Parameters passed to the delegates (KEY=VALUE)
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Files to upload after creation
        #[arg(short, long = "upload")]
        uploads: Vec<PathBuf>,

        /// Mark the job ready once created and uploaded
        #[arg(long)]
        ready: bool,
    },
    /// Upload a data file for a created job
    Upload {
        /// Job ID or unambiguous prefix
        id: String,

        /// File to upload
        file: PathBuf,

        /// Name to store the file under, defaults to the file name
        #[arg(long)]
        name: Option<String>,
    },
    /// Mark a created job ready to start
    Ready {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Get job details
    Get {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// List jobs
    List {
        /// Only jobs in this state (e.g. RUNNING)
        #[arg(short, long, value_parser = parse_state)]
        state: Option<JobState>,
    },
    /// Request cancellation of a running job
    Cancel {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Restart a running or suspended job
    Restart {
        /// Job ID or unambiguous prefix
        id: String,

        /// Discard existing executor jobs and start them again
        #[arg(long)]
        hard: bool,
    },
}

/// Routes job subcommands to their respective handlers.
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        JobCommands::Create {
            project,
            owner,
            scan_types,
            web_target,
            params,
            uploads,
            ready,
        } => {
            let req = CreateJobRequest {
                project_id: project,
                owner,
                configuration: JobConfiguration {
                    scan_types: scan_types.into_iter().map(Into::into).collect(),
                    web_target,
                    parameters: params.into_iter().collect::<BTreeMap<_, _>>(),
                },
            };
            create_job(&client, req, &uploads, ready, config.json).await
        }
        JobCommands::Upload { id, file, name } => {
            let job_id = resolve_job_id(&client, &IdOrPrefix::parse(&id)).await?;
            let name = upload_file(&client, job_id, &file, name).await?;
            println!("{} Uploaded {} to job {}", "✓".green(), name.cyan(), job_id);
            Ok(())
        }
        JobCommands::Ready { id } => {
            let job_id = resolve_job_id(&client, &IdOrPrefix::parse(&id)).await?;
            let job = client.mark_ready(job_id).await?;
            show_job(&job, config.json)
        }
        JobCommands::Get { id } => {
            let job_id = resolve_job_id(&client, &IdOrPrefix::parse(&id)).await?;
            let job = client.get_job(job_id).await?;
            show_job(&job, config.json)
        }
        JobCommands::List { state } => list_jobs(&client, state, config.json).await,
        JobCommands::Cancel { id } => {
            let job_id = resolve_job_id(&client, &IdOrPrefix::parse(&id)).await?;
            let job = client.cancel_job(job_id).await?;
            println!("{} Cancel requested for job {}", "✓".green(), job.id);
            Ok(())
        }
        JobCommands::Restart { id, hard } => {
            let job_id = resolve_job_id(&client, &IdOrPrefix::parse(&id)).await?;
            let job = client.restart_job(job_id, hard).await?;
            let kind = if hard { "Hard restart" } else { "Restart" };
            println!(
                "{} {} triggered, job {} is {}",
                "✓".green(),
                kind,
                job.id,
                colorize_state(job.state)
            );
            Ok(())
        }
    }
}

async fn create_job(
    client: &SchedulerClient,
    req: CreateJobRequest,
    uploads: &[PathBuf],
    ready: bool,
    json: bool,
) -> Result<()> {
    let mut job = client.create_job(req).await?;
    if !json {
        println!("{} Created job {}", "✓".green(), job.id.to_string().cyan());
    }

    for path in uploads {
        let name = upload_file(client, job.id, path, None).await?;
        if !json {
            println!("  {} uploaded {}", "▸".cyan(), name);
        }
    }

    if ready {
        job = client.mark_ready(job.id).await?;
    }

    if json {
        print_json(&job)
    } else {
        println!("  State: {}", colorize_state(job.state));
        Ok(())
    }
}

async fn upload_file(
    client: &SchedulerClient,
    job_id: uuid::Uuid,
    path: &Path,
    name: Option<String>,
) -> Result<String> {
    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Cannot derive a file name from {}", path.display()))?,
    };
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    client.upload(job_id, &name, data).await?;
    Ok(name)
}

async fn list_jobs(client: &SchedulerClient, state: Option<JobState>, json: bool) -> Result<()> {
    let jobs = client.list_jobs(state).await?;

    if json {
        return print_json(&jobs);
    }

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        for job in jobs {
            print_job_summary(&job);
        }
    }

    Ok(())
}

fn show_job(job: &JobDto, json: bool) -> Result<()> {
    if json {
        print_json(job)
    } else {
        print_job_details(job);
        Ok(())
    }
}

fn print_job_summary(job: &JobDto) {
    println!("  {} Job {}", "▸".cyan(), job.id.to_string().dimmed());
    println!("    Project: {}", job.project_id);
    println!("    State:   {}", colorize_state(job.state));
    println!(
        "    Created: {}",
        job.created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if let Some(instance) = &job.executed_by {
        println!("    On:      {}", instance.dimmed());
    }
    println!();
}

fn print_job_details(job: &JobDto) {
    println!("{}", "Job Details:".bold());
    println!("  ID:          {}", job.id.to_string().cyan());
    println!("  Project:     {}", job.project_id);
    println!("  Owner:       {}", job.owner);
    println!("  State:       {}", colorize_state(job.state));
    let scan_types: Vec<String> = job
        .configuration
        .scan_types
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("  Scan types:  {}", scan_types.join(", "));
    if let Some(target) = &job.configuration.web_target {
        println!("  Web target:  {}", target);
    }
    println!(
        "  Created:     {}",
        job.created_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(started) = job.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(ended) = job.ended_at {
        println!("  Ended:       {}", ended.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = job.started_at {
            let duration = ended.signed_duration_since(started);
            println!("  Duration:    {}s", duration.num_seconds());
        }
    }

    if let Some(instance) = &job.executed_by {
        println!("  Executed by: {}", instance);
    }
    if job.suspend_count > 0 {
        println!("  Suspended:   {} time(s)", job.suspend_count);
    }
    if !job.uploads.is_empty() {
        println!("  Uploads:     {}", job.uploads.join(", "));
    }

    if !job.executor_jobs.is_empty() {
        println!("\n{}", "Executors:".bold());
        for reference in &job.executor_jobs {
            println!(
                "  {} {} {} ({})",
                "▸".cyan(),
                reference.executor_name,
                reference.remote_job_id.to_string().dimmed(),
                reference.delegate_state
            );
        }
    }

    if let Some(result) = &job.result {
        println!("\n{}", "Result:".bold());
        println!(
            "  {} finding(s) from {} executor(s)",
            result.findings.len(),
            result.imported_executors
        );
        for severity in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ] {
            let count = result.count(severity);
            if count > 0 {
                println!("  {:<10} {}", severity.as_str(), count);
            }
        }
    }

    if !job.messages.is_empty() {
        println!("\n{}", "Messages:".bold());
        println!("{}", "─".repeat(80).dimmed());
        for message in &job.messages {
            print_message(message);
        }
        println!("{}", "─".repeat(80).dimmed());
    }
}

fn print_message(message: &JobMessage) {
    let level = match message.level {
        MessageLevel::Info => "INFO".cyan(),
        MessageLevel::Warning => "WARNING".yellow(),
        MessageLevel::Error => "ERROR".red(),
    };

    println!(
        "{} [{}] {}",
        message.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level,
        message.text
    );
}

/// Colorize job state for display
fn colorize_state(state: JobState) -> ColoredString {
    let text = state.as_str();
    match state {
        JobState::Created | JobState::ReadyToStart | JobState::Queued => text.yellow(),
        JobState::Running | JobState::CancelRequested => text.cyan(),
        JobState::Suspended => text.magenta(),
        JobState::Done => text.green(),
        JobState::Failed => text.red(),
        JobState::Canceled => text.dimmed(),
    }
}

fn parse_state(value: &str) -> Result<JobState, String> {
    value
        .trim()
        .to_uppercase()
        .replace('-', "_")
        .parse()
        .map_err(|err: scanward_core::domain::job::UnknownJobState| err.to_string())
}

fn parse_key_val(value: &str) -> Result<(String, String), String> {
    let (key, val) = value
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' in '{}'", value))?;
    if key.trim().is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{}'", value));
    }
    Ok((key.trim().to_string(), val.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_is_lenient() {
        assert_eq!(parse_state("running").unwrap(), JobState::Running);
        assert_eq!(parse_state("ready-to-start").unwrap(), JobState::ReadyToStart);
        assert!(parse_state("sleeping").is_err());
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("depth=3").unwrap(),
            ("depth".to_string(), "3".to_string())
        );
        assert_eq!(
            parse_key_val("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("depth").is_err());
        assert!(parse_key_val("=3").is_err());
    }
}
