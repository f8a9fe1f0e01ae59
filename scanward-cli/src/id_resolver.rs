//! ID resolver module
//!
//! Resolves job id prefixes to full UUIDs by listing jobs from the scheduler,
//! so users can type short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result, anyhow};
use scanward_client::SchedulerClient;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a job ID or prefix to a full UUID
///
/// # Errors
/// Returns an error if:
/// - No job matches the prefix
/// - Multiple jobs match the prefix (ambiguous)
/// - API call fails
pub async fn resolve_job_id(client: &SchedulerClient, id_or_prefix: &IdOrPrefix) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let jobs = client
        .list_jobs(None)
        .await
        .context("Failed to fetch jobs for ID resolution")?;

    let matches: Vec<Uuid> = jobs
        .iter()
        .map(|job| job.id)
        .filter(|id| id_or_prefix.matches(*id))
        .collect();

    pick_single(id_or_prefix, &matches)
}

fn pick_single(id_or_prefix: &IdOrPrefix, matches: &[Uuid]) -> Result<Uuid> {
    match matches {
        [] => Err(anyhow!("No job found with ID starting with '{}'", id_or_prefix)),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple jobs: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_single() {
        let id = Uuid::new_v4();
        let prefix = IdOrPrefix::parse("abc");

        assert_eq!(pick_single(&prefix, &[id]).unwrap(), id);
        assert!(pick_single(&prefix, &[]).is_err());

        let err = pick_single(&prefix, &[id, Uuid::new_v4()]).unwrap_err();
        assert!(err.to_string().contains("Ambiguous"));
    }
}
