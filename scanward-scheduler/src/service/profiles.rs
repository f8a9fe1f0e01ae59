//! Execution Profile Resolver
//!
//! Resolves which executors serve a project's scan type and which web
//! targets a project may scan. Profiles are loaded once from a JSON document.

use scanward_core::domain::executor::ExecutorConfig;
use scanward_core::domain::job::ScanType;
use scanward_core::domain::profile::{ExecutionProfile, ProjectSettings};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Profile error type
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Failed to read profiles: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse profiles: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid executor configuration: {0}")]
    InvalidExecutor(String),
}

/// Resolves executors and project settings
pub trait ProfileResolver: Send + Sync {
    /// Enabled executors for the project and scan type, in profile order
    fn resolve_executors_for(
        &self,
        project_id: &str,
        scan_type: ScanType,
    ) -> Result<Vec<ExecutorConfig>, ProfileError>;

    /// URIs the project may target with web scans
    fn whitelist_for(&self, project_id: &str) -> Vec<String>;

    fn executor_by_id(&self, executor_id: Uuid) -> Option<ExecutorConfig>;
}

/// Document layout of the profiles file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileDocument {
    #[serde(default)]
    pub profiles: Vec<ExecutionProfile>,
    #[serde(default)]
    pub projects: Vec<ProjectSettings>,
}

/// Resolver over a fixed set of profiles
#[derive(Debug, Clone, Default)]
pub struct StaticProfileResolver {
    document: ProfileDocument,
}

impl StaticProfileResolver {
    pub fn new(document: ProfileDocument) -> Self {
        Self { document }
    }

    /// Resolver without profiles, every dispatch fails with a configuration error
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let content = std::fs::read_to_string(path)?;
        let document: ProfileDocument = serde_json::from_str(&content)?;

        tracing::info!(
            path = %path.display(),
            profiles = document.profiles.len(),
            projects = document.projects.len(),
            "Execution profiles loaded"
        );

        Ok(Self::new(document))
    }
}

impl ProfileResolver for StaticProfileResolver {
    fn resolve_executors_for(
        &self,
        project_id: &str,
        scan_type: ScanType,
    ) -> Result<Vec<ExecutorConfig>, ProfileError> {
        let mut resolved: Vec<ExecutorConfig> = Vec::new();

        let candidates = self
            .document
            .profiles
            .iter()
            .filter(|profile| profile.applies_to(project_id))
            .flat_map(|profile| profile.executors.iter())
            .filter(|executor| executor.enabled && executor.scan_type == scan_type);

        for executor in candidates {
            if resolved.iter().any(|known| known.id == executor.id) {
                continue;
            }
            executor.validate().map_err(ProfileError::InvalidExecutor)?;
            resolved.push(executor.clone());
        }

        Ok(resolved)
    }

    fn whitelist_for(&self, project_id: &str) -> Vec<String> {
        self.document
            .projects
            .iter()
            .find(|project| project.id == project_id)
            .map(|project| project.whitelist.clone())
            .unwrap_or_default()
    }

    fn executor_by_id(&self, executor_id: Uuid) -> Option<ExecutorConfig> {
        self.document
            .profiles
            .iter()
            .flat_map(|profile| profile.executors.iter())
            .find(|executor| executor.id == executor_id)
            .cloned()
    }
}
