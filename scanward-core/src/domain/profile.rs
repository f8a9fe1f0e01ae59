//! Execution profile domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::executor::ExecutorConfig;

/// Named set of executor configurations assigned to projects
///
/// Executor order inside a profile is the start order used for dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub executors: Vec<ExecutorConfig>,
    #[serde(default)]
    pub project_ids: BTreeSet<String>,
}

fn default_enabled() -> bool {
    true
}

impl ExecutionProfile {
    /// Returns true when the profile is enabled and assigned to the project
    pub fn applies_to(&self, project_id: &str) -> bool {
        self.enabled && self.project_ids.contains(project_id)
    }
}

/// Project settings kept next to the profiles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub id: String,
    #[serde(default)]
    pub whitelist: Vec<String>,
}
