//! Product executor domain types
//!
//! An executor is one configured scanner delegate (a product delegation server or a
//! vendor product reachable through one). Jobs fan out to one remote job per executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::job::ScanType;
use crate::domain::message::JobMessage;

/// Executor configuration
///
/// The `kind` discriminant selects the delegate client, `parameters` carry the
/// kind specific settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub id: Uuid,
    pub name: String,
    pub kind: ExecutorKind,
    pub scan_type: ScanType,
    /// Product identifier understood by the delegate server
    pub product_id: String,
    pub base_url: String,
    #[serde(default)]
    pub result_format: ResultFormat,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

impl ExecutorConfig {
    /// Checks that the configuration can be used for dispatch
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err(format!("Executor {} has no name", self.id));
        }

        if self.product_id.trim().is_empty() {
            return Err(format!("Executor '{}' has no product id", self.name));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!(
                "Executor '{}' base url must start with http:// or https://",
                self.name
            ));
        }

        Ok(())
    }
}

/// Kind of product executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorKind {
    Pds,
    Checkmarx,
    Nessus,
    Netsparker,
    OwaspZap,
    SecretValidator,
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorKind::Pds => write!(f, "PDS"),
            ExecutorKind::Checkmarx => write!(f, "CHECKMARX"),
            ExecutorKind::Nessus => write!(f, "NESSUS"),
            ExecutorKind::Netsparker => write!(f, "NETSPARKER"),
            ExecutorKind::OwaspZap => write!(f, "OWASP_ZAP"),
            ExecutorKind::SecretValidator => write!(f, "SECRET_VALIDATOR"),
        }
    }
}

/// Format of the raw result a delegate returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultFormat {
    #[default]
    Sarif,
    KeyValue,
    JsonFindings,
}

/// Execution state reported by a product delegate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DelegateState {
    Created,
    ReadyToStart,
    Queued,
    Running,
    CancelRequested,
    Canceled,
    Failed,
    Done,
}

impl DelegateState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            DelegateState::Canceled | DelegateState::Failed | DelegateState::Done
        )
    }
}

impl std::fmt::Display for DelegateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DelegateState::Created => "CREATED",
            DelegateState::ReadyToStart => "READY_TO_START",
            DelegateState::Queued => "QUEUED",
            DelegateState::Running => "RUNNING",
            DelegateState::CancelRequested => "CANCEL_REQUESTED",
            DelegateState::Canceled => "CANCELED",
            DelegateState::Failed => "FAILED",
            DelegateState::Done => "DONE",
        };
        f.write_str(text)
    }
}

/// One dispatched unit of work on a product delegate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorJobReference {
    pub remote_job_id: Uuid,
    pub executor_id: Uuid,
    pub executor_name: String,
    pub delegate_state: DelegateState,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub messages: Vec<JobMessage>,
}

impl ExecutorJobReference {
    pub fn new(executor: &ExecutorConfig, remote_job_id: Uuid) -> Self {
        Self {
            remote_job_id,
            executor_id: executor.id,
            executor_name: executor.name.clone(),
            delegate_state: DelegateState::ReadyToStart,
            last_polled_at: None,
            messages: Vec::new(),
        }
    }
}
