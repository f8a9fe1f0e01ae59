//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::executor::ExecutorJobReference;
use crate::domain::finding::ScanResult;
use crate::domain::message::JobMessage;

/// Scan job record
///
/// Structure shared between scheduler (persists, dispatches) and the admin API.
/// Mutated only through the scheduler's state machine; every write bumps `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub project_id: String,
    pub owner: String,
    pub state: JobState,
    /// Optimistic concurrency counter
    pub version: i64,
    pub configuration: JobConfiguration,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    pub suspend_count: u32,
    pub suspended_at: Option<DateTime<Utc>>,
    /// Scheduler instance currently executing the job
    pub executed_by: Option<String>,
    /// File names uploaded for this job
    pub uploads: Vec<String>,
    pub executor_jobs: Vec<ExecutorJobReference>,
    pub messages: Vec<JobMessage>,
    pub result: Option<ScanResult>,
}

impl Job {
    /// Creates a new job in state `Created`
    pub fn new(
        project_id: impl Into<String>,
        owner: impl Into<String>,
        configuration: JobConfiguration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.into(),
            owner: owner.into(),
            state: JobState::Created,
            version: 0,
            configuration,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            cancel_requested: false,
            cancel_requested_at: None,
            suspend_count: 0,
            suspended_at: None,
            executed_by: None,
            uploads: Vec::new(),
            executor_jobs: Vec::new(),
            messages: Vec::new(),
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Finds the executor job reference started for the given executor
    pub fn executor_job(&self, executor_id: Uuid) -> Option<&ExecutorJobReference> {
        self.executor_jobs
            .iter()
            .find(|reference| reference.executor_id == executor_id)
    }
}

/// What the job shall scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfiguration {
    pub scan_types: Vec<ScanType>,
    /// Target URL for web scans
    #[serde(default)]
    pub web_target: Option<String>,
    /// Passed through to every product delegate
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Kind of scan a job requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanType {
    CodeScan,
    WebScan,
    InfraScan,
    LicenseScan,
    SecretScan,
}

impl std::fmt::Display for ScanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanType::CodeScan => write!(f, "codeScan"),
            ScanType::WebScan => write!(f, "webScan"),
            ScanType::InfraScan => write!(f, "infraScan"),
            ScanType::LicenseScan => write!(f, "licenseScan"),
            ScanType::SecretScan => write!(f, "secretScan"),
        }
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    ReadyToStart,
    Queued,
    Running,
    CancelRequested,
    Canceled,
    Suspended,
    Failed,
    Done,
}

impl JobState {
    pub const ALL: [JobState; 9] = [
        JobState::Created,
        JobState::ReadyToStart,
        JobState::Queued,
        JobState::Running,
        JobState::CancelRequested,
        JobState::Canceled,
        JobState::Suspended,
        JobState::Failed,
        JobState::Done,
    ];

    /// Returns true for `Canceled`, `Failed` and `Done`
    pub const fn is_terminal(self) -> bool {
        matches!(self, JobState::Canceled | JobState::Failed | JobState::Done)
    }

    /// Returns true when `next` is an allowed edge from this state
    ///
    /// Every non-terminal state may fail. All other edges are listed explicitly.
    pub const fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Created, ReadyToStart)
            | (ReadyToStart, Queued)
            | (Queued, Running)
            | (Running, CancelRequested)
            | (CancelRequested, Canceled)
            | (Running, Suspended)
            | (Suspended, Queued)
            | (Running, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            JobState::Created => "CREATED",
            JobState::ReadyToStart => "READY_TO_START",
            JobState::Queued => "QUEUED",
            JobState::Running => "RUNNING",
            JobState::CancelRequested => "CANCEL_REQUESTED",
            JobState::Canceled => "CANCELED",
            JobState::Suspended => "SUSPENDED",
            JobState::Failed => "FAILED",
            JobState::Done => "DONE",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown job state: {0}")]
pub struct UnknownJobState(pub String);

impl FromStr for JobState {
    type Err = UnknownJobState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownJobState(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Canceled.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Done.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Suspended.is_terminal());
    }

    #[test]
    fn test_happy_path_edges() {
        let path = [
            JobState::Created,
            JobState::ReadyToStart,
            JobState::Queued,
            JobState::Running,
            JobState::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
    }

    #[test]
    fn test_cancel_must_pass_cancel_requested() {
        assert!(!JobState::Running.can_transition_to(JobState::Canceled));
        assert!(JobState::Running.can_transition_to(JobState::CancelRequested));
        assert!(JobState::CancelRequested.can_transition_to(JobState::Canceled));
    }

    #[test]
    fn test_suspend_resume_edges() {
        assert!(JobState::Running.can_transition_to(JobState::Suspended));
        assert!(JobState::Suspended.can_transition_to(JobState::Queued));
        assert!(!JobState::Suspended.can_transition_to(JobState::Running));
    }

    #[test]
    fn test_any_non_terminal_may_fail() {
        for state in JobState::ALL {
            assert_eq!(
                state.can_transition_to(JobState::Failed),
                !state.is_terminal(),
                "{state}"
            );
        }
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for from in JobState::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in JobState::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_state_string_round_trip() {
        for state in JobState::ALL {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("RUNNING_FAST".parse::<JobState>().is_err());
    }

    #[test]
    fn test_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&JobState::CancelRequested).unwrap();
        assert_eq!(json, "\"CANCEL_REQUESTED\"");
    }

    #[test]
    fn test_new_job_is_created() {
        let job = Job::new("alpha", "alice", JobConfiguration::default());
        assert_eq!(job.state, JobState::Created);
        assert_eq!(job.version, 0);
        assert!(job.executor_jobs.is_empty());
    }
}
