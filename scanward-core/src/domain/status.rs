//! Scheduler status domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate job counts for operational visibility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatusSnapshot {
    pub instance_id: String,
    pub taken_at: DateTime<Utc>,
    pub job_processing_enabled: bool,
    pub all: u64,
    pub ready_to_start: u64,
    pub queued: u64,
    pub running: u64,
    pub suspended: u64,
    pub cancel_requested: u64,
    /// Jobs executed by the reporting instance right now
    pub local_jobs: Vec<Uuid>,
}

impl SchedulerStatusSnapshot {
    /// Jobs waiting to be picked up (ready to start plus queued)
    pub fn waiting(&self) -> u64 {
        self.ready_to_start + self.queued
    }
}
