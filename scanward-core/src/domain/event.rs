//! Domain event types
//!
//! Events are published fire-and-forget by the scheduler after state changes and
//! consumed by status and notification collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::JobState;
use crate::domain::status::SchedulerStatusSnapshot;

/// Identifies the kind of a domain message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageId {
    JobStateChanged,
    JobCancelRequested,
    JobRestartTriggered,
    JobRestartCanceled,
    SchedulerStatusUpdate,
    SchedulerJobProcessingEnabled,
    SchedulerJobProcessingDisabled,
    AutoCleanupExecuted,
}

/// Payload carried by a domain message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    JobState {
        job_id: Uuid,
        project_id: String,
        from: JobState,
        to: JobState,
    },
    JobRestart {
        job_id: Uuid,
        hard: bool,
        info: Option<String>,
    },
    SchedulerStatus(SchedulerStatusSnapshot),
    Processing {
        enabled: bool,
    },
    Cleanup {
        older_than: DateTime<Utc>,
        deleted: u64,
    },
}

/// Message published on the domain event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMessage {
    pub message_id: MessageId,
    /// Sequence number assigned by the publishing bus
    pub sequence: u64,
    pub occurred_at: DateTime<Utc>,
    pub payload: EventPayload,
}
