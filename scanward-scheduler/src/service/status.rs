//! Status Reporter
//!
//! Job counts per state for operations, published on demand as a
//! `SCHEDULER_STATUS_UPDATE` event.

use chrono::Utc;
use scanward_core::domain::event::{EventPayload, MessageId};
use scanward_core::domain::job::JobState;
use scanward_core::domain::status::SchedulerStatusSnapshot;
use scanward_core::usecase::UseCaseId;
use std::sync::Arc;
use tracing::info;

use crate::repository::{JobStore, SchedulerConfigStore, StoreError};
use crate::service::events::EventBus;
use crate::service::tracker::LocalJobs;

pub struct StatusReporter {
    store: Arc<dyn JobStore>,
    settings: Arc<dyn SchedulerConfigStore>,
    events: Arc<EventBus>,
    local_jobs: Arc<LocalJobs>,
    instance_id: String,
}

impl StatusReporter {
    pub fn new(
        store: Arc<dyn JobStore>,
        settings: Arc<dyn SchedulerConfigStore>,
        events: Arc<EventBus>,
        local_jobs: Arc<LocalJobs>,
        instance_id: String,
    ) -> Self {
        Self {
            store,
            settings,
            events,
            local_jobs,
            instance_id,
        }
    }

    pub async fn snapshot(&self) -> Result<SchedulerStatusSnapshot, StoreError> {
        let mut all = 0;
        let mut counts = std::collections::HashMap::new();
        for state in JobState::ALL {
            let count = self.store.count_by_state(state).await?;
            all += count;
            counts.insert(state, count);
        }
        let count = |state: JobState| counts.get(&state).copied().unwrap_or_default();

        Ok(SchedulerStatusSnapshot {
            instance_id: self.instance_id.clone(),
            taken_at: Utc::now(),
            job_processing_enabled: self.settings.is_job_processing_enabled().await?,
            all,
            ready_to_start: count(JobState::ReadyToStart),
            queued: count(JobState::Queued),
            running: count(JobState::Running),
            suspended: count(JobState::Suspended),
            cancel_requested: count(JobState::CancelRequested),
            local_jobs: self.local_jobs.ids(),
        })
    }

    /// Takes a snapshot and publishes it
    pub async fn refresh(&self) -> Result<SchedulerStatusSnapshot, StoreError> {
        let snapshot = self.snapshot().await?;

        info!(
            use_case = %UseCaseId::AdminRefreshesSchedulerStatus,
            all = snapshot.all,
            running = snapshot.running,
            waiting = snapshot.waiting(),
            "Scheduler status refreshed"
        );
        self.events.publish(
            MessageId::SchedulerStatusUpdate,
            EventPayload::SchedulerStatus(snapshot.clone()),
        );

        Ok(snapshot)
    }

    pub async fn set_job_processing_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.settings.set_job_processing_enabled(enabled).await?;

        let (use_case, message_id) = if enabled {
            (
                UseCaseId::AdminEnablesJobProcessing,
                MessageId::SchedulerJobProcessingEnabled,
            )
        } else {
            (
                UseCaseId::AdminDisablesJobProcessing,
                MessageId::SchedulerJobProcessingDisabled,
            )
        };
        info!(use_case = %use_case, enabled, "Job processing toggled");
        self.events
            .publish(message_id, EventPayload::Processing { enabled });

        Ok(())
    }
}
