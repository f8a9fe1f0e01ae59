//! Auto cleanup
//!
//! Periodically removes finished jobs (and their uploads) older than the
//! configured retention.

use chrono::Utc;
use scanward_core::cleanup::{self, CleanupConfig};
use scanward_core::domain::event::{EventPayload, MessageId};
use scanward_core::usecase::UseCaseId;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::repository::{JobStore, StoreError};
use crate::service::events::EventBus;
use crate::service::uploads::UploadStore;

pub struct CleanupService {
    store: Arc<dyn JobStore>,
    uploads: UploadStore,
    events: Arc<EventBus>,
    config: Option<CleanupConfig>,
    interval: Duration,
}

impl CleanupService {
    pub fn new(
        store: Arc<dyn JobStore>,
        uploads: UploadStore,
        events: Arc<EventBus>,
        config: Option<CleanupConfig>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            uploads,
            events,
            config,
            interval,
        }
    }

    pub fn calculate_cleanup_time_in_days(&self) -> u64 {
        cleanup::calculate_cleanup_time_in_days(self.config.as_ref())
    }

    /// Runs one cleanup, returns the number of deleted jobs
    ///
    /// A retention of zero days disables cleanup, nothing is deleted.
    pub async fn cleanup_once(&self) -> Result<u64, StoreError> {
        let days = self.calculate_cleanup_time_in_days();
        if days == 0 {
            debug!("Auto cleanup disabled (retention 0 days)");
            return Ok(0);
        }

        let Some(older_than) = i64::try_from(days)
            .ok()
            .and_then(chrono::Duration::try_days)
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            debug!(days, "Retention reaches before the earliest date, nothing to clean up");
            return Ok(0);
        };
        let deleted = self.store.delete_older_than(older_than).await?;

        for job_id in &deleted {
            if let Err(err) = self.uploads.remove_job(*job_id).await {
                warn!(job_id = %job_id, error = %err, "Failed to remove uploads of deleted job");
            }
        }

        let count = deleted.len() as u64;
        info!(
            use_case = %UseCaseId::SystemAutoCleanup,
            days,
            deleted = count,
            "Auto cleanup executed"
        );
        self.events.publish(
            MessageId::AutoCleanupExecuted,
            EventPayload::Cleanup {
                older_than,
                deleted: count,
            },
        );

        Ok(count)
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = interval.tick() => {
                    if let Err(e) = self.cleanup_once().await {
                        error!("Auto cleanup failed: {}", e);
                    }
                }
            }
        }
    }
}
