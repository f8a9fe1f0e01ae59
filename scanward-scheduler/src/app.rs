//! Application wiring
//!
//! Builds every scheduler component from a configuration and the chosen
//! stores, and runs the background loops.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{self, AppState};
use crate::config::Config;
use crate::repository::{JobStore, SchedulerConfigStore};
use crate::service::{
    CancellationCoordinator, CleanupService, DelegateRegistry, Dispatcher, EventBus, JobRunner,
    JobService, JobStateMachine, LocalJobs, ProfileResolver, StatusReporter, SystemMonitor,
    UploadStore,
};

/// A fully wired scheduler instance
pub struct Scheduler {
    pub config: Config,
    pub events: Arc<EventBus>,
    pub jobs: Arc<JobService>,
    pub dispatcher: Arc<Dispatcher>,
    pub coordinator: Arc<CancellationCoordinator>,
    pub status: Arc<StatusReporter>,
    pub cleanup: Arc<CleanupService>,
    pub local_jobs: Arc<LocalJobs>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn build(
        config: Config,
        store: Arc<dyn JobStore>,
        settings: Arc<dyn SchedulerConfigStore>,
        profiles: Arc<dyn ProfileResolver>,
        delegates: DelegateRegistry,
        monitor: Arc<dyn SystemMonitor>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let events = Arc::new(EventBus::default());
        let local_jobs = Arc::new(LocalJobs::new());
        let uploads = UploadStore::new(config.upload_dir.clone());
        let machine = Arc::new(JobStateMachine::new(Arc::clone(&store), Arc::clone(&events)));

        let runner = Arc::new(JobRunner::new(
            &config,
            Arc::clone(&machine),
            Arc::clone(&profiles),
            delegates.clone(),
            uploads.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            &config,
            Arc::clone(&machine),
            Arc::clone(&settings),
            runner,
            Arc::clone(&local_jobs),
            monitor,
            shutdown.clone(),
        ));
        let coordinator = Arc::new(CancellationCoordinator::new(
            &config,
            Arc::clone(&machine),
            Arc::clone(&events),
            Arc::clone(&profiles),
            delegates,
            Arc::clone(&local_jobs),
            shutdown.clone(),
        ));
        let status = Arc::new(StatusReporter::new(
            Arc::clone(&store),
            settings,
            Arc::clone(&events),
            Arc::clone(&local_jobs),
            config.instance_id.clone(),
        ));
        let cleanup = Arc::new(CleanupService::new(
            store,
            uploads.clone(),
            Arc::clone(&events),
            config.cleanup.clone(),
            config.cleanup_interval,
        ));
        let jobs = Arc::new(JobService::new(Arc::clone(&machine), profiles, uploads));

        Self {
            config,
            events,
            jobs,
            dispatcher,
            coordinator,
            status,
            cleanup,
            local_jobs,
            shutdown,
        }
    }

    pub fn router(&self) -> axum::Router {
        api::create_router(AppState {
            jobs: Arc::clone(&self.jobs),
            coordinator: Arc::clone(&self.coordinator),
            status: Arc::clone(&self.status),
        })
    }

    /// Spawns the dispatcher, the system checks and auto cleanup
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let coordinator = Arc::clone(&self.coordinator);
        let cleanup = Arc::clone(&self.cleanup);
        let shutdown = self.shutdown.clone();

        vec![
            tokio::spawn(async move { dispatcher.run().await }),
            tokio::spawn(async move { coordinator.run_periodic_checks().await }),
            tokio::spawn(async move { cleanup.run(shutdown).await }),
        ]
    }

    /// Serves the API until `signal` resolves or the server fails
    ///
    /// Local jobs are suspended on every exit path, a failing listener
    /// included.
    pub async fn serve<F>(&self, listener: TcpListener, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let coordinator = Arc::clone(&self.coordinator);
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                signal.await;
                let suspended = coordinator.shutdown().await;
                tracing::info!("Suspended {} job(s) on shutdown", suspended);
            })
            .await;

        if !self.is_terminating() {
            if let Err(e) = &served {
                tracing::error!("Server failed, suspending local jobs: {}", e);
            }
            self.shutdown().await;
        }

        served
    }

    /// Suspends local jobs and stops the background loops
    pub async fn shutdown(&self) {
        let suspended = self.coordinator.shutdown().await;
        tracing::info!("Suspended {} job(s) on shutdown", suspended);
    }

    pub fn is_terminating(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.config.shutdown_grace
    }
}
