//! Service Module
//!
//! Business logic layer of the scheduler. Services orchestrate between the
//! stores, the product delegates and the domain event bus.

pub mod aggregator;
pub mod cleanup;
pub mod coordinator;
pub mod delegates;
pub mod dispatcher;
pub mod events;
pub mod execution;
pub mod health;
pub mod importer;
pub mod job;
pub mod profiles;
pub mod state_machine;
pub mod status;
pub mod tracker;
pub mod uploads;

// Re-export for convenience
pub use aggregator::{AggregationOutcome, ExecutorOutput, ResultAggregator};
pub use cleanup::CleanupService;
pub use coordinator::CancellationCoordinator;
pub use delegates::DelegateRegistry;
pub use dispatcher::Dispatcher;
pub use events::EventBus;
pub use execution::{DispatchError, JobRunner};
pub use health::{HealthCheck, SysinfoMonitor, SystemLoad, SystemMonitor};
pub use job::{JobError, JobService};
pub use profiles::{ProfileError, ProfileResolver, StaticProfileResolver};
pub use state_machine::{JobStateMachine, TransitionError};
pub use status::StatusReporter;
pub use tracker::LocalJobs;
pub use uploads::UploadStore;
