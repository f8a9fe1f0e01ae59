//! Scanward Scheduler
//!
//! Security scan orchestration engine. Accepts scan jobs, fans each job out
//! to the product delegates configured for its project, supervises the
//! remote jobs and aggregates their findings.
//!
//! Several instances can run against one PostgreSQL database; a version
//! checked claim decides which instance executes a job.

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;

pub use app::Scheduler;
pub use config::Config;
