//! Configuration module
//!
//! Handles CLI configuration including the scheduler URL.

use scanward_client::SchedulerClient;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the scheduler service
    pub scheduler_url: String,
    /// Print raw JSON responses
    pub json: bool,
}

impl Config {
    pub fn client(&self) -> SchedulerClient {
        SchedulerClient::new(&self.scheduler_url)
    }
}
