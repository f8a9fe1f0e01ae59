//! Scheduler configuration
//!
//! Defines all configurable parameters of a scheduler instance: trigger
//! timing, concurrency limits, delegate timeouts, cancel and resume windows,
//! auto cleanup and the location of profile and upload data.

use scanward_core::cleanup::CleanupConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Scheduler configuration
///
/// All timeouts and intervals are configurable to allow tuning for different
/// deployment scenarios (single dev instance vs. cluster).
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string, in-memory store when absent
    pub database_url: Option<String>,

    /// Address the HTTP API binds to
    pub bind_addr: String,

    /// Unique identifier for this scheduler instance
    pub instance_id: String,

    /// Delay before the first trigger run
    pub trigger_initial_delay: Duration,

    /// Delay between trigger runs
    pub trigger_delay: Duration,

    /// Maximum jobs fetched per trigger run
    pub batch_size: usize,

    /// Max jobs this instance executes in parallel
    pub max_parallel_jobs: usize,

    /// How often a lost claim is retried
    pub claim_retries: u32,

    /// Upper bound of the random wait between claim retries
    pub claim_max_wait: Duration,

    /// Skip trigger cycles while the host is overloaded
    pub health_check_enabled: bool,

    /// One minute load average per processor at which triggering stops
    pub max_cpu_load: f64,

    /// Memory usage in percent at which triggering stops
    pub max_memory_percent: f64,

    /// Interval between delegate status polls
    pub poll_interval: Duration,

    /// Maximum time a job may wait for its delegates
    pub poll_timeout: Duration,

    /// Time delegates get to confirm a cancel request
    pub cancel_timeout: Duration,

    /// Minimum time a job stays suspended before it is requeued
    pub resume_min_suspend: Duration,

    /// Interval of the resume and orphaned cancel checks
    pub system_check_interval: Duration,

    /// Time granted to background tasks after shutdown was requested
    pub shutdown_grace: Duration,

    /// JSON document with execution profiles and project settings
    pub profiles_file: Option<PathBuf>,

    /// Directory for uploaded job data
    pub upload_dir: PathBuf,

    /// Auto cleanup retention, default retention when absent
    pub cleanup: Option<CleanupConfig>,

    /// Interval between auto cleanup runs
    pub cleanup_interval: Duration,

    pub delegate_connect_timeout: Duration,

    pub delegate_request_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(instance_id: String) -> Self {
        Self {
            database_url: None,
            bind_addr: "0.0.0.0:8080".to_string(),
            instance_id,
            trigger_initial_delay: Duration::from_millis(5_000),
            trigger_delay: Duration::from_millis(10_000),
            batch_size: 10,
            max_parallel_jobs: 5,
            claim_retries: 5,
            claim_max_wait: Duration::from_millis(300),
            health_check_enabled: true,
            max_cpu_load: 2.0,
            max_memory_percent: 90.0,
            poll_interval: Duration::from_millis(2_000),
            poll_timeout: Duration::from_secs(3_600),
            cancel_timeout: Duration::from_secs(60),
            resume_min_suspend: Duration::from_secs(10),
            system_check_interval: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
            profiles_file: None,
            upload_dir: std::env::temp_dir().join("scanward-uploads"),
            cleanup: None,
            cleanup_interval: Duration::from_secs(3_600),
            delegate_connect_timeout: Duration::from_secs(10),
            delegate_request_timeout: Duration::from_secs(60),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - DATABASE_URL
    /// - SCHEDULER_BIND_ADDR (default: 0.0.0.0:8080)
    /// - SCHEDULER_INSTANCE_ID (default: random UUID)
    /// - SCHEDULER_TRIGGER_INITIAL_DELAY_MS (5000), SCHEDULER_TRIGGER_DELAY_MS (10000)
    /// - SCHEDULER_BATCH_SIZE (10), SCHEDULER_MAX_PARALLEL_JOBS (5)
    /// - SCHEDULER_CLAIM_RETRIES (5), SCHEDULER_CLAIM_MAX_WAIT_MS (300)
    /// - SCHEDULER_HEALTHCHECK_ENABLED (true), SCHEDULER_HEALTHCHECK_MAX_CPU_LOAD (2.0),
    ///   SCHEDULER_HEALTHCHECK_MAX_MEMORY_PERCENT (90)
    /// - SCHEDULER_POLL_INTERVAL_MS (2000), SCHEDULER_POLL_TIMEOUT_SECS (3600)
    /// - SCHEDULER_CANCEL_TIMEOUT_SECS (60)
    /// - SCHEDULER_RESUME_MIN_SUSPEND_SECS (10), SCHEDULER_SYSTEM_CHECK_INTERVAL_SECS (30)
    /// - SCHEDULER_SHUTDOWN_GRACE_SECS (10)
    /// - SCHEDULER_PROFILES_FILE, SCHEDULER_UPLOAD_DIR
    /// - SCHEDULER_CLEANUP_AMOUNT and SCHEDULER_CLEANUP_UNIT, SCHEDULER_CLEANUP_INTERVAL_SECS (3600)
    /// - DELEGATE_CONNECT_TIMEOUT_SECS (10), DELEGATE_REQUEST_TIMEOUT_SECS (60)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::new(
            std::env::var("SCHEDULER_INSTANCE_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
        );

        let cleanup = match (
            std::env::var("SCHEDULER_CLEANUP_AMOUNT").ok(),
            std::env::var("SCHEDULER_CLEANUP_UNIT").ok(),
        ) {
            (Some(amount), unit) => {
                let amount = parse_value("SCHEDULER_CLEANUP_AMOUNT", &amount)?;
                let unit = unit.unwrap_or_else(|| "days".to_string());
                let config = CleanupConfig::new(amount, &unit).map_err(|_| ConfigError::InvalidValue {
                    name: "SCHEDULER_CLEANUP_UNIT",
                    value: unit,
                })?;
                Some(config)
            }
            (None, _) => None,
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            bind_addr: std::env::var("SCHEDULER_BIND_ADDR").unwrap_or(defaults.bind_addr),
            instance_id: defaults.instance_id,
            trigger_initial_delay: env_millis("SCHEDULER_TRIGGER_INITIAL_DELAY_MS", defaults.trigger_initial_delay)?,
            trigger_delay: env_millis("SCHEDULER_TRIGGER_DELAY_MS", defaults.trigger_delay)?,
            batch_size: env_parse("SCHEDULER_BATCH_SIZE", defaults.batch_size)?,
            max_parallel_jobs: env_parse("SCHEDULER_MAX_PARALLEL_JOBS", defaults.max_parallel_jobs)?,
            claim_retries: env_parse("SCHEDULER_CLAIM_RETRIES", defaults.claim_retries)?,
            claim_max_wait: env_millis("SCHEDULER_CLAIM_MAX_WAIT_MS", defaults.claim_max_wait)?,
            health_check_enabled: env_parse("SCHEDULER_HEALTHCHECK_ENABLED", defaults.health_check_enabled)?,
            max_cpu_load: env_parse("SCHEDULER_HEALTHCHECK_MAX_CPU_LOAD", defaults.max_cpu_load)?,
            max_memory_percent: env_parse(
                "SCHEDULER_HEALTHCHECK_MAX_MEMORY_PERCENT",
                defaults.max_memory_percent,
            )?,
            poll_interval: env_millis("SCHEDULER_POLL_INTERVAL_MS", defaults.poll_interval)?,
            poll_timeout: env_secs("SCHEDULER_POLL_TIMEOUT_SECS", defaults.poll_timeout)?,
            cancel_timeout: env_secs("SCHEDULER_CANCEL_TIMEOUT_SECS", defaults.cancel_timeout)?,
            resume_min_suspend: env_secs("SCHEDULER_RESUME_MIN_SUSPEND_SECS", defaults.resume_min_suspend)?,
            system_check_interval: env_secs(
                "SCHEDULER_SYSTEM_CHECK_INTERVAL_SECS",
                defaults.system_check_interval,
            )?,
            shutdown_grace: env_secs("SCHEDULER_SHUTDOWN_GRACE_SECS", defaults.shutdown_grace)?,
            profiles_file: std::env::var("SCHEDULER_PROFILES_FILE").ok().map(PathBuf::from),
            upload_dir: std::env::var("SCHEDULER_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            cleanup,
            cleanup_interval: env_secs("SCHEDULER_CLEANUP_INTERVAL_SECS", defaults.cleanup_interval)?,
            delegate_connect_timeout: env_secs(
                "DELEGATE_CONNECT_TIMEOUT_SECS",
                defaults.delegate_connect_timeout,
            )?,
            delegate_request_timeout: env_secs(
                "DELEGATE_REQUEST_TIMEOUT_SECS",
                defaults.delegate_request_timeout,
            )?,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_id.trim().is_empty() {
            return Err(ConfigError::Invalid("instance_id cannot be empty".into()));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be greater than 0".into()));
        }

        if self.max_parallel_jobs == 0 {
            return Err(ConfigError::Invalid(
                "max_parallel_jobs must be greater than 0".into(),
            ));
        }

        if self.claim_max_wait <= Duration::from_millis(10) {
            return Err(ConfigError::Invalid(
                "claim_max_wait must be greater than 10ms".into(),
            ));
        }

        let memory_in_range = self.max_memory_percent > 0.0 && self.max_memory_percent <= 100.0;
        if self.max_cpu_load <= 0.0 || !memory_in_range {
            return Err(ConfigError::Invalid(
                "max_cpu_load must be positive and max_memory_percent within (0, 100]".into(),
            ));
        }

        if self.trigger_delay.is_zero() || self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "trigger_delay and poll_interval must be greater than 0".into(),
            ));
        }

        if self.poll_timeout < self.poll_interval {
            return Err(ConfigError::Invalid(
                "poll_timeout must not be shorter than poll_interval".into(),
            ));
        }

        if self.system_check_interval.is_zero() || self.cleanup_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "system_check_interval and cleanup_interval must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

fn parse_value<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn env_parse<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => parse_value(name, &value),
        Err(_) => Ok(default),
    }
}

fn env_millis(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(value) => parse_value(name, &value).map(Duration::from_millis),
        Err(_) => Ok(default),
    }
}

fn env_secs(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(value) => parse_value(name, &value).map(Duration::from_secs),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.trigger_initial_delay, Duration::from_millis(5_000));
        assert_eq!(config.trigger_delay, Duration::from_millis(10_000));
        assert_eq!(config.claim_retries, 5);
        assert_eq!(config.max_parallel_jobs, 5);
        assert!(config.health_check_enabled);
        assert!(config.database_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.instance_id = String::new();
        assert!(config.validate().is_err());
        config.instance_id = "node-1".to_string();

        config.max_parallel_jobs = 0;
        assert!(config.validate().is_err());
        config.max_parallel_jobs = 1;

        config.claim_max_wait = Duration::from_millis(5);
        assert!(config.validate().is_err());
        config.claim_max_wait = Duration::from_millis(300);

        config.poll_timeout = Duration::from_millis(1);
        assert!(config.validate().is_err());
        config.poll_timeout = Duration::from_secs(60);

        config.max_memory_percent = 120.0;
        assert!(config.validate().is_err());
        config.max_memory_percent = 90.0;

        config.max_cpu_load = 0.0;
        assert!(config.validate().is_err());
        config.max_cpu_load = 2.0;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_value_reports_variable() {
        let err = parse_value::<u64>("SCHEDULER_BATCH_SIZE", "ten").unwrap_err();
        assert!(err.to_string().contains("SCHEDULER_BATCH_SIZE"));
    }
}
