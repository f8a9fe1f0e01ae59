//! Retry policy for delegate calls
//!
//! Every failure is classified afresh by [`ResiliencePolicy::decide`], so a
//! timeout, a refused connection, a 5xx and a 4xx each get their own retry
//! behaviour. [`ResilientExecutor`] runs an action and applies the decisions.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Outcome of consulting the policy about one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub delay_ms: u64,
    /// Total attempts allowed for this failure class
    pub max_attempts: u32,
}

impl RetryDecision {
    pub const fn give_up() -> Self {
        Self {
            retry: false,
            delay_ms: 0,
            max_attempts: 1,
        }
    }

    const fn retry_after(delay_ms: u64, max_attempts: u32, attempt: u32) -> Self {
        Self {
            retry: attempt < max_attempts,
            delay_ms,
            max_attempts,
        }
    }
}

/// Retry budget of a single failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryRule {
    pub delay_ms: u64,
    pub max_attempts: u32,
}

impl RetryRule {
    pub const fn new(delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            delay_ms,
            max_attempts,
        }
    }
}

/// Per failure class retry rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResiliencePolicy {
    pub timeout: RetryRule,
    pub connection: RetryRule,
    pub server_error: RetryRule,
    pub too_many_requests: RetryRule,
}

impl Default for ResiliencePolicy {
    fn default() -> Self {
        Self {
            timeout: RetryRule::new(500, 3),
            connection: RetryRule::new(1_000, 5),
            server_error: RetryRule::new(2_000, 3),
            too_many_requests: RetryRule::new(5_000, 3),
        }
    }
}

impl ResiliencePolicy {
    /// Decides what to do after the `attempt`-th failed attempt (1 based)
    ///
    /// Client errors other than 429, parse failures and local I/O failures are
    /// never retried.
    pub fn decide(&self, error: &ClientError, attempt: u32) -> RetryDecision {
        let rule = match error {
            ClientError::Timeout(_) => self.timeout,
            ClientError::Connection(_) => self.connection,
            ClientError::ApiError { status: 429, .. } => self.too_many_requests,
            ClientError::ApiError { status, .. } if *status >= 500 => self.server_error,
            _ => return RetryDecision::give_up(),
        };

        RetryDecision::retry_after(rule.delay_ms, rule.max_attempts, attempt)
    }

    /// Like [`decide`](Self::decide), for calls that must not run twice
    ///
    /// After a timeout the remote side may already have acted on the request,
    /// so it is not repeated.
    pub fn decide_non_idempotent(&self, error: &ClientError, attempt: u32) -> RetryDecision {
        match error {
            ClientError::Timeout(_) => RetryDecision::give_up(),
            _ => self.decide(error, attempt),
        }
    }
}

/// Bookkeeping for one retried action, dropped when the action settles
#[derive(Debug, Default)]
pub struct ResilienceContext {
    pub attempt: u32,
    pub last_error: Option<String>,
}

/// Runs actions under a [`ResiliencePolicy`]
#[derive(Debug, Clone, Default)]
pub struct ResilientExecutor {
    policy: ResiliencePolicy,
}

impl ResilientExecutor {
    pub fn new(policy: ResiliencePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    /// Executes `action`, retrying while the policy proposes it
    pub async fn execute<T, F, Fut>(&self, action_name: &str, action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(action_name, ResiliencePolicy::decide, action).await
    }

    /// Executes an action that creates something remotely, timeouts are final
    pub async fn execute_non_idempotent<T, F, Fut>(&self, action_name: &str, action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(action_name, ResiliencePolicy::decide_non_idempotent, action)
            .await
    }

    async fn run<T, F, Fut>(
        &self,
        action_name: &str,
        decide: fn(&ResiliencePolicy, &ClientError, u32) -> RetryDecision,
        mut action: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut context = ResilienceContext::default();

        loop {
            context.attempt += 1;

            let error = match action().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let decision = decide(&self.policy, &error, context.attempt);
            if !decision.retry {
                if context.attempt > 1 {
                    warn!(
                        action = action_name,
                        attempts = context.attempt,
                        previous_error = context.last_error.as_deref(),
                        error = %error,
                        "Giving up after retries"
                    );
                }
                return Err(error);
            }

            debug!(
                action = action_name,
                attempt = context.attempt,
                max_attempts = decision.max_attempts,
                delay_ms = decision.delay_ms,
                error = %error,
                "Retrying delegate call"
            );
            context.last_error = Some(error.to_string());
            sleep(Duration::from_millis(decision.delay_ms)).await;
        }
    }
}
