//! Scanward HTTP Clients
//!
//! Type-safe HTTP clients used by the scheduler and the CLI:
//!
//! - [`HttpDelegateClient`] speaks the product delegate protocol, every call
//!   guarded by the [`resilience`] policy.
//! - [`SchedulerClient`] talks to the scheduler's job and admin API.
//!
//! # Example
//!
//! ```no_run
//! use scanward_client::SchedulerClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = SchedulerClient::new("http://localhost:8080");
//!
//!     let status = client.scheduler_status().await?;
//!     println!("{} jobs running", status.running);
//!     Ok(())
//! }
//! ```

pub mod delegate;
pub mod error;
pub mod resilience;
mod scheduler;

// Re-export commonly used types
pub use delegate::{DelegateClient, HttpDelegateClient, RemoteJobRequest, UploadedFile};
pub use error::{ClientError, Result};
pub use resilience::{ResilienceContext, ResiliencePolicy, ResilientExecutor, RetryDecision};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Scanward scheduler API
#[derive(Debug, Clone)]
pub struct SchedulerClient {
    /// Base URL of the scheduler (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl SchedulerClient {
    /// Create a new scheduler client
    ///
    /// # Example
    /// ```
    /// use scanward_client::SchedulerClient;
    ///
    /// let client = SchedulerClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new scheduler client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the scheduler
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// =============================================================================
// Response Handlers
// =============================================================================

async fn error_from(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    ClientError::api_error(status.as_u16(), error_text)
}

/// Check the status code and deserialize a JSON body
pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Check the status code of a response without a body
pub(crate) async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }

    Ok(())
}

/// Check the status code and return the body as text
pub(crate) async fn handle_text_response(response: reqwest::Response) -> Result<String> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }

    Ok(response.text().await?)
}
