//! HTTP client utilities.

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::ops::OpsError;

/// Default request timeout for OPS calls, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Shared HTTP client with sensible defaults
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Create a new HTTP client with the default timeout
    pub fn new() -> Result<Self, OpsError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Create a new HTTP client with a custom request timeout
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, OpsError> {
        let client = Client::builder()
            .user_agent(get_user_agent())
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| OpsError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Create from an existing reqwest Client
    pub fn from_client(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// User agent sent with every request.
///
/// Respects `PATENT_HARVEST_USER_AGENT` when set.
pub fn get_user_agent() -> String {
    std::env::var("PATENT_HARVEST_USER_AGENT").unwrap_or_else(|_| {
        concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
    })
}
