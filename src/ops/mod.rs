//! Client plumbing for the EPO Open Patent Services (OPS) API.
//!
//! The pieces are deliberately small and are threaded through every call
//! explicitly rather than held globally:
//!
//! - [`CredentialManager`]: holds the single bearer token and renews it
//! - [`Backoff`]: escalating wait schedule used when OPS detects a robot
//! - [`SearchTransport`]: the HTTP seam ([`HttpTransport`] in production)
//! - [`Retriever`]: the retry state machine tying the three together
//!
//! # Example
//!
//! ```rust,no_run
//! use patent_harvest::ops::{
//!     Backoff, ClientCredentials, CredentialManager, Credentials, Endpoint, HttpTransport,
//!     Retriever, SearchRequest, TokioPause,
//! };
//! use patent_harvest::utils::HttpClient;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let http = HttpClient::with_timeout(20)?;
//! let exchange = ClientCredentials::new(http.clone(), Credentials::from_env()?);
//! let mut credentials = CredentialManager::acquire(exchange).await?;
//! let mut backoff = Backoff::new(10.0, 120.0, 10);
//!
//! let retriever = Retriever::new(HttpTransport::new(http), TokioPause);
//! let request = SearchRequest::new("ta = \"solar\" AND AP=\"DE\"", 1, 25)?;
//! let response = retriever
//!     .fetch(&mut credentials, &mut backoff, &request, Endpoint::BiblioSearch)
//!     .await?;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```

mod auth;
mod backoff;
mod request;
mod retrieve;
mod transport;

pub use auth::{ClientCredentials, CredentialManager, Credentials, TokenExchange, DEFAULT_AUTH_URL};
pub use backoff::Backoff;
pub use request::{windows, SearchRequest, MAX_PAGE_SIZE, MAX_RESULTS};
pub use retrieve::{classify, Pause, ResponseClass, Retriever, RetryLimits, TokioPause};
pub use transport::{
    Endpoint, HttpTransport, OpsResponse, SearchTransport, DEFAULT_BASE_URL, ENTITY_NOT_FOUND_MARKER,
    TOKEN_EXPIRED_MARKER,
};

use std::time::Duration;

/// Errors surfaced by the OPS client and the collection pipeline.
///
/// Rate limiting, token expiry and empty result sets are handled inside the
/// retrieval loop and the flatteners; they never show up here.
#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    /// The client-credentials exchange returned a non-success status
    #[error("Authentication failed with status {status}: {body}")]
    Auth { status: u16, body: String },

    /// Network-level failure (DNS, connection refused, timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// OPS answered with a status the pipeline cannot interpret as results
    #[error("OPS rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// A successful response is missing an expected key
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The configured retry limits were reached
    #[error("Gave up after {attempts} attempts ({waited:?} spent waiting)")]
    RetriesExhausted { attempts: u32, waited: Duration },

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file system)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reference table could not be read
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<reqwest::Error> for OpsError {
    fn from(err: reqwest::Error) -> Self {
        OpsError::Transport(err.to_string())
    }
}

impl OpsError {
    /// Whether a batch job should stop on this error rather than move on to
    /// the next query.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            OpsError::Rejected { .. } | OpsError::MalformedResponse(_)
        )
    }
}
