//! Retry state machine for OPS search calls.
//!
//! Every call goes through the same loop:
//!
//! 1. **Send** the request with the current bearer token.
//! 2. **Classify** the response:
//!    - expired token: renew the credential, pause briefly, send again
//!    - HTTP 403 (robot detected): pause for the current backoff wait,
//!      escalate the backoff, send again
//!    - anything else: reset the backoff and hand the response back
//!
//! The loop is unbounded unless [`RetryLimits`] say otherwise. Only
//! transport failures, failed renewals and exhausted limits end it early.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use super::{Backoff, CredentialManager, Endpoint, OpsError, OpsResponse, SearchRequest, SearchTransport};

/// Pause after a token renewal before the request is resent
const DEFAULT_RENEW_DELAY: Duration = Duration::from_secs(2);

/// How the retrieval loop should treat a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// Bearer token expired; renew and resend
    TokenExpired,
    /// Robot detection (HTTP 403); back off and resend
    RateLimited,
    /// Definitive answer (results, no results, or a client error)
    Done,
}

/// Classify a response. Token expiry is checked before the status code.
pub fn classify(response: &OpsResponse) -> ResponseClass {
    if response.is_token_expired() {
        ResponseClass::TokenExpired
    } else if response.status == 403 {
        ResponseClass::RateLimited
    } else {
        ResponseClass::Done
    }
}

/// Blocking wait used between retries.
#[async_trait]
pub trait Pause: Send + Sync + fmt::Debug {
    async fn pause(&self, duration: Duration);
}

/// [`Pause`] backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Optional ceilings on a single `fetch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryLimits {
    /// Maximum number of requests sent for one call
    pub max_attempts: Option<u32>,
    /// Maximum cumulative pause time for one call
    pub max_wait: Option<Duration>,
}

impl RetryLimits {
    /// No ceilings: retry until OPS gives a definitive answer
    pub fn unbounded() -> Self {
        Self::default()
    }

    fn exhausted(&self, attempts: u32, waited: Duration) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
            || self.max_wait.is_some_and(|max| waited > max)
    }
}

/// Sends search requests until a definitive response arrives.
#[derive(Debug)]
pub struct Retriever<T, P = TokioPause> {
    transport: T,
    pause: P,
    limits: RetryLimits,
    renew_delay: Duration,
}

impl<T: SearchTransport, P: Pause> Retriever<T, P> {
    pub fn new(transport: T, pause: P) -> Self {
        Self {
            transport,
            pause,
            limits: RetryLimits::unbounded(),
            renew_delay: DEFAULT_RENEW_DELAY,
        }
    }

    pub fn with_limits(mut self, limits: RetryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_renew_delay(mut self, delay: Duration) -> Self {
        self.renew_delay = delay;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn pauser(&self) -> &P {
        &self.pause
    }

    /// Fetch one range of results.
    ///
    /// Returns the first response that is neither a token expiry nor a robot
    /// detection. Rate limiting and expired tokens are never surfaced.
    pub async fn fetch(
        &self,
        credentials: &mut CredentialManager,
        backoff: &mut Backoff,
        request: &SearchRequest,
        endpoint: Endpoint,
    ) -> Result<OpsResponse, OpsError> {
        let mut attempts = 0u32;
        let mut waited = Duration::ZERO;

        loop {
            attempts += 1;
            tracing::debug!(
                endpoint = %endpoint,
                range = %request.range(),
                attempt = attempts,
                "Sending OPS search request"
            );

            let response = self
                .transport
                .send(endpoint, credentials.token(), request)
                .await?;

            let delay = match classify(&response) {
                ResponseClass::Done => {
                    backoff.reset();
                    return Ok(response);
                }
                ResponseClass::TokenExpired => {
                    credentials.renew().await?;
                    tracing::info!("Access token expired, new token acquired");
                    self.renew_delay
                }
                ResponseClass::RateLimited => {
                    let wait = backoff.current_wait();
                    tracing::warn!("CLIENT.RobotDetected: sleeping for {:?}", wait);
                    backoff.escalate();
                    wait
                }
            };

            waited += delay;
            if self.limits.exhausted(attempts, waited) {
                tracing::warn!(
                    "Giving up on range {} after {} attempts",
                    request.range(),
                    attempts
                );
                return Err(OpsError::RetriesExhausted { attempts, waited });
            }

            self.pause.pause(delay).await;
        }
    }
}
