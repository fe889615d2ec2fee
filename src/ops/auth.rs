//! OAuth client-credentials exchange and bearer-token holder.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

use super::OpsError;
use crate::utils::HttpClient;

/// OPS token endpoint
pub const DEFAULT_AUTH_URL: &str = "https://ops.epo.org/3.2/auth/accesstoken";

const CONSUMER_KEY_VAR: &str = "ConsumerKey";
const CONSUMER_SECRET_VAR: &str = "ConsumerSecretKey";

/// OPS consumer key pair.
#[derive(Clone)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl Credentials {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        }
    }

    /// Read the key pair from `ConsumerKey` / `ConsumerSecretKey`.
    pub fn from_env() -> Result<Self, OpsError> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| OpsError::Config(format!("environment variable {} is not set", name)))
        };
        Ok(Self::new(read(CONSUMER_KEY_VAR)?, read(CONSUMER_SECRET_VAR)?))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .finish()
    }
}

/// Something that can mint a fresh bearer token.
#[async_trait]
pub trait TokenExchange: Send + Sync + fmt::Debug {
    /// Run one token exchange and return the access token.
    async fn acquire(&self) -> Result<String, OpsError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// The real OPS client-credentials exchange.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    client: HttpClient,
    auth_url: String,
    credentials: Credentials,
}

impl ClientCredentials {
    pub fn new(client: HttpClient, credentials: Credentials) -> Self {
        Self::with_url(client, credentials, DEFAULT_AUTH_URL)
    }

    pub fn with_url(client: HttpClient, credentials: Credentials, auth_url: impl Into<String>) -> Self {
        Self {
            client,
            auth_url: auth_url.into(),
            credentials,
        }
    }
}

#[async_trait]
impl TokenExchange for ClientCredentials {
    async fn acquire(&self) -> Result<String, OpsError> {
        let response = self
            .client
            .client()
            .post(&self.auth_url)
            .basic_auth(
                &self.credentials.consumer_key,
                Some(&self.credentials.consumer_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpsError::Auth {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            OpsError::MalformedResponse(format!("token response without access_token: {}", e))
        })?;

        Ok(token.access_token)
    }
}

/// Holds exactly one bearer token and replaces it on demand.
pub struct CredentialManager {
    exchange: Box<dyn TokenExchange>,
    token: String,
    renewals: u32,
}

impl CredentialManager {
    /// Run the first exchange. Failures propagate; nothing is retried here.
    pub async fn acquire(exchange: impl TokenExchange + 'static) -> Result<Self, OpsError> {
        let token = exchange.acquire().await?;
        tracing::debug!("Acquired OPS access token");
        Ok(Self {
            exchange: Box::new(exchange),
            token,
            renewals: 0,
        })
    }

    /// Token to put in the `Authorization` header
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Re-run the exchange and replace the held token.
    pub async fn renew(&mut self) -> Result<(), OpsError> {
        self.token = self.exchange.acquire().await?;
        self.renewals += 1;
        Ok(())
    }

    /// Number of successful renewals since acquisition
    pub fn renewals(&self) -> u32 {
        self.renewals
    }
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("exchange", &self.exchange)
            .field("token", &"<redacted>")
            .field("renewals", &self.renewals)
            .finish()
    }
}
