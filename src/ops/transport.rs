//! HTTP transport for the OPS published-data search services.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, RANGE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{OpsError, SearchRequest};
use crate::utils::HttpClient;

/// Root of the OPS REST services
pub const DEFAULT_BASE_URL: &str = "https://ops.epo.org/3.2/rest-services";

/// Body fragment OPS sends when the bearer token has expired
pub const TOKEN_EXPIRED_MARKER: &str = "Access token has expired";

/// Body fragment OPS sends when a search matches nothing
pub const ENTITY_NOT_FOUND_MARKER: &str = "<code>SERVER.EntityNotFound</code>";

/// The two search services used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Endpoint {
    /// Publication references only
    Search,
    /// Full bibliographic exchange documents
    BiblioSearch,
}

impl Endpoint {
    /// Path below the REST services root
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Search => "published-data/search",
            Endpoint::BiblioSearch => "published-data/search/biblio",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Search => write!(f, "search"),
            Endpoint::BiblioSearch => write!(f, "biblio-search"),
        }
    }
}

/// Status, headers and raw body of one OPS response.
#[derive(Debug, Clone, PartialEq)]
pub struct OpsResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl OpsResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_token_expired(&self) -> bool {
        self.body.contains(TOKEN_EXPIRED_MARKER)
    }

    pub fn is_entity_not_found(&self) -> bool {
        self.body.contains(ENTITY_NOT_FOUND_MARKER)
    }

    /// Decode the body as JSON
    pub fn json(&self) -> Result<serde_json::Value, OpsError> {
        serde_json::from_str(&self.body).map_err(|e| {
            OpsError::MalformedResponse(format!("response body is not JSON: {}", e))
        })
    }
}

/// Issues a single search call. No retry logic lives here.
#[async_trait]
pub trait SearchTransport: Send + Sync + fmt::Debug {
    async fn send(
        &self,
        endpoint: Endpoint,
        token: &str,
        request: &SearchRequest,
    ) -> Result<OpsResponse, OpsError>;
}

/// [`SearchTransport`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    base_url: String,
}

impl HttpTransport {
    pub fn new(client: HttpClient) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }
}

#[async_trait]
impl SearchTransport for HttpTransport {
    async fn send(
        &self,
        endpoint: Endpoint,
        token: &str,
        request: &SearchRequest,
    ) -> Result<OpsResponse, OpsError> {
        let range = request.range();
        let response = self
            .client
            .client()
            .get(self.url(endpoint))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "text/plain")
            .header(RANGE, &range)
            .bearer_auth(token)
            .query(&[("Range", range.as_str()), ("q", request.query.as_str())])
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(OpsResponse {
            status,
            headers,
            body,
        })
    }
}
