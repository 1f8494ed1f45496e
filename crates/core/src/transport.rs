//! Transport seam between the controller and the network.
//!
//! [`SearchTransport`] only moves bytes: it reports the status code and body
//! of a completed exchange, or [`FetchError::Network`] when the exchange never
//! completed. Status and body interpretation live in [`crate::fetch`].

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::FetchError;
use crate::request::SearchRequest;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn send(&self, request: &SearchRequest) -> Result<RawResponse, FetchError>;
}

/// GET against a fixed endpoint via reqwest. No client-side timeout is set;
/// reqwest's defaults apply.
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("querydeck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network(format!("could not build HTTP client: {e}")))?;
        Ok(Self { client, endpoint: endpoint.into() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport").field("endpoint", &self.endpoint).finish()
    }
}

#[async_trait]
impl SearchTransport for HttpTransport {
    async fn send(&self, request: &SearchRequest) -> Result<RawResponse, FetchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&request.query_pairs())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    FetchError::Network(format!("failed to connect to search endpoint: {e}"))
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        debug!(status, url = %response.url(), "Search endpoint responded");
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read response body: {e}")))?;

        Ok(RawResponse { status, body: body.to_vec() })
    }
}
