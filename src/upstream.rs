// Outbound streaming transport.
//
// One trait seam between the orchestrator and the network: open a
// bearer-authenticated streaming POST and hand back the status plus the
// raw byte stream. `ReqwestConnector` is the production implementation;
// tests inject scripted responses.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::stream::Stream;
use futures_util::TryStreamExt;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("upstream request timed out: {0}")]
    Timeout(String),
}

impl UpstreamError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

/// Body bytes as they arrive from the upstream. Dropping the stream closes
/// the underlying connection.
pub type UpstreamBody = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// One streaming call to the upstream responses endpoint.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub bearer_token: String,
    pub body: serde_json::Value,
}

pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: UpstreamBody,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Opens streaming requests against the upstream API.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn open(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

/// `UpstreamConnector` backed by a shared `reqwest::Client`.
pub struct ReqwestConnector {
    client: reqwest::Client,
}

impl ReqwestConnector {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a connector whose client bounds each call end to end by
    /// `timeout`, including the time spent streaming the body.
    pub fn with_timeout(timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamConnector for ReqwestConnector {
    async fn open(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let response = self
            .client
            .post(&request.url)
            .bearer_auth(&request.bearer_token)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request.body)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let status = response.status();
        let body = response.bytes_stream().map_err(UpstreamError::from_reqwest);

        Ok(UpstreamResponse {
            status,
            body: Box::pin(body),
        })
    }
}
