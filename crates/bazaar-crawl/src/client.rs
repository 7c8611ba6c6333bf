//! Bounded HTTP JSON client.

use std::sync::Arc;
use std::time::Duration;

use bazaar_core::{Error, PipelineConfig, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::debug;

/// Why a single request produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("body is not JSON: {0}")]
    Decode(String),
    #[error("unexpected response shape: {0}")]
    Shape(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

/// HTTP client whose requests all pass one shared gate.
///
/// Cloning is cheap and clones share the gate, so a run builds one client
/// and hands clones to every task.
#[derive(Clone)]
pub struct FetchClient {
    http: Client,
    gate: Arc<Semaphore>,
    timeout: Duration,
}

impl FetchClient {
    pub fn new(gate: Arc<Semaphore>, timeout: Duration, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            gate,
            timeout,
        })
    }

    /// Client with a fresh gate of `config.concurrency` permits.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(
            Arc::new(Semaphore::new(config.concurrency)),
            config.request_timeout(),
            &config.user_agent,
        )
    }

    pub fn gate(&self) -> &Arc<Semaphore> {
        &self.gate
    }

    /// GET `url` and parse the body as JSON.
    ///
    /// The gate permit is held for this one request only.
    pub async fn fetch_json(&self, url: &str) -> std::result::Result<Value, FetchError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let request = async {
            let response = self.http.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            Ok::<_, FetchError>(response.bytes().await?)
        };

        let body = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout)??;
        debug!("GET {} -> {} bytes", url, body.len());

        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// GET `url` and read the JSON into `T`.
    pub async fn fetch<T: DeserializeOwned>(&self, url: &str) -> std::result::Result<T, FetchError> {
        let value = self.fetch_json(url).await?;
        serde_json::from_value(value).map_err(|e| FetchError::Shape(e.to_string()))
    }
}
