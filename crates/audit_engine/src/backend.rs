use std::time::Duration;

use bytes::Bytes;
use engine_logging::engine_debug;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::{BackendError, FailureKind};

/// Streaming response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, BackendError>>;

pub const MODE_CAPTURE: &str = "scrape-single-page";
pub const MODE_PERFORMANCE: &str = "scrape-performance";
pub const MODE_RANK: &str = "contextual-rank";
pub const MODE_FINALIZE: &str = "finalize";

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub endpoint: String,
    pub api_key: String,
    pub connect_timeout: Duration,
    /// Overall per-request limit; `None` leaves long analyses unbounded.
    pub request_timeout: Option<Duration>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:54321/functions/v1/audit".to_string(),
            api_key: String::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
        }
    }
}

/// The single remote endpoint every stage talks to.
///
/// Each call is one POST whose JSON body carries a `mode` discriminator.
#[async_trait::async_trait]
pub trait AuditBackend: Send + Sync {
    /// Issue a call whose successful response is a line-delimited event stream.
    async fn stream(&self, body: Value) -> Result<ByteStream, BackendError>;

    /// Issue a call whose successful response is a single JSON document.
    async fn call(&self, body: Value) -> Result<Value, BackendError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    api_key: String,
}

impl ReqwestBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        let endpoint = reqwest::Url::parse(&settings.endpoint)
            .map_err(|err| BackendError::new(FailureKind::InvalidEndpoint, err.to_string()))?;

        let mut builder = reqwest::Client::builder().connect_timeout(settings.connect_timeout);
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| BackendError::new(FailureKind::Network, err.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key: settings.api_key,
        })
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, BackendError> {
        let payload = serde_json::to_vec(body)
            .map_err(|err| BackendError::new(FailureKind::Decode, err.to_string()))?;
        engine_debug!(
            "POST mode={} body_bytes={}",
            body.get("mode").and_then(Value::as_str).unwrap_or("?"),
            payload.len()
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header("apikey", &self.api_key)
            .body(payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::new(
                FailureKind::HttpStatus(status.as_u16()),
                format!("{status} {}", text.trim()),
            ));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl AuditBackend for ReqwestBackend {
    async fn stream(&self, body: Value) -> Result<ByteStream, BackendError> {
        let response = self.post(&body).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed())
    }

    async fn call(&self, body: Value) -> Result<Value, BackendError> {
        let response = self.post(&body).await?;
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&bytes)
            .map_err(|err| BackendError::new(FailureKind::Decode, err.to_string()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        return BackendError::new(FailureKind::Timeout, err.to_string());
    }
    BackendError::new(FailureKind::Network, err.to_string())
}
