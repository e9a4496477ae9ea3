use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use thiserror::Error;
use tracing::trace;

use crate::config::DastConfig;
use crate::errors::ApiProbeError;
use crate::models::{ProbeResponse, RequestDescriptor};

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// Connect, reset or DNS failure. Worth retrying.
    #[error("transient network error: {0}")]
    Transient(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl From<TransportError> for ApiProbeError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Transient(msg) => ApiProbeError::ProbeNetwork(msg),
            TransportError::Request(msg) => ApiProbeError::ProbeRequest(msg),
        }
    }
}

/// Sends one probe request. The executor owns timeouts and retries.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<ProbeResponse, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &DastConfig) -> Result<Self, ApiProbeError> {
        let redirect = if config.follow_redirects {
            Policy::limited(MAX_REDIRECTS)
        } else {
            Policy::none()
        };
        let client = reqwest::Client::builder()
            .redirect(redirect)
            .user_agent(concat!("apiprobe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProbeTransport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<ProbeResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(classify_send_error)?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response.headers().iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.text().await
            .map_err(|e| TransportError::Transient(format!("reading body: {}", e)))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        trace!(url = %request.url, status, elapsed_ms, "Probe response");
        Ok(ProbeResponse { status, headers, body, elapsed_ms })
    }
}

fn classify_send_error(e: reqwest::Error) -> TransportError {
    if e.is_builder() || e.is_redirect() {
        TransportError::Request(e.to_string())
    } else if e.is_connect() || e.is_request() || e.is_timeout() {
        TransportError::Transient(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}
