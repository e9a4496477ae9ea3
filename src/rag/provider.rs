use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::credentials::resolve_credential;
use crate::config::RagConfig;
use crate::errors::ApiProbeError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmbeddingError {
    /// The provider can't serve any request right now; matching is skipped.
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    /// The provider refused this particular input.
    #[error("embedding rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Model identifier
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbeddingProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiEmbeddingProvider {
    pub fn new(base_url: &str, api_key: Option<String>, model: &str) -> Result<Self, ApiProbeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = json!({ "model": self.model, "input": text });
        let mut request = self.client.post(format!("{}/embeddings", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let resp = request.send().await
            .map_err(|e| EmbeddingError::Unavailable(format!("embedding request failed: {}", e)))?;

        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(EmbeddingError::Unavailable(format!("embedding endpoint returned {}", status)));
        }
        // A bad key or base URL fails every later text the same way.
        if matches!(status.as_u16(), 401 | 403 | 404) {
            return Err(EmbeddingError::Unavailable(format!(
                "embedding endpoint returned {}: check API key and base URL",
                status
            )));
        }
        if status.is_client_error() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Rejected(format!("{}: {}", status, truncate(&detail, 200))));
        }

        let data: Value = resp.json().await
            .map_err(|e| EmbeddingError::Unavailable(format!("failed to parse embedding response: {}", e)))?;
        let vector = data["data"][0]["embedding"].as_array()
            .ok_or_else(|| EmbeddingError::Unavailable("no embedding in response".into()))?;
        let embedding: Vec<f32> = vector.iter().filter_map(Value::as_f64).map(|v| v as f32).collect();
        debug!(dimensions = embedding.len(), "Embedded text");
        Ok(embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub fn create_provider(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>, ApiProbeError> {
    let api_key = config.api_key.as_deref().and_then(resolve_credential);
    if api_key.is_none() {
        debug!("No embedding API key configured; requests are sent unauthenticated");
    }
    Ok(Arc::new(OpenAiEmbeddingProvider::new(
        &config.embedding_base_url,
        api_key,
        &config.embedding_model,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_uses_configured_model() {
        let config = RagConfig {
            api_key: Some("$APIPROBE_TEST_UNSET_KEY".into()),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "text-embedding-3-small");
    }

    #[tokio::test]
    async fn test_connection_failure_is_unavailable() {
        // Port 9 (discard) on localhost is closed in test environments.
        let provider = OpenAiEmbeddingProvider::new("http://127.0.0.1:9/v1", None, "m").unwrap();
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Unavailable(_)));
    }
}
