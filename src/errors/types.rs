use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiProbeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration invalid: {}", .0.join("; "))]
    ConfigurationInvalid(Vec<String>),

    #[error("Ingestion error: {reason} (near: {source_excerpt:?})")]
    Ingestion {
        reason: String,
        source_excerpt: String,
    },

    #[error("No ingestor found for source: {0}")]
    NoIngestorFound(String),

    #[error("Enrichment warning: {0}")]
    Enrichment(String),

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Probe network error: {0}")]
    ProbeNetwork(String),

    #[error("Probe timed out: {0}")]
    ProbeTimeout(String),

    #[error("Probe request rejected: {0}")]
    ProbeRequest(String),

    #[error("No endpoints were ingested from any source")]
    NoEndpoints,

    #[error("Scan cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiProbeError {
    /// Build an ingestion error carrying a short excerpt of the offending source.
    pub fn ingestion(reason: impl Into<String>, source: &str) -> Self {
        Self::Ingestion {
            reason: reason.into(),
            source_excerpt: excerpt(source, 120),
        }
    }
}

fn excerpt(source: &str, max_chars: usize) -> String {
    let trimmed = source.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}...", cut)
}
