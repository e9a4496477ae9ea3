pub mod gateway;
pub mod graphql;
pub mod har;
pub mod openapi;
pub mod postman;
pub mod registry;

use crate::errors::ApiProbeError;
use crate::models::Endpoint;

pub use registry::IngestorRegistry;

/// A raw API description handed to the registry.
#[derive(Debug, Clone)]
pub struct IngestSource {
    /// File name, path, URL or content type used to pick an ingestor.
    pub identifier: String,
    pub content: String,
}

impl IngestSource {
    pub fn new(identifier: impl Into<String>, content: impl Into<String>) -> Self {
        Self { identifier: identifier.into(), content: content.into() }
    }
}

/// Read a source from a local path or an http(s) URL. The location becomes the identifier.
pub async fn read_source(location: &str) -> Result<IngestSource, ApiProbeError> {
    let content = if location.starts_with("http://") || location.starts_with("https://") {
        reqwest::get(location).await?.error_for_status()?.text().await?
    } else {
        tokio::fs::read_to_string(location).await?
    };
    Ok(IngestSource::new(location, content))
}

/// Parser for one API description format. Parsing is pure: no I/O, no state.
pub trait Ingestor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Identifier suffixes (file extensions or full names) and content types.
    fn supported_extensions(&self) -> &'static [&'static str];

    fn is_supported(&self, identifier: &str) -> bool {
        identifier_matches(identifier, self.supported_extensions())
    }

    /// Parse the source into a non-empty endpoint list.
    fn ingest(&self, source: &IngestSource) -> Result<Vec<Endpoint>, ApiProbeError>;
}

/// Case-insensitive suffix match. Content types (`application/...`) must match
/// exactly, ignoring any `; charset=` parameters.
pub fn identifier_matches(identifier: &str, patterns: &[&str]) -> bool {
    let id = identifier.trim().to_ascii_lowercase();
    // Strip URL query strings and fragments.
    let id = id.split(['?', '#']).next().unwrap_or("").to_string();
    let media_type = id.split(';').next().unwrap_or("").trim();

    patterns.iter().any(|pattern| {
        let pattern = pattern.to_ascii_lowercase();
        if pattern.contains('/') {
            media_type == pattern
        } else if pattern.starts_with('.') {
            id.ends_with(&pattern)
        } else {
            let file_name = id.rsplit(['/', '\\']).next().unwrap_or("");
            file_name == pattern
        }
    })
}

/// Parse JSON or YAML content into a JSON tree.
pub(crate) fn parse_document(source: &IngestSource) -> Result<serde_json::Value, ApiProbeError> {
    let content = source.content.trim_start_matches('\u{feff}');
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(content) {
        return Ok(value);
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| ApiProbeError::ingestion(format!("not valid JSON or YAML: {}", e), content))?;
    serde_json::to_value(yaml)
        .map_err(|e| ApiProbeError::ingestion(format!("unsupported YAML structure: {}", e), content))
}

pub(crate) fn require_endpoints(
    endpoints: Vec<Endpoint>,
    source: &IngestSource,
) -> Result<Vec<Endpoint>, ApiProbeError> {
    if endpoints.is_empty() {
        Err(ApiProbeError::ingestion("no operations found", &source.content))
    } else {
        Ok(endpoints)
    }
}
