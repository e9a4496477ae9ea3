use std::sync::Arc;

use serde::{Deserialize, Serialize};
use super::endpoint::EndpointKey;

/// A unit of retrievable documentation text with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentationChunk {
    /// Position of the chunk in load order; earlier chunks win similarity ties.
    pub index: usize,
    /// URL or file path the chunk was loaded from.
    pub source: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    pub section: Option<String>,
    pub heading: Option<String>,
}

/// A retained match between an endpoint and a documentation chunk.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub endpoint: EndpointKey,
    pub chunk: Arc<DocumentationChunk>,
    /// Cosine similarity clamped to [0, 1].
    pub similarity: f32,
    /// Confidence derived from similarity through the configured table.
    pub confidence: f32,
}
