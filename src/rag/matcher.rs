use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::errors::ApiProbeError;
use crate::models::{DocumentationChunk, DocumentationSummary, Endpoint, EndpointKey, MatchResult};
use super::provider::{EmbeddingError, EmbeddingProvider};
use super::similarity::{confidence_from_table, cosine_similarity};

const EMBED_CONCURRENCY: usize = 4;
const PASS: &str = "rag";

/// Embeddings keyed by exact text, so identical chunks and descriptors are
/// embedded once per run.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: DashMap<String, Arc<Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_embed(
        &self,
        provider: &dyn EmbeddingProvider,
        text: &str,
    ) -> Result<Arc<Vec<f32>>, EmbeddingError> {
        if let Some(hit) = self.entries.get(text) {
            return Ok(hit.clone());
        }
        let vector = Arc::new(provider.embed(text).await?);
        self.entries.insert(text.to_string(), vector.clone());
        Ok(vector)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Matches produced for one run.
#[derive(Debug, Default)]
pub struct MatchSet {
    pub matches: BTreeMap<EndpointKey, Vec<MatchResult>>,
    pub warnings: Vec<String>,
    /// False when the provider was unavailable and matching was skipped.
    pub matching_performed: bool,
}

impl MatchSet {
    pub fn for_endpoint(&self, key: &EndpointKey) -> &[MatchResult] {
        self.matches.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn summaries(&self, endpoints: &[Endpoint]) -> Vec<DocumentationSummary> {
        endpoints.iter()
            .map(|e| {
                let matches = self.for_endpoint(e.key());
                DocumentationSummary {
                    endpoint: e.key().clone(),
                    documented: !matches.is_empty(),
                    best_similarity: matches.first().map(|m| m.similarity),
                    confidence: matches.first().map(|m| m.confidence),
                    sources: source_labels(matches),
                }
            })
            .collect()
    }
}

fn source_labels(matches: &[MatchResult]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for m in matches {
        let label = match &m.chunk.heading {
            Some(h) => format!("{}#{}", m.chunk.source, h),
            None => m.chunk.source.clone(),
        };
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

/// Embedding-based documentation matcher.
pub struct DocumentationMatcher {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    threshold: f32,
    top_k: usize,
    confidence_table: Vec<[f32; 2]>,
}

impl DocumentationMatcher {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &RagConfig) -> Self {
        Self {
            provider,
            cache: EmbeddingCache::new(),
            threshold: config.confidence_threshold,
            top_k: config.top_k.max(1),
            confidence_table: config.confidence_table.clone(),
        }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Score every endpoint against the chunks and annotate it with
    /// `rag.documented`, `rag.confidence` and `rag.sources`. Provider
    /// unavailability fails open: every endpoint ends up undocumented.
    pub async fn match_endpoints(&self, endpoints: &mut [Endpoint], chunks: Vec<DocumentationChunk>) -> MatchSet {
        let mut set = MatchSet::default();

        if chunks.is_empty() {
            debug!("No documentation chunks; all endpoints undocumented");
            set.matching_performed = true;
            annotate_all(endpoints, &set);
            return set;
        }

        let embedded = match self.embed_chunks(chunks, &mut set.warnings).await {
            Ok(c) => c,
            Err(reason) => return self.fail_open(endpoints, set, reason),
        };

        let descriptors: Vec<String> = endpoints.iter().map(describe_endpoint).collect();
        let vectors: Vec<Result<Arc<Vec<f32>>, EmbeddingError>> = stream::iter(descriptors.iter())
            .map(|d| self.cache.get_or_embed(self.provider.as_ref(), d))
            .buffered(EMBED_CONCURRENCY)
            .collect()
            .await;

        let mut unavailable = None;
        for (endpoint, vector) in endpoints.iter().zip(vectors) {
            let vector = match vector {
                Ok(v) => v,
                Err(EmbeddingError::Unavailable(reason)) => {
                    unavailable = Some(reason);
                    break;
                }
                Err(EmbeddingError::Rejected(reason)) => {
                    set.warnings.push(format!("endpoint {} skipped by embedding provider: {}", endpoint.key(), reason));
                    continue;
                }
            };

            let mut scored: Vec<MatchResult> = embedded.iter()
                .map(|chunk| (chunk, cosine_similarity(&vector, &chunk.embedding)))
                .filter(|(_, similarity)| *similarity >= self.threshold)
                .map(|(chunk, similarity)| MatchResult {
                    endpoint: endpoint.key().clone(),
                    chunk: chunk.clone(),
                    similarity,
                    confidence: confidence_from_table(&self.confidence_table, similarity),
                })
                .collect();
            scored.sort_by(|a, b| {
                b.similarity.total_cmp(&a.similarity).then(a.chunk.index.cmp(&b.chunk.index))
            });
            scored.truncate(self.top_k);
            if !scored.is_empty() {
                set.matches.insert(endpoint.key().clone(), scored);
            }
        }
        if let Some(reason) = unavailable {
            return self.fail_open(endpoints, set, reason);
        }

        set.matching_performed = true;
        annotate_all(endpoints, &set);
        info!(
            endpoints = endpoints.len(),
            documented = set.matches.len(),
            cached = self.cache.len(),
            "Documentation matching complete"
        );
        set
    }

    async fn embed_chunks(
        &self,
        chunks: Vec<DocumentationChunk>,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<Arc<DocumentationChunk>>, String> {
        let vectors: Vec<Result<Arc<Vec<f32>>, EmbeddingError>> = stream::iter(chunks.iter())
            .map(|c| self.cache.get_or_embed(self.provider.as_ref(), &c.text))
            .buffered(EMBED_CONCURRENCY)
            .collect()
            .await;

        let mut embedded = Vec::with_capacity(chunks.len());
        for (mut chunk, vector) in chunks.into_iter().zip(vectors) {
            match vector {
                Ok(v) => {
                    chunk.embedding = v.as_ref().clone();
                    embedded.push(Arc::new(chunk));
                }
                Err(EmbeddingError::Unavailable(reason)) => return Err(reason),
                Err(EmbeddingError::Rejected(reason)) => {
                    warnings.push(format!(
                        "documentation chunk {} from {} skipped: {}",
                        chunk.index, chunk.source, reason
                    ));
                }
            }
        }
        Ok(embedded)
    }

    fn fail_open(&self, endpoints: &mut [Endpoint], mut set: MatchSet, reason: String) -> MatchSet {
        warn!(reason = %reason, "Embedding provider unavailable; continuing without documentation matching");
        set.warnings.push(ApiProbeError::EmbeddingUnavailable(reason).to_string());
        set.matches.clear();
        set.matching_performed = false;
        annotate_all(endpoints, &set);
        set
    }
}

fn annotate_all(endpoints: &mut [Endpoint], set: &MatchSet) {
    for endpoint in endpoints.iter_mut() {
        let matches = set.for_endpoint(endpoint.key());
        let confidence = matches.first().map(|m| m.confidence).unwrap_or(0.0);
        let sources = source_labels(matches);
        endpoint.annotate(PASS, "documented", json!(!matches.is_empty()));
        endpoint.annotate(PASS, "confidence", json!(confidence));
        endpoint.annotate(PASS, "sources", json!(sources));
    }
}

/// Text embedded for an endpoint: method, path, parameters, summary, tags and
/// any semantic-analysis annotations.
pub fn describe_endpoint(endpoint: &Endpoint) -> String {
    let params: Vec<&str> = endpoint.parameters.iter().map(|p| p.name.as_str()).collect();
    let mut text = format!("{} {}", endpoint.method(), endpoint.path());
    if !params.is_empty() {
        text.push_str(&format!(" params: {}", params.join(", ")));
    }
    if let Some(summary) = &endpoint.summary {
        text.push_str(&format!(" summary: {}", summary));
    }
    if !endpoint.tags.is_empty() {
        text.push_str(&format!(" tags: {}", endpoint.tags.join(", ")));
    }
    if let Some(semantic) = endpoint.metadata().pass("semantic_analysis") {
        for key in ["resource", "action"] {
            if let Some(Value::String(v)) = semantic.get(key) {
                text.push_str(&format!(" {}: {}", key, v));
            }
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, ParamLocation, ParamType, Parameter, SourceFormat};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds by keyword presence: [users, orders, health].
    struct KeywordEmbedder {
        calls: AtomicUsize,
        reject: Option<&'static str>,
        unavailable: bool,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0), reject: None, unavailable: false }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unavailable {
                return Err(EmbeddingError::Unavailable("connection refused".into()));
            }
            if let Some(word) = self.reject {
                if text.contains(word) {
                    return Err(EmbeddingError::Rejected("too long".into()));
                }
            }
            let lower = text.to_lowercase();
            Ok(["users", "orders", "health"].iter().map(|k| if lower.contains(k) { 1.0 } else { 0.0 }).collect())
        }

        fn model_name(&self) -> &str {
            "keyword"
        }
    }

    fn chunk(index: usize, text: &str) -> DocumentationChunk {
        DocumentationChunk {
            index,
            source: "docs.md".into(),
            text: text.into(),
            embedding: Vec::new(),
            section: None,
            heading: Some(format!("h{}", index)),
        }
    }

    fn config(threshold: f32, top_k: usize) -> RagConfig {
        RagConfig { confidence_threshold: threshold, top_k, ..Default::default() }
    }

    fn endpoints() -> Vec<Endpoint> {
        vec![
            Endpoint::new(HttpMethod::Get, "/users", SourceFormat::OpenApi, "openapi"),
            Endpoint::new(HttpMethod::Get, "/health", SourceFormat::OpenApi, "openapi"),
            Endpoint::new(HttpMethod::Get, "/metrics", SourceFormat::OpenApi, "openapi"),
        ]
    }

    #[tokio::test]
    async fn test_top_k_with_ties_broken_by_index() {
        let matcher = DocumentationMatcher::new(Arc::new(KeywordEmbedder::new()), &config(0.5, 2));
        let chunks = vec![
            chunk(0, "All about users"),
            chunk(1, "users again"),
            chunk(2, "users and orders"),
            chunk(3, "health"),
        ];
        let mut eps = endpoints();
        let set = matcher.match_endpoints(&mut eps, chunks).await;

        let users = set.for_endpoint(eps[0].key());
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].chunk.index, 0);
        assert_eq!(users[1].chunk.index, 1);
        assert!((users[0].similarity - 1.0).abs() < 1e-6);
        assert!(users.windows(2).all(|w| w[0].similarity >= w[1].similarity));

        assert!(eps[0].is_documented());
        assert!(eps[1].is_documented());
        assert!(!eps[2].is_documented());
        assert_eq!(eps[2].metadata().get("rag", "confidence"), Some(&json!(0.0)));
        assert_eq!(eps[1].metadata().get("rag", "sources"), Some(&json!(["docs.md#h3"])));
    }

    #[tokio::test]
    async fn test_threshold_filters_partial_matches() {
        let matcher = DocumentationMatcher::new(Arc::new(KeywordEmbedder::new()), &config(0.9, 3));
        let mut eps = endpoints();
        let set = matcher.match_endpoints(&mut eps, vec![chunk(0, "users and orders")]).await;
        // cos([1,0,0],[1,1,0]) ~ 0.707 < 0.9
        assert!(set.for_endpoint(eps[0].key()).is_empty());
        assert!(!eps[0].is_documented());
    }

    #[tokio::test]
    async fn test_unavailable_fails_open() {
        let embedder = KeywordEmbedder { unavailable: true, ..KeywordEmbedder::new() };
        let matcher = DocumentationMatcher::new(Arc::new(embedder), &config(0.5, 3));
        let mut eps = endpoints();
        let set = matcher.match_endpoints(&mut eps, vec![chunk(0, "users")]).await;
        assert!(!set.matching_performed);
        assert_eq!(set.warnings.len(), 1);
        assert!(set.warnings[0].starts_with("Embedding provider unavailable:"), "{}", set.warnings[0]);
        assert!(eps.iter().all(|e| !e.is_documented()));
    }

    #[tokio::test]
    async fn test_rejected_items_skipped() {
        let embedder = KeywordEmbedder { reject: Some("orders"), ..KeywordEmbedder::new() };
        let matcher = DocumentationMatcher::new(Arc::new(embedder), &config(0.5, 3));
        let mut eps = endpoints();
        let set = matcher.match_endpoints(&mut eps, vec![chunk(0, "orders"), chunk(1, "users")]).await;
        assert!(set.matching_performed);
        assert_eq!(set.warnings.len(), 1);
        assert_eq!(set.for_endpoint(eps[0].key())[0].chunk.index, 1);
    }

    #[tokio::test]
    async fn test_cache_embeds_identical_text_once() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let matcher = DocumentationMatcher::new(embedder.clone(), &config(0.5, 3));
        let mut eps = vec![Endpoint::new(HttpMethod::Get, "/users", SourceFormat::OpenApi, "openapi")];
        matcher.match_endpoints(&mut eps, vec![chunk(0, "users"), chunk(1, "users")]).await;
        // One chunk text + one descriptor.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(matcher.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_no_chunks_makes_no_provider_calls() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let matcher = DocumentationMatcher::new(embedder.clone(), &config(0.5, 3));
        let mut eps = endpoints();
        let set = matcher.match_endpoints(&mut eps, Vec::new()).await;
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(set.matches.is_empty());
        assert!(eps.iter().all(|e| e.metadata().get("rag", "documented") == Some(&json!(false))));
    }

    #[test]
    fn test_descriptor_format() {
        let mut ep = Endpoint::new(HttpMethod::Post, "/users", SourceFormat::OpenApi, "openapi");
        ep.summary = Some("Create a user".into());
        ep.tags = vec!["users".into()];
        ep.annotate("semantic_analysis", "action", json!("create"));
        assert_eq!(describe_endpoint(&ep), "POST /users summary: Create a user tags: users action: create");

        ep.add_parameter(Parameter::new("email", ParamLocation::Body, ParamType::String, true));
        ep.add_parameter(Parameter::new("name", ParamLocation::Body, ParamType::String, false));
        assert!(describe_endpoint(&ep).starts_with("POST /users params: email, name summary:"));
    }
}
