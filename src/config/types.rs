use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use crate::models::endpoint::SourceFormat;
use crate::models::finding::Severity;
use crate::models::payload::VulnClass;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ApiProbeConfig {
    pub ingestors: IngestorsConfig,
    pub enrichment: EnrichmentConfig,
    pub rag: RagConfig,
    pub dast: DastConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestorsConfig {
    /// Order in which ingestors are asked whether they support a source.
    pub priority: Vec<SourceFormat>,
    pub openapi: OpenApiIngestorConfig,
    pub graphql: GraphQlIngestorConfig,
    pub postman: ToggleConfig,
    pub har: ToggleConfig,
    pub gateway: ToggleConfig,
}

impl Default for IngestorsConfig {
    fn default() -> Self {
        Self {
            priority: vec![
                SourceFormat::Postman,
                SourceFormat::Har,
                SourceFormat::GraphQl,
                SourceFormat::Gateway,
                SourceFormat::OpenApi,
            ],
            openapi: OpenApiIngestorConfig::default(),
            graphql: GraphQlIngestorConfig::default(),
            postman: ToggleConfig::default(),
            har: ToggleConfig::default(),
            gateway: ToggleConfig::default(),
        }
    }
}

impl IngestorsConfig {
    pub fn is_enabled(&self, format: SourceFormat) -> bool {
        match format {
            SourceFormat::OpenApi => self.openapi.enabled,
            SourceFormat::GraphQl => self.graphql.enabled,
            SourceFormat::Postman => self.postman.enabled,
            SourceFormat::Har => self.har.enabled,
            SourceFormat::Gateway => self.gateway.enabled,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToggleConfig {
    pub enabled: bool,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OpenApiIngestorConfig {
    pub enabled: bool,
    /// Accepted spec versions, matched as prefixes of `openapi`/`swagger`.
    pub versions: Vec<String>,
}

impl Default for OpenApiIngestorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            versions: vec!["2.0".into(), "3.0".into(), "3.1".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphQlIngestorConfig {
    pub enabled: bool,
    pub endpoint_path: String,
}

impl Default for GraphQlIngestorConfig {
    fn default() -> Self {
        Self { enabled: true, endpoint_path: "/graphql".into() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Directory scanned for source maps and type definitions.
    pub workspace: Option<PathBuf>,
    pub source_maps: bool,
    pub typescript_definitions: bool,
    pub semantic_analysis: bool,
    pub code_discovery: CodeDiscoveryConfig,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            source_maps: false,
            typescript_definitions: false,
            semantic_analysis: true,
            code_discovery: CodeDiscoveryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CodeDiscoveryConfig {
    pub enabled: bool,
    pub safe_mode: bool,
    /// External discovery binary.
    pub command: String,
}

impl Default for CodeDiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            safe_mode: true,
            command: "code-discovery".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RagConfig {
    pub embedding_model: String,
    pub embedding_base_url: String,
    /// API key or `$ENV_VAR` reference.
    pub api_key: Option<String>,
    pub documentation_sources: Vec<String>,
    pub confidence_threshold: f32,
    pub top_k: usize,
    pub chunk_size: usize,
    /// Piecewise-linear similarity -> confidence points, sorted by similarity.
    pub confidence_table: Vec<[f32; 2]>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-3-small".into(),
            embedding_base_url: "https://api.openai.com/v1".into(),
            api_key: Some("$OPENAI_API_KEY".into()),
            documentation_sources: Vec::new(),
            confidence_threshold: 0.75,
            top_k: 3,
            chunk_size: 1200,
            confidence_table: vec![[0.0, 0.0], [1.0, 1.0]],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DastConfig {
    pub max_concurrent: usize,
    /// Per-request timeout in milliseconds.
    pub timeout: u64,
    pub follow_redirects: bool,
    pub custom_headers: BTreeMap<String, String>,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Enabled classes, in generation order.
    pub vulnerability_classes: Vec<VulnClass>,
    pub max_payloads_per_parameter: Option<usize>,
    pub severity_table: BTreeMap<VulnClass, Severity>,
    /// Line-diff similarity below which a body counts as divergent.
    pub divergence_threshold: f32,
}

impl Default for DastConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            timeout: 10_000,
            follow_redirects: false,
            custom_headers: BTreeMap::new(),
            max_retries: 2,
            retry_backoff_ms: 200,
            vulnerability_classes: VulnClass::ALL.to_vec(),
            max_payloads_per_parameter: None,
            severity_table: default_severity_table(),
            divergence_threshold: 0.3,
        }
    }
}

impl DastConfig {
    /// Severity for a class; classes missing from the table fall back to the defaults.
    pub fn severity_for(&self, class: VulnClass) -> Severity {
        self.severity_table
            .get(&class)
            .copied()
            .or_else(|| default_severity_table().get(&class).copied())
            .unwrap_or(Severity::Medium)
    }
}

pub fn default_severity_table() -> BTreeMap<VulnClass, Severity> {
    BTreeMap::from([
        (VulnClass::Injection, Severity::Critical),
        (VulnClass::BlindInjection, Severity::High),
        (VulnClass::CommandInjection, Severity::Critical),
        (VulnClass::Xss, Severity::High),
        (VulnClass::PathTraversal, Severity::High),
        (VulnClass::Ssti, Severity::High),
        (VulnClass::TypeConfusion, Severity::Medium),
    ])
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Markdown,
    #[default]
    Both,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(Self::Json),
            "markdown" | "md" => Some(Self::Markdown),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub format: ReportFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./results"),
            format: ReportFormat::Both,
        }
    }
}
