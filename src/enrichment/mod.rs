pub mod code_discovery;
pub mod pipeline;
pub mod semantic;
pub mod source_maps;
pub mod typescript;
pub mod workspace;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::EnrichmentConfig;
use crate::errors::ApiProbeError;
use crate::models::Endpoint;

pub use pipeline::EnrichmentPipeline;
pub use workspace::Workspace;

/// A non-fatal problem reported by an enrichment pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentWarning {
    pub pass: String,
    pub message: String,
}

impl EnrichmentWarning {
    pub fn new(pass: &str, message: impl Into<String>) -> Self {
        Self { pass: pass.to_string(), message: message.into() }
    }
}

impl std::fmt::Display for EnrichmentWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.pass, self.message)
    }
}

impl From<EnrichmentWarning> for ApiProbeError {
    fn from(warning: EnrichmentWarning) -> Self {
        ApiProbeError::Enrichment(warning.to_string())
    }
}

/// One enrichment step. Passes only add annotations through the endpoint's
/// append-only metadata, so running a pass twice changes nothing.
#[async_trait]
pub trait EnrichmentPass: Send + Sync {
    fn name(&self) -> &'static str;

    fn enabled(&self, config: &EnrichmentConfig) -> bool;

    async fn run(&self, endpoints: &mut [Endpoint], workspace: &Workspace) -> Vec<EnrichmentWarning>;
}
