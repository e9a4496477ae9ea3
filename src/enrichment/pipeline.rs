use tracing::{debug, info, warn};

use crate::config::EnrichmentConfig;
use crate::models::Endpoint;
use super::code_discovery::CodeDiscoveryPass;
use super::semantic::SemanticPass;
use super::source_maps::SourceMapPass;
use super::typescript::TypeScriptPass;
use super::{EnrichmentPass, EnrichmentWarning, Workspace};

/// Fixed-order sequence of enrichment passes.
pub struct EnrichmentPipeline {
    config: EnrichmentConfig,
    passes: Vec<Box<dyn EnrichmentPass>>,
}

impl EnrichmentPipeline {
    pub fn from_config(config: &EnrichmentConfig) -> Self {
        Self {
            config: config.clone(),
            passes: vec![
                Box::new(SourceMapPass),
                Box::new(TypeScriptPass),
                Box::new(SemanticPass),
                Box::new(CodeDiscoveryPass::new(config.code_discovery.clone())),
            ],
        }
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run every enabled pass in order. Disabled passes leave endpoints untouched.
    pub async fn run(&self, endpoints: &mut [Endpoint]) -> Vec<EnrichmentWarning> {
        let workspace = Workspace::new(self.config.workspace.clone());
        let mut warnings = Vec::new();

        for pass in &self.passes {
            if !pass.enabled(&self.config) {
                debug!(pass = pass.name(), "Enrichment pass disabled");
                continue;
            }
            let pass_warnings = pass.run(endpoints, &workspace).await;
            for w in &pass_warnings {
                warn!(pass = %w.pass, message = %w.message, "Enrichment warning");
            }
            info!(pass = pass.name(), warnings = pass_warnings.len(), "Enrichment pass complete");
            warnings.extend(pass_warnings);
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, SourceFormat};

    #[test]
    fn test_fixed_pass_order() {
        let pipeline = EnrichmentPipeline::from_config(&EnrichmentConfig::default());
        assert_eq!(
            pipeline.pass_names(),
            vec!["source_maps", "typescript_definitions", "semantic_analysis", "code_discovery"]
        );
    }

    #[tokio::test]
    async fn test_all_disabled_is_identity() {
        let config = EnrichmentConfig {
            semantic_analysis: false,
            ..Default::default()
        };
        let pipeline = EnrichmentPipeline::from_config(&config);
        let mut endpoints = vec![Endpoint::new(HttpMethod::Get, "/users", SourceFormat::OpenApi, "openapi")];
        let before = endpoints.clone();
        let warnings = pipeline.run(&mut endpoints).await;
        assert!(warnings.is_empty());
        assert_eq!(endpoints, before);
    }

    #[tokio::test]
    async fn test_enabled_pass_without_workspace_warns_but_continues() {
        let config = EnrichmentConfig {
            source_maps: true,
            ..Default::default()
        };
        let pipeline = EnrichmentPipeline::from_config(&config);
        let mut endpoints = vec![Endpoint::new(HttpMethod::Get, "/users", SourceFormat::OpenApi, "openapi")];
        let warnings = pipeline.run(&mut endpoints).await;
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].pass, "source_maps");
        assert!(endpoints[0].metadata().pass("semantic_analysis").is_some());
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let pipeline = EnrichmentPipeline::from_config(&EnrichmentConfig::default());
        let mut endpoints = vec![Endpoint::new(HttpMethod::Post, "/login", SourceFormat::Har, "har")];
        pipeline.run(&mut endpoints).await;
        let once = endpoints.clone();
        pipeline.run(&mut endpoints).await;
        assert_eq!(endpoints, once);
    }
}
