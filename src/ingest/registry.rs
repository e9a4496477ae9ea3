use tracing::{debug, info};

use crate::config::IngestorsConfig;
use crate::errors::ApiProbeError;
use crate::models::{Endpoint, SourceFormat};
use super::gateway::GatewayIngestor;
use super::graphql::GraphQlIngestor;
use super::har::HarIngestor;
use super::openapi::OpenApiIngestor;
use super::postman::PostmanIngestor;
use super::{IngestSource, Ingestor};

/// Ordered set of enabled ingestors. The first ingestor whose `is_supported`
/// accepts an identifier handles the source.
pub struct IngestorRegistry {
    ingestors: Vec<Box<dyn Ingestor>>,
}

impl IngestorRegistry {
    pub fn empty() -> Self {
        Self { ingestors: Vec::new() }
    }

    /// Build the registry in configured priority order. Disabled formats are
    /// never registered, so they can't be dispatched to.
    pub fn from_config(config: &IngestorsConfig) -> Self {
        let mut registry = Self::empty();
        for format in &config.priority {
            if !config.is_enabled(*format) {
                debug!(format = %format, "Ingestor disabled");
                continue;
            }
            if registry.ingestors.iter().any(|i| i.name() == format.as_str()) {
                continue;
            }
            registry.register(create_ingestor(*format, config));
        }
        registry
    }

    /// Append an ingestor at the lowest priority.
    pub fn register(&mut self, ingestor: Box<dyn Ingestor>) {
        self.ingestors.push(ingestor);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.ingestors.iter().map(|i| i.name()).collect()
    }

    pub fn select(&self, identifier: &str) -> Result<&dyn Ingestor, ApiProbeError> {
        self.ingestors.iter()
            .find(|i| i.is_supported(identifier))
            .map(|i| i.as_ref())
            .ok_or_else(|| ApiProbeError::NoIngestorFound(identifier.to_string()))
    }

    /// Dispatch a source to its ingestor. Returns the ingestor name with the endpoints.
    pub fn ingest(&self, source: &IngestSource) -> Result<(&'static str, Vec<Endpoint>), ApiProbeError> {
        let ingestor = self.select(&source.identifier)?;
        debug!(source = %source.identifier, ingestor = ingestor.name(), "Dispatching source");
        let endpoints = ingestor.ingest(source)?;
        info!(source = %source.identifier, ingestor = ingestor.name(), endpoints = endpoints.len(), "Ingested source");
        Ok((ingestor.name(), endpoints))
    }
}

impl Default for IngestorRegistry {
    fn default() -> Self {
        Self::from_config(&IngestorsConfig::default())
    }
}

fn create_ingestor(format: SourceFormat, config: &IngestorsConfig) -> Box<dyn Ingestor> {
    match format {
        SourceFormat::OpenApi => Box::new(OpenApiIngestor::new(config.openapi.versions.clone())),
        SourceFormat::GraphQl => Box::new(GraphQlIngestor::new(config.graphql.endpoint_path.clone())),
        SourceFormat::Postman => Box::new(PostmanIngestor),
        SourceFormat::Har => Box::new(HarIngestor),
        SourceFormat::Gateway => Box::new(GatewayIngestor),
    }
}
