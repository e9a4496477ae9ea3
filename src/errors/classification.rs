use super::types::ApiProbeError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
    /// Fatal errors abort the whole run rather than a single source or probe.
    pub run_fatal: bool,
}

impl ApiProbeError {
    /// Classify this error to determine its type, whether it can be retried,
    /// and whether it ends the run.
    pub fn classify(&self) -> ErrorClassification {
        let (error_type, retryable, run_fatal) = match self {
            // Retryable errors
            ApiProbeError::ProbeNetwork(_) => ("ProbeNetworkError", true, false),
            ApiProbeError::Http(e) => ("HttpError", e.is_connect() || e.is_request(), false),

            // Per-probe, recorded as a terminal state instead of retried
            ApiProbeError::ProbeTimeout(_) => ("ProbeTimeoutError", false, false),
            ApiProbeError::ProbeRequest(_) => ("ProbeRequestError", false, false),

            // Per-source or degraded-mode errors
            ApiProbeError::Ingestion { .. } => ("IngestionError", false, false),
            ApiProbeError::NoIngestorFound(_) => ("NoIngestorFoundError", false, false),
            ApiProbeError::Enrichment(_) => ("EnrichmentWarning", false, false),
            ApiProbeError::EmbeddingUnavailable(_) => ("EmbeddingUnavailableError", false, false),

            // Run-fatal errors
            ApiProbeError::ConfigurationInvalid(_) => ("ConfigurationInvalidError", false, true),
            ApiProbeError::Config(_) => ("ConfigError", false, true),
            ApiProbeError::NoEndpoints => ("NoEndpointsError", false, true),
            ApiProbeError::Cancelled => ("CancelledError", false, true),

            ApiProbeError::Io(_) => ("IoError", false, false),
            ApiProbeError::Json(_) => ("JsonError", false, false),
            ApiProbeError::Yaml(_) => ("YamlError", false, false),
            ApiProbeError::Internal(_) => ("InternalError", false, true),
        };
        ErrorClassification { error_type, retryable, run_fatal }
    }
}
