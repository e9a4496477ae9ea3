use std::ops::Deref;
use std::sync::Arc;

use reqwest::header::{HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use crate::errors::ApiProbeError;
use super::schema::CONFIG_SCHEMA;
use super::security::check_security_patterns;
use super::types::ApiProbeConfig;
use tracing::debug;

/// Outcome of validating a configuration tree.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self { valid: errors.is_empty(), errors }
    }
}

/// Validate a raw configuration tree: JSON schema, security patterns, typed
/// deserialization and semantic checks. All problems are collected.
pub fn validate(value: &Value) -> ValidationReport {
    let (report, _) = validate_and_parse(value);
    report
}

fn validate_and_parse(value: &Value) -> (ValidationReport, Option<ApiProbeConfig>) {
    let empty = Value::Object(Default::default());
    let value = if value.is_null() { &empty } else { value };

    let mut errors = validate_schema(value);
    errors.extend(check_security_patterns(value));

    // Type errors are already reported by the schema; only parse a clean tree.
    if !errors.is_empty() {
        return (ValidationReport::from_errors(errors), None);
    }

    let config: ApiProbeConfig = match serde_json::from_value(value.clone()) {
        Ok(c) => c,
        Err(e) => {
            errors.push(format!("Config conversion error: {}", e));
            return (ValidationReport::from_errors(errors), None);
        }
    };

    errors.extend(validate_semantics(&config));
    let report = ValidationReport::from_errors(errors);
    let config = report.valid.then_some(config);
    (report, config)
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(value: &Value) -> Vec<String> {
    let compiled = match jsonschema::JSONSchema::compile(&CONFIG_SCHEMA) {
        Ok(c) => c,
        Err(e) => return vec![format!("Schema compilation error: {}", e)],
    };

    let result = compiled.validate(value);
    match result {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| {
                let path = e.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                format!("{} at {}", e, path)
            })
            .collect(),
    }
}

/// Checks the schema cannot express.
fn validate_semantics(config: &ApiProbeConfig) -> Vec<String> {
    let mut errors = Vec::new();

    let ingestors = &config.ingestors;
    if !ingestors.priority.iter().any(|f| ingestors.is_enabled(*f)) {
        errors.push("No enabled ingestor appears in ingestors.priority".to_string());
    }

    let table = &config.rag.confidence_table;
    if table.windows(2).any(|w| w[0][0] >= w[1][0]) {
        errors.push("rag.confidence_table similarities must be strictly increasing".to_string());
    }

    for (name, value) in &config.dast.custom_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(format!("dast.custom_headers: invalid header name '{}'", name));
        }
        if HeaderValue::from_str(value).is_err() {
            errors.push(format!("dast.custom_headers: invalid value for header '{}'", name));
        }
    }

    let discovery = &config.enrichment.code_discovery;
    if discovery.enabled && config.enrichment.workspace.is_none() {
        errors.push("enrichment.code_discovery requires enrichment.workspace".to_string());
    }

    debug!(errors = errors.len(), "Semantic config validation finished");
    errors
}

/// A configuration that passed validation. The pipeline only accepts this type,
/// so no stage can start from an invalid tree.
#[derive(Debug, Clone)]
pub struct ValidatedConfig(Arc<ApiProbeConfig>);

impl ValidatedConfig {
    pub fn from_value(value: &Value) -> Result<Self, ApiProbeError> {
        let (report, config) = validate_and_parse(value);
        match config {
            Some(config) if report.valid => Ok(Self(Arc::new(config))),
            _ => Err(ApiProbeError::ConfigurationInvalid(report.errors)),
        }
    }

    /// Validate an already-typed config (e.g. built in code or from CLI flags).
    pub fn from_config(config: ApiProbeConfig) -> Result<Self, ApiProbeError> {
        let value = serde_json::to_value(&config)?;
        Self::from_value(&value)
    }

    pub fn shared(&self) -> Arc<ApiProbeConfig> {
        self.0.clone()
    }
}

impl Deref for ValidatedConfig {
    type Target = ApiProbeConfig;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_config_is_valid() {
        let report = validate(&json!({}));
        assert!(report.valid, "{:?}", report.errors);
        assert!(validate(&Value::Null).valid);
    }

    #[test]
    fn test_max_concurrent_wrong_type_rejected() {
        let report = validate(&json!({"dast": {"max_concurrent": "invalid"}}));
        assert!(!report.valid);
        assert!(!report.errors.is_empty());
        assert!(report.errors.iter().any(|e| e.contains("/dast/max_concurrent")));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let report = validate(&json!({"rag": {"confidence_threshold": 1.5}}));
        assert!(!report.valid);
    }

    #[test]
    fn test_unknown_section_rejected() {
        let report = validate(&json!({"dats": {}}));
        assert!(!report.valid);
    }

    #[test]
    fn test_unknown_vuln_class_rejected() {
        let report = validate(&json!({"dast": {"vulnerability_classes": ["sqli"]}}));
        assert!(!report.valid);
    }

    #[test]
    fn test_unsorted_confidence_table_rejected() {
        let report = validate(&json!({"rag": {"confidence_table": [[0.5, 0.2], [0.4, 0.9]]}}));
        assert!(!report.valid);
        assert!(report.errors[0].contains("strictly increasing"));
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let report = validate(&json!({"dast": {"custom_headers": {"Bad Header": "x"}}}));
        assert!(!report.valid);
    }

    #[test]
    fn test_code_discovery_requires_workspace() {
        let report = validate(&json!({"enrichment": {"code_discovery": {"enabled": true}}}));
        assert!(!report.valid);
    }

    #[test]
    fn test_all_ingestors_disabled_rejected() {
        let report = validate(&json!({"ingestors": {"priority": ["har"], "har": {"enabled": false}}}));
        assert!(!report.valid);
    }

    #[test]
    fn test_full_config_valid() {
        let report = validate(&json!({
            "ingestors": {"openapi": {"enabled": true, "versions": ["3.0"]}},
            "enrichment": {"source_maps": true, "code_discovery": {"enabled": false, "safe_mode": true}},
            "rag": {
                "embedding_model": "text-embedding-3-small",
                "documentation_sources": ["https://docs.example.com/api"],
                "confidence_threshold": 0.7
            },
            "dast": {
                "max_concurrent": 5,
                "timeout": 3000,
                "follow_redirects": true,
                "custom_headers": {"Authorization": "Bearer token"}
            }
        }));
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn test_validated_config_refuses_invalid() {
        let err = ValidatedConfig::from_value(&json!({"dast": {"max_concurrent": "invalid"}})).unwrap_err();
        match err {
            ApiProbeError::ConfigurationInvalid(errors) => assert!(!errors.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validated_config_from_default_config() {
        let config = ValidatedConfig::from_config(ApiProbeConfig::default()).unwrap();
        assert_eq!(config.dast.max_concurrent, 10);
    }
}
