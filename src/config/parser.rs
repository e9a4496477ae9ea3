use std::path::Path;
use crate::errors::ApiProbeError;
use super::validator::ValidatedConfig;
use tracing::debug;

const MAX_CONFIG_BYTES: u64 = 1_048_576;

/// Read a YAML or JSON config file and validate it. The file is parsed as
/// YAML, which also accepts JSON.
pub async fn parse_config(path: &Path) -> Result<ValidatedConfig, ApiProbeError> {
    let value = load_config_value(path).await?;
    ValidatedConfig::from_value(&value)
}

/// Read a config file into an untyped tree without validating it.
pub async fn load_config_value(path: &Path) -> Result<serde_json::Value, ApiProbeError> {
    if !path.exists() {
        return Err(ApiProbeError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(ApiProbeError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    let value = parse_config_str(&content)?;
    debug!(path = %path.display(), "Loaded config file");
    Ok(value)
}

pub fn parse_config_str(content: &str) -> Result<serde_json::Value, ApiProbeError> {
    if content.trim().is_empty() {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    serde_json::to_value(yaml)
        .map_err(|e| ApiProbeError::Config(format!("Config conversion error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_parse_config_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dast:\n  max_concurrent: 3\n  timeout: 1500").unwrap();
        let config = parse_config(file.path()).await.unwrap();
        assert_eq!(config.dast.max_concurrent, 3);
        assert_eq!(config.dast.timeout, 1500);
    }

    #[tokio::test]
    async fn test_parse_config_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rag": {{"top_k": 5}}}}"#).unwrap();
        let config = parse_config(file.path()).await.unwrap();
        assert_eq!(config.rag.top_k, 5);
    }

    #[tokio::test]
    async fn test_parse_config_invalid_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dast:\n  max_concurrent: invalid").unwrap();
        let err = parse_config(file.path()).await.unwrap_err();
        assert!(matches!(err, ApiProbeError::ConfigurationInvalid(_)));
    }

    #[tokio::test]
    async fn test_parse_config_missing_file() {
        let err = parse_config(Path::new("/nonexistent/apiprobe.yaml")).await.unwrap_err();
        assert!(matches!(err, ApiProbeError::Config(_)));
    }

    #[test]
    fn test_empty_content_is_empty_object() {
        let value = parse_config_str("  \n").unwrap();
        assert!(value.as_object().unwrap().is_empty());
    }
}
