use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::errors::ApiProbeError;
use crate::models::{Endpoint, HttpMethod, ParamLocation, ParamType, Parameter, SourceFormat};
use super::{parse_document, require_endpoints, IngestSource, Ingestor};

static UUID_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$").unwrap()
});

/// Browser-managed headers that carry no application input.
const BROWSER_HEADERS: &[&str] = &[
    "accept", "accept-encoding", "accept-language", "cache-control", "connection", "content-length",
    "content-type", "cookie", "host", "origin", "pragma", "referer", "user-agent", "upgrade-insecure-requests",
    "dnt", "te", "priority",
];

/// HTTP Archive captures. Concrete URLs are generalized into path templates.
pub struct HarIngestor;

impl Ingestor for HarIngestor {
    fn name(&self) -> &'static str {
        "har"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".har", "application/har+json"]
    }

    fn ingest(&self, source: &IngestSource) -> Result<Vec<Endpoint>, ApiProbeError> {
        let doc = parse_document(source)?;
        let entries = doc.pointer("/log/entries").and_then(Value::as_array)
            .ok_or_else(|| ApiProbeError::ingestion("missing 'log.entries' in HAR archive", &source.content))?;

        let mut endpoints = Vec::new();
        let mut seen = HashSet::new();
        for entry in entries {
            let Some(request) = entry.get("request") else { continue };
            let Some(endpoint) = self.entry_endpoint(request) else { continue };
            // First capture of an identity wins.
            if seen.insert(endpoint.key().clone()) {
                endpoints.push(endpoint);
            }
        }

        debug!(entries = entries.len(), endpoints = endpoints.len(), "Parsed HAR archive");
        require_endpoints(endpoints, source)
    }
}

impl HarIngestor {
    fn entry_endpoint(&self, request: &Value) -> Option<Endpoint> {
        let method = request.get("method").and_then(Value::as_str).and_then(HttpMethod::parse)?;
        let url = request.get("url").and_then(Value::as_str)?;
        let parsed = reqwest::Url::parse(url).ok()?;

        let (path, placeholders) = templatize(parsed.path());
        let mut endpoint = Endpoint::new(method, path, SourceFormat::Har, self.name());
        for (name, sample) in placeholders {
            let param_type = if sample.chars().all(|c| c.is_ascii_digit()) {
                ParamType::Integer
            } else {
                ParamType::String
            };
            endpoint.add_parameter(Parameter::new(name, ParamLocation::Path, param_type, true));
        }

        for (name, value) in parsed.query_pairs() {
            endpoint.add_parameter(Parameter::new(
                name.into_owned(),
                ParamLocation::Query,
                ParamType::infer(&Value::String(value.into_owned())),
                false,
            ));
        }

        for header in request.get("headers").and_then(Value::as_array).into_iter().flatten() {
            let Some(name) = header.get("name").and_then(Value::as_str) else { continue };
            let lower = name.to_ascii_lowercase();
            if lower.starts_with(':') || lower.starts_with("sec-") || BROWSER_HEADERS.contains(&lower.as_str()) {
                continue;
            }
            endpoint.add_parameter(Parameter::new(name, ParamLocation::Header, ParamType::String, false));
        }

        if let Some(post) = request.get("postData") {
            for param in post_data_parameters(post) {
                endpoint.add_parameter(param);
            }
        }

        Some(endpoint)
    }
}

/// Replace numeric and UUID segments with `{id}`, `{id2}`, ... Returns the
/// template and each placeholder with the sample value it replaced.
fn templatize(path: &str) -> (String, Vec<(String, String)>) {
    let mut placeholders = Vec::new();
    let segments: Vec<String> = path.split('/')
        .map(|segment| {
            let is_id = (!segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()))
                || UUID_SEGMENT.is_match(segment);
            if !is_id {
                return segment.to_string();
            }
            let name = if placeholders.is_empty() { "id".to_string() } else { format!("id{}", placeholders.len() + 1) };
            placeholders.push((name.clone(), segment.to_string()));
            format!("{{{}}}", name)
        })
        .collect();
    let template = segments.join("/");
    let template = if template.is_empty() { "/".to_string() } else { template };
    (template, placeholders)
}

fn post_data_parameters(post: &Value) -> Vec<Parameter> {
    let from_params: Vec<Parameter> = post.get("params").and_then(Value::as_array).into_iter().flatten()
        .filter_map(|p| {
            let name = p.get("name").and_then(Value::as_str)?;
            let value = p.get("value").and_then(Value::as_str).unwrap_or("");
            Some(Parameter::new(name, ParamLocation::Body, ParamType::infer(&Value::String(value.to_string())), false))
        })
        .collect();
    if !from_params.is_empty() {
        return from_params;
    }

    let text = post.get("text").and_then(Value::as_str).unwrap_or("");
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(fields)) => fields.iter()
            .map(|(name, value)| Parameter::new(name.clone(), ParamLocation::Body, ParamType::infer(value), false))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn archive() -> String {
        json!({"log": {"version": "1.2", "entries": [
            {"request": {"method": "GET", "url": "https://shop.test/api/orders/42?verbose=1",
                "headers": [{"name": "User-Agent", "value": "x"}, {"name": "X-Api-Key", "value": "k"}, {"name": ":authority", "value": "shop.test"}]}},
            {"request": {"method": "GET", "url": "https://shop.test/api/orders/43?verbose=0"}},
            {"request": {"method": "POST", "url": "https://shop.test/api/users/3f2504e0-4f89-11d3-9a0c-0305e82c3301/items/7",
                "postData": {"mimeType": "application/json", "text": "{\"qty\": 2, \"note\": \"hi\"}"}}},
            {"request": {"method": "POST", "url": "https://shop.test/login",
                "postData": {"mimeType": "application/x-www-form-urlencoded", "params": [{"name": "user", "value": "a"}]}}}
        ]}})
        .to_string()
    }

    fn ingest() -> Vec<Endpoint> {
        HarIngestor.ingest(&IngestSource::new("session.har", archive())).unwrap()
    }

    #[test]
    fn test_ids_templated_and_deduplicated() {
        let endpoints = ingest();
        let paths: Vec<&str> = endpoints.iter().map(|e| e.path()).collect();
        assert_eq!(paths, vec!["/api/orders/{id}", "/api/users/{id}/items/{id2}", "/login"]);
        assert_eq!(endpoints[0].parameter("id", ParamLocation::Path).unwrap().param_type, ParamType::Integer);
        assert_eq!(endpoints[1].parameter("id", ParamLocation::Path).unwrap().param_type, ParamType::String);
    }

    #[test]
    fn test_first_entry_wins() {
        let endpoints = ingest();
        let verbose = endpoints[0].parameter("verbose", ParamLocation::Query).unwrap();
        assert_eq!(verbose.param_type, ParamType::Integer);
        assert!(endpoints[0].parameter("X-Api-Key", ParamLocation::Header).is_some());
        assert!(endpoints[0].parameter("User-Agent", ParamLocation::Header).is_none());
        assert_eq!(endpoints[0].parameters_in(ParamLocation::Header).count(), 1);
    }

    #[test]
    fn test_post_data_params() {
        let endpoints = ingest();
        assert_eq!(endpoints[1].parameter("qty", ParamLocation::Body).unwrap().param_type, ParamType::Integer);
        assert!(endpoints[2].parameter("user", ParamLocation::Body).is_some());
    }

    #[test]
    fn test_missing_entries_rejected() {
        assert!(HarIngestor.ingest(&IngestSource::new("x.har", r#"{"log": {}}"#)).is_err());
    }

    #[test]
    fn test_templatize_root() {
        assert_eq!(templatize("/").0, "/");
        assert_eq!(templatize("/v2/items").0, "/v2/items");
    }
}
