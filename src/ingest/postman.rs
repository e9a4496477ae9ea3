use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::errors::ApiProbeError;
use crate::models::{Endpoint, EndpointKey, HttpMethod, ParamLocation, ParamType, Parameter, SourceFormat};
use super::{parse_document, require_endpoints, IngestSource, Ingestor};

static TEMPLATE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{\{\s*([^}]+?)\s*\}\}$").expect("valid regex")
});

const SKIPPED_HEADERS: &[&str] = &["content-type", "content-length", "host"];

/// Postman collection v2.x exports.
pub struct PostmanIngestor;

impl Ingestor for PostmanIngestor {
    fn name(&self) -> &'static str {
        "postman"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".postman_collection.json", ".postman.json", "application/vnd.postman.collection+json"]
    }

    fn ingest(&self, source: &IngestSource) -> Result<Vec<Endpoint>, ApiProbeError> {
        let doc = parse_document(source)?;
        if doc.get("info").is_none() {
            return Err(ApiProbeError::ingestion("missing 'info' in Postman collection", &source.content));
        }
        let items = doc.get("item").and_then(Value::as_array)
            .ok_or_else(|| ApiProbeError::ingestion("missing 'item' array in Postman collection", &source.content))?;

        let mut endpoints = Vec::new();
        let mut seen = HashSet::new();
        self.walk(items, &[], &mut endpoints, &mut seen);

        debug!(count = endpoints.len(), "Parsed Postman collection");
        require_endpoints(endpoints, source)
    }
}

impl PostmanIngestor {
    fn walk(&self, items: &[Value], folders: &[String], out: &mut Vec<Endpoint>, seen: &mut HashSet<EndpointKey>) {
        for item in items {
            if let Some(children) = item.get("item").and_then(Value::as_array) {
                let mut path = folders.to_vec();
                if let Some(name) = item.get("name").and_then(Value::as_str) {
                    path.push(name.to_string());
                }
                self.walk(children, &path, out, seen);
                continue;
            }

            let Some(request) = item.get("request") else { continue };
            if let Some(endpoint) = self.request_endpoint(item, request, folders) {
                if seen.insert(endpoint.key().clone()) {
                    out.push(endpoint);
                }
            }
        }
    }

    fn request_endpoint(&self, item: &Value, request: &Value, folders: &[String]) -> Option<Endpoint> {
        // A request may be a bare URL string, meaning GET.
        let (method, url) = match request {
            Value::String(url) => (HttpMethod::Get, Value::String(url.clone())),
            _ => {
                let method = request.get("method").and_then(Value::as_str).and_then(HttpMethod::parse)
                    .unwrap_or(HttpMethod::Get);
                (method, request.get("url").cloned().unwrap_or(Value::Null))
            }
        };

        let (path, query) = url_parts(&url)?;
        let mut endpoint = Endpoint::new(method, path.clone(), SourceFormat::Postman, self.name());
        endpoint.summary = item.get("name").and_then(Value::as_str).map(String::from);
        endpoint.tags = folders.to_vec();

        for name in crate::models::path_placeholders(&path) {
            endpoint.add_parameter(Parameter::new(name, ParamLocation::Path, ParamType::String, true));
        }
        for (name, value) in query {
            endpoint.add_parameter(Parameter::new(name, ParamLocation::Query, infer_text(&value), false));
        }

        for header in request.get("header").and_then(Value::as_array).into_iter().flatten() {
            if header.get("disabled").and_then(Value::as_bool) == Some(true) {
                continue;
            }
            let Some(key) = header.get("key").and_then(Value::as_str) else { continue };
            if SKIPPED_HEADERS.contains(&key.to_ascii_lowercase().as_str()) {
                continue;
            }
            endpoint.add_parameter(Parameter::new(key, ParamLocation::Header, ParamType::String, false));
        }

        if let Some(body) = request.get("body") {
            for param in body_parameters(body) {
                endpoint.add_parameter(param);
            }
        }

        Some(endpoint)
    }
}

/// Path template and query pairs from a Postman URL (string or object form).
fn url_parts(url: &Value) -> Option<(String, Vec<(String, String)>)> {
    match url {
        Value::String(raw) => Some(split_raw_url(raw)),
        Value::Object(obj) => {
            let segments: Option<Vec<String>> = obj.get("path").and_then(Value::as_array)
                .map(|p| p.iter().filter_map(Value::as_str).map(String::from).collect());
            match segments {
                Some(segments) => {
                    let path = normalize_segments(segments.iter().map(String::as_str));
                    let query = obj.get("query").and_then(Value::as_array).into_iter().flatten()
                        .filter(|q| q.get("disabled").and_then(Value::as_bool) != Some(true))
                        .filter_map(|q| {
                            let key = q.get("key").and_then(Value::as_str)?;
                            let value = q.get("value").and_then(Value::as_str).unwrap_or("");
                            Some((key.to_string(), value.to_string()))
                        })
                        .collect();
                    Some((path, query))
                }
                None => obj.get("raw").and_then(Value::as_str).map(split_raw_url),
            }
        }
        _ => None,
    }
}

fn split_raw_url(raw: &str) -> (String, Vec<(String, String)>) {
    let (before_query, query) = match raw.split_once('?') {
        Some((b, q)) => (b, q),
        None => (raw, ""),
    };
    let without_scheme = before_query.split_once("://").map(|(_, rest)| rest).unwrap_or(before_query);

    // The first segment is the host (or a `{{baseUrl}}` variable) unless the URL is already a path.
    let mut segments = without_scheme.split('/');
    if !without_scheme.starts_with('/') {
        segments.next();
    }
    let path = normalize_segments(segments);

    let query = query.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect();
    (path, query)
}

/// Convert `:id` and `{{id}}` segments into `{id}` placeholders.
fn normalize_segments<'a>(segments: impl Iterator<Item = &'a str>) -> String {
    let parts: Vec<String> = segments
        .filter(|s| !s.is_empty())
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{}}}", name)
            } else if let Some(caps) = TEMPLATE_VAR.captures(segment) {
                format!("{{{}}}", &caps[1])
            } else {
                segment.to_string()
            }
        })
        .collect();
    format!("/{}", parts.join("/"))
}

fn body_parameters(body: &Value) -> Vec<Parameter> {
    let mode = body.get("mode").and_then(Value::as_str).unwrap_or("");
    match mode {
        "raw" => {
            let raw = body.get("raw").and_then(Value::as_str).unwrap_or("");
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(fields)) => fields.iter()
                    .map(|(name, value)| {
                        Parameter::new(name.clone(), ParamLocation::Body, ParamType::infer(value), false)
                    })
                    .collect(),
                _ => Vec::new(),
            }
        }
        "urlencoded" | "formdata" => body.get(mode).and_then(Value::as_array).into_iter().flatten()
            .filter(|f| f.get("disabled").and_then(Value::as_bool) != Some(true))
            .filter_map(|f| {
                let key = f.get("key").and_then(Value::as_str)?;
                let value = f.get("value").and_then(Value::as_str).unwrap_or("");
                Some(Parameter::new(key, ParamLocation::Body, infer_text(value), false))
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn infer_text(value: &str) -> ParamType {
    ParamType::infer(&Value::String(value.to_string()))
}
