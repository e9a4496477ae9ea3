use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::errors::ApiProbeError;
use crate::models::{Endpoint, HttpMethod, ParamLocation, ParamType, Parameter, SourceFormat};
use super::{parse_document, require_endpoints, IngestSource, Ingestor};

/// API gateway route tables: Kong declarative config (`services[].routes[]`)
/// or a generic `routes[]` list.
pub struct GatewayIngestor;

impl Ingestor for GatewayIngestor {
    fn name(&self) -> &'static str {
        "gateway"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".gateway.yaml", ".gateway.yml", ".gateway.json", "kong.yaml", "kong.yml"]
    }

    fn ingest(&self, source: &IngestSource) -> Result<Vec<Endpoint>, ApiProbeError> {
        let doc = parse_document(source)?;

        let mut routes: Vec<(Option<String>, &Value)> = Vec::new();
        for service in doc.get("services").and_then(Value::as_array).into_iter().flatten() {
            let service_name = service.get("name").and_then(Value::as_str).map(String::from);
            for route in service.get("routes").and_then(Value::as_array).into_iter().flatten() {
                routes.push((service_name.clone(), route));
            }
        }
        for route in doc.get("routes").and_then(Value::as_array).into_iter().flatten() {
            let service_name = route.get("service").and_then(|s| match s {
                Value::String(name) => Some(name.clone()),
                other => other.get("name").and_then(Value::as_str).map(String::from),
            });
            routes.push((service_name, route));
        }

        if routes.is_empty() && doc.get("services").is_none() && doc.get("routes").is_none() {
            return Err(ApiProbeError::ingestion("expected 'services' or 'routes' in gateway config", &source.content));
        }

        let mut endpoints = Vec::new();
        let mut seen = HashSet::new();
        for (service, route) in routes {
            for endpoint in self.route_endpoints(service.as_deref(), route) {
                if seen.insert(endpoint.key().clone()) {
                    endpoints.push(endpoint);
                }
            }
        }

        debug!(count = endpoints.len(), "Parsed gateway routes");
        require_endpoints(endpoints, source)
    }
}

impl GatewayIngestor {
    fn route_endpoints(&self, service: Option<&str>, route: &Value) -> Vec<Endpoint> {
        let paths = one_or_many(route, "path", "paths");
        let mut methods: Vec<HttpMethod> = one_or_many(route, "method", "methods")
            .iter()
            .filter_map(|m| HttpMethod::parse(m))
            .collect();
        if methods.is_empty() {
            methods.push(HttpMethod::Get);
        }

        let declared = route.get("parameters").and_then(Value::as_array).cloned().unwrap_or_default();
        let route_name = route.get("name").and_then(Value::as_str);

        let mut out = Vec::new();
        for path in paths {
            if path.starts_with('~') {
                debug!(path = %path, "Skipping regex route");
                continue;
            }
            let path = if path.starts_with('/') { path } else { format!("/{}", path) };

            for method in &methods {
                let mut endpoint = Endpoint::new(*method, path.clone(), SourceFormat::Gateway, self.name());
                endpoint.operation_id = route_name.map(String::from);
                endpoint.tags = service.map(|s| vec![s.to_string()]).unwrap_or_default();

                for name in crate::models::path_placeholders(&path) {
                    endpoint.add_parameter(Parameter::new(name, ParamLocation::Path, ParamType::String, true));
                }
                for raw in &declared {
                    let Some(name) = raw.get("name").and_then(Value::as_str) else { continue };
                    let location = raw.get("in").and_then(Value::as_str)
                        .and_then(ParamLocation::parse)
                        .unwrap_or(ParamLocation::Query);
                    let param_type = raw.get("type").and_then(Value::as_str)
                        .map(ParamType::from_type_name)
                        .unwrap_or(ParamType::String);
                    let required = raw.get("required").and_then(Value::as_bool).unwrap_or(false);
                    endpoint.add_parameter(Parameter::new(name, location, param_type, required));
                }
                out.push(endpoint);
            }
        }
        out
    }
}

/// Read a field that may be given as a single string or as a list.
fn one_or_many(value: &Value, single: &str, many: &str) -> Vec<String> {
    let mut out: Vec<String> = value.get(many).and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default();
    if let Some(one) = value.get(single).and_then(Value::as_str) {
        out.insert(0, one.to_string());
    }
    out
}
