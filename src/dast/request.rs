use std::collections::BTreeMap;

use reqwest::Url;
use serde_json::{json, Map, Value};

use crate::config::credentials::resolve_credential;
use crate::errors::ApiProbeError;
use crate::models::{
    Endpoint, GraphQlOperation, ParamLocation, ParamType, Parameter, Payload, RequestDescriptor,
};
use crate::payloads::benign_value;

/// Builds concrete requests against one target base URL.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base: Url,
    headers: BTreeMap<String, String>,
}

impl RequestBuilder {
    /// Header values may reference the environment (`$TOKEN`); unresolved ones are skipped.
    pub fn new(base_url: &str, custom_headers: &BTreeMap<String, String>) -> Result<Self, ApiProbeError> {
        let base = Url::parse(base_url)
            .map_err(|e| ApiProbeError::Config(format!("invalid target URL '{}': {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ApiProbeError::Config(format!("target URL '{}' cannot carry a path", base_url)));
        }
        let headers = custom_headers.iter()
            .filter_map(|(name, value)| resolve_credential(value).map(|v| (name.to_ascii_lowercase(), v)))
            .collect();
        Ok(Self { base, headers })
    }

    /// Request carrying benign values only.
    pub fn baseline(&self, endpoint: &Endpoint) -> Result<RequestDescriptor, ApiProbeError> {
        self.build(endpoint, None)
    }

    /// Request with `payload` in its target parameter and benign values elsewhere.
    pub fn attack(&self, endpoint: &Endpoint, payload: &Payload) -> Result<RequestDescriptor, ApiProbeError> {
        self.build(endpoint, Some(payload))
    }

    fn build(&self, endpoint: &Endpoint, payload: Option<&Payload>) -> Result<RequestDescriptor, ApiProbeError> {
        let mut url = self.base.clone();
        let template = endpoint.request_path();

        {
            let mut segments = url.path_segments_mut()
                .map_err(|_| ApiProbeError::Config(format!("target URL '{}' cannot carry a path", self.base)))?;
            segments.pop_if_empty();
            for segment in template.split('/').filter(|s| !s.is_empty()) {
                segments.push(&substitute_segment(segment, endpoint, payload));
            }
        }

        let query: Vec<(String, String)> = endpoint.parameters_in(ParamLocation::Query)
            .filter_map(|p| value_for(p, payload).map(|v| (p.name.clone(), render(&v))))
            .collect();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut headers = self.headers.clone();
        for param in endpoint.parameters_in(ParamLocation::Header) {
            if let Some(value) = value_for(param, payload) {
                headers.insert(param.name.to_ascii_lowercase(), render(&value));
            }
        }

        let body = match &endpoint.graphql {
            Some(op) => Some(graphql_body(op, endpoint, payload)),
            None => json_body(endpoint, payload),
        };
        if body.is_some() {
            headers.entry("content-type".to_string()).or_insert_with(|| "application/json".to_string());
        }

        Ok(RequestDescriptor {
            method: endpoint.method(),
            url: url.to_string(),
            headers,
            body,
        })
    }
}

fn is_target(param: &Parameter, payload: Option<&Payload>) -> bool {
    payload.is_some_and(|p| p.parameter == param.name && p.location == param.location)
}

/// The value to send for `param`, or `None` to omit it.
fn value_for(param: &Parameter, payload: Option<&Payload>) -> Option<Value> {
    match payload {
        Some(p) if is_target(param, payload) => Some(attack_value(&param.param_type, &p.value)),
        _ if param.required => Some(benign_value(&param.param_type)),
        _ => None,
    }
}

/// Structured parameters take the attack string as JSON when it parses.
fn attack_value(param_type: &ParamType, raw: &str) -> Value {
    if matches!(param_type, ParamType::Object | ParamType::Array) {
        if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
            return parsed;
        }
    }
    Value::String(raw.to_string())
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn substitute_segment(segment: &str, endpoint: &Endpoint, payload: Option<&Payload>) -> String {
    let mut out = String::new();
    let mut rest = segment;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else { break };
        out.push_str(&rest[..start]);
        let name = &rest[start + 1..start + len];
        let value = endpoint.parameter(name, ParamLocation::Path)
            .map(|p| {
                let mut p = p.clone();
                // Path placeholders are always filled.
                p.required = true;
                value_for(&p, payload).map(|v| render(&v)).unwrap_or_default()
            })
            .unwrap_or_else(|| render(&benign_value(&ParamType::String)));
        out.push_str(&value);
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

fn json_body(endpoint: &Endpoint, payload: Option<&Payload>) -> Option<Value> {
    let mut params = endpoint.parameters_in(ParamLocation::Body).peekable();
    params.peek()?;
    let object: Map<String, Value> = params
        .filter_map(|p| value_for(p, payload).map(|v| (p.name.clone(), v)))
        .collect();
    Some(Value::Object(object))
}

/// `{query, variables}` document invoking the single field behind `op`.
fn graphql_body(op: &GraphQlOperation, endpoint: &Endpoint, payload: Option<&Payload>) -> Value {
    let mut declarations = Vec::new();
    let mut arguments = Vec::new();
    let mut variables = Map::new();

    for (name, type_literal) in &op.argument_types {
        let value = match endpoint.parameter(name, ParamLocation::Body) {
            Some(param) => value_for(param, payload),
            None => None,
        };
        if let Some(value) = value {
            declarations.push(format!("${}: {}", name, type_literal));
            arguments.push(format!("{}: ${}", name, name));
            variables.insert(name.clone(), value);
        }
    }

    let query = if arguments.is_empty() {
        format!("{} {{ {} {{ __typename }} }}", op.operation_type, op.field)
    } else {
        format!(
            "{} ApiProbe({}) {{ {}({}) {{ __typename }} }}",
            op.operation_type,
            declarations.join(", "),
            op.field,
            arguments.join(", "),
        )
    };
    json!({ "query": query, "variables": variables })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, SourceFormat, VulnClass};

    fn payload(parameter: &str, location: ParamLocation, value: &str) -> Payload {
        Payload {
            class: VulnClass::Injection,
            parameter: parameter.into(),
            location,
            value: value.into(),
            reflection_signatures: vec![],
            expected_delay_ms: None,
            template: "test".into(),
        }
    }

    fn users_endpoint() -> Endpoint {
        let mut ep = Endpoint::new(HttpMethod::Put, "/users/{id}", SourceFormat::OpenApi, "openapi");
        ep.add_parameter(Parameter::new("id", ParamLocation::Path, ParamType::Integer, true));
        ep.add_parameter(Parameter::new("q", ParamLocation::Query, ParamType::String, true));
        ep.add_parameter(Parameter::new("page", ParamLocation::Query, ParamType::Integer, false));
        ep.add_parameter(Parameter::new("X-Trace", ParamLocation::Header, ParamType::String, false));
        ep.add_parameter(Parameter::new("name", ParamLocation::Body, ParamType::String, true));
        ep.add_parameter(Parameter::new("tags", ParamLocation::Body, ParamType::Array, false));
        ep
    }

    #[test]
    fn test_baseline_uses_benign_values_for_required_only() {
        let builder = RequestBuilder::new("http://localhost:8080/api/", &BTreeMap::new()).unwrap();
        let req = builder.baseline(&users_endpoint()).unwrap();
        assert_eq!(req.method, HttpMethod::Put);
        assert_eq!(req.url, "http://localhost:8080/api/users/1?q=apiprobe");
        assert_eq!(req.body, Some(json!({"name": "apiprobe"})));
        assert_eq!(req.headers.get("content-type").map(String::as_str), Some("application/json"));
        assert!(!req.headers.contains_key("x-trace"));
    }

    #[test]
    fn test_attack_value_percent_encoded() {
        let builder = RequestBuilder::new("http://localhost", &BTreeMap::new()).unwrap();
        let ep = users_endpoint();

        let req = builder.attack(&ep, &payload("q", ParamLocation::Query, "'; DROP TABLE users; --")).unwrap();
        let url = Url::parse(&req.url).unwrap();
        let q: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(q, vec![("q".to_string(), "'; DROP TABLE users; --".to_string())]);

        let req = builder.attack(&ep, &payload("id", ParamLocation::Path, "1 OR 1=1")).unwrap();
        assert!(req.url.starts_with("http://localhost/users/1%20OR%201=1"));
    }

    #[test]
    fn test_header_params_override_custom_headers() {
        let custom = BTreeMap::from([
            ("X-Trace".to_string(), "static".to_string()),
            ("Authorization".to_string(), "Bearer abc".to_string()),
        ]);
        let builder = RequestBuilder::new("http://localhost", &custom).unwrap();
        let ep = users_endpoint();

        let base = builder.baseline(&ep).unwrap();
        assert_eq!(base.headers.get("x-trace").map(String::as_str), Some("static"));

        let req = builder.attack(&ep, &payload("X-Trace", ParamLocation::Header, "$(id)")).unwrap();
        assert_eq!(req.headers.get("x-trace").map(String::as_str), Some("$(id)"));
        assert_eq!(req.headers.get("authorization").map(String::as_str), Some("Bearer abc"));
    }

    #[test]
    fn test_structured_payload_parsed_as_json() {
        let builder = RequestBuilder::new("http://localhost", &BTreeMap::new()).unwrap();
        let req = builder.attack(&users_endpoint(), &payload("tags", ParamLocation::Body, r#"{"$ne": null}"#)).unwrap();
        assert_eq!(req.body, Some(json!({"name": "apiprobe", "tags": {"$ne": null}})));
    }

    #[test]
    fn test_graphql_request_document() {
        let mut ep = Endpoint::new(HttpMethod::Post, "/graphql#query.user", SourceFormat::GraphQl, "graphql");
        ep.add_parameter(Parameter::new("id", ParamLocation::Body, ParamType::String, true));
        ep.add_parameter(Parameter::new("filter", ParamLocation::Body, ParamType::String, false));
        ep.graphql = Some(GraphQlOperation {
            operation_type: "query".into(),
            field: "user".into(),
            argument_types: vec![("id".into(), "ID!".into()), ("filter".into(), "String".into())],
        });

        let builder = RequestBuilder::new("http://localhost", &BTreeMap::new()).unwrap();
        let req = builder.baseline(&ep).unwrap();
        assert_eq!(req.url, "http://localhost/graphql");
        assert_eq!(req.body, Some(json!({
            "query": "query ApiProbe($id: ID!) { user(id: $id) { __typename } }",
            "variables": {"id": "apiprobe"}
        })));

        let req = builder.attack(&ep, &payload("filter", ParamLocation::Body, "' OR '1'='1")).unwrap();
        let body = req.body.unwrap();
        assert_eq!(body["variables"]["filter"], json!("' OR '1'='1"));
        assert!(body["query"].as_str().unwrap().contains("$filter: String"));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(
            RequestBuilder::new("not a url", &BTreeMap::new()),
            Err(ApiProbeError::Config(_))
        ));
    }
}
