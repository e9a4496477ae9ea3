use serde_json::Value;
use tracing::debug;

use crate::errors::ApiProbeError;
use crate::models::{Endpoint, GraphQlOperation, HttpMethod, ParamLocation, ParamType, Parameter, SourceFormat};
use super::{parse_document, require_endpoints, IngestSource, Ingestor};

/// GraphQL introspection results (`{"data": {"__schema": ...}}` or a bare `__schema`).
pub struct GraphQlIngestor {
    endpoint_path: String,
}

impl GraphQlIngestor {
    pub fn new(endpoint_path: impl Into<String>) -> Self {
        Self { endpoint_path: endpoint_path.into() }
    }
}

impl Default for GraphQlIngestor {
    fn default() -> Self {
        Self::new("/graphql")
    }
}

impl Ingestor for GraphQlIngestor {
    fn name(&self) -> &'static str {
        "graphql"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".graphql.json", ".introspection.json", "application/graphql-response+json"]
    }

    fn ingest(&self, source: &IngestSource) -> Result<Vec<Endpoint>, ApiProbeError> {
        let doc = parse_document(source)?;
        let schema = doc.pointer("/data/__schema")
            .or_else(|| doc.get("__schema"))
            .ok_or_else(|| ApiProbeError::ingestion("missing '__schema' in introspection result", &source.content))?;

        let types = schema.get("types").and_then(Value::as_array)
            .ok_or_else(|| ApiProbeError::ingestion("introspection schema has no 'types'", &source.content))?;

        let roots = [
            ("query", schema.pointer("/queryType/name")),
            ("mutation", schema.pointer("/mutationType/name")),
        ];

        let mut endpoints = Vec::new();
        for (operation_type, root_name) in roots {
            let Some(root_name) = root_name.and_then(Value::as_str) else { continue };
            let Some(root) = types.iter().find(|t| t.get("name").and_then(Value::as_str) == Some(root_name)) else {
                debug!(root = root_name, "Root type missing from introspection types");
                continue;
            };

            for field in root.get("fields").and_then(Value::as_array).into_iter().flatten() {
                let Some(field_name) = field.get("name").and_then(Value::as_str) else { continue };
                if field_name.starts_with("__") {
                    continue;
                }
                endpoints.push(self.field_endpoint(operation_type, field_name, field));
            }
        }

        debug!(count = endpoints.len(), "Parsed GraphQL introspection");
        require_endpoints(endpoints, source)
    }
}

impl GraphQlIngestor {
    fn field_endpoint(&self, operation_type: &str, field_name: &str, field: &Value) -> Endpoint {
        let path = format!("{}#{}.{}", self.endpoint_path, operation_type, field_name);
        let mut endpoint = Endpoint::new(HttpMethod::Post, path, SourceFormat::GraphQl, self.name());
        endpoint.operation_id = Some(field_name.to_string());
        endpoint.summary = field.get("description").and_then(Value::as_str).map(String::from);
        endpoint.tags = vec![operation_type.to_string()];

        let mut argument_types = Vec::new();
        for arg in field.get("args").and_then(Value::as_array).into_iter().flatten() {
            let Some(name) = arg.get("name").and_then(Value::as_str) else { continue };
            let type_ref = arg.get("type").unwrap_or(&Value::Null);
            let (param_type, required) = param_type_of(type_ref);
            endpoint.add_parameter(Parameter::new(name, ParamLocation::Body, param_type, required));
            argument_types.push((name.to_string(), type_literal(type_ref)));
        }

        endpoint.graphql = Some(GraphQlOperation {
            operation_type: operation_type.to_string(),
            field: field_name.to_string(),
            argument_types,
        });
        endpoint
    }
}

/// Render an introspection type reference as a GraphQL type literal (`[ID!]!`).
pub fn type_literal(type_ref: &Value) -> String {
    let kind = type_ref.get("kind").and_then(Value::as_str).unwrap_or("");
    let inner = type_ref.get("ofType").unwrap_or(&Value::Null);
    match kind {
        "NON_NULL" => format!("{}!", type_literal(inner)),
        "LIST" => format!("[{}]", type_literal(inner)),
        _ => type_ref.get("name").and_then(Value::as_str).unwrap_or("String").to_string(),
    }
}

/// Unwrap NON_NULL/LIST wrappers into a ParamType and required flag.
fn param_type_of(type_ref: &Value) -> (ParamType, bool) {
    let mut current = type_ref;
    let required = current.get("kind").and_then(Value::as_str) == Some("NON_NULL");
    if required {
        current = current.get("ofType").unwrap_or(&Value::Null);
    }

    match current.get("kind").and_then(Value::as_str).unwrap_or("SCALAR") {
        "LIST" => (ParamType::Array, required),
        "INPUT_OBJECT" => (ParamType::Object, required),
        "ENUM" => (ParamType::String, required),
        _ => {
            let name = current.get("name").and_then(Value::as_str).unwrap_or("String");
            (ParamType::from_type_name(name), required)
        }
    }
}
