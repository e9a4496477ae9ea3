use std::collections::HashSet;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::errors::ApiProbeError;
use crate::models::{Endpoint, HttpMethod, ParamLocation, ParamType, Parameter, ResponseSchema, SourceFormat};
use super::{parse_document, require_endpoints, IngestSource, Ingestor};

const METHODS: &[&str] = &["get", "put", "post", "delete", "options", "head", "patch", "trace"];
const MAX_REF_DEPTH: usize = 32;
/// Carries a type name that has no JSON-Schema equivalent.
const TYPE_EXTENSION: &str = "x-apiprobe-type";
static NULL: Value = Value::Null;

/// OpenAPI 3.x and Swagger 2.0 documents.
pub struct OpenApiIngestor {
    versions: Vec<String>,
}

impl OpenApiIngestor {
    pub fn new(versions: Vec<String>) -> Self {
        Self { versions }
    }

    fn check_version(&self, doc: &Value, source: &IngestSource) -> Result<String, ApiProbeError> {
        let version = doc.get("openapi")
            .or_else(|| doc.get("swagger"))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| ApiProbeError::ingestion("missing 'openapi' or 'swagger' version field", &source.content))?;

        if !self.versions.iter().any(|accepted| version.starts_with(accepted.as_str())) {
            return Err(ApiProbeError::ingestion(
                format!("unsupported OpenAPI version {} (accepted: {})", version, self.versions.join(", ")),
                &source.content,
            ));
        }
        Ok(version)
    }
}

impl Default for OpenApiIngestor {
    fn default() -> Self {
        Self::new(vec!["2.0".into(), "3.0".into(), "3.1".into()])
    }
}

impl Ingestor for OpenApiIngestor {
    fn name(&self) -> &'static str {
        "openapi"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[
            ".openapi.json", ".openapi.yaml", ".openapi.yml", ".swagger.json", ".swagger.yaml",
            ".json", ".yaml", ".yml",
            "application/vnd.oai.openapi", "application/vnd.oai.openapi+json",
        ]
    }

    fn ingest(&self, source: &IngestSource) -> Result<Vec<Endpoint>, ApiProbeError> {
        let doc = parse_document(source)?;
        if !doc.is_object() {
            return Err(ApiProbeError::ingestion("document root is not an object", &source.content));
        }
        let version = self.check_version(&doc, source)?;
        let swagger2 = version.starts_with('2');

        let paths = doc.get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| ApiProbeError::ingestion("missing 'paths' object", &source.content))?;

        let resolver = RefResolver { root: &doc };
        let global_produces = string_list(doc.get("produces"));
        let base_path = if swagger2 {
            doc.get("basePath").and_then(Value::as_str).map(|b| b.trim_end_matches('/')).unwrap_or("")
        } else {
            ""
        };

        let mut endpoints = Vec::new();
        for (raw_path, path_item) in paths {
            let path_item = resolver.resolve(path_item);
            let Some(item) = path_item.as_object() else { continue };
            let path = format!("{}{}", base_path, raw_path);

            let path_params: &[Value] = item.get("parameters")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            for method_name in METHODS {
                let Some(operation) = item.get(*method_name).and_then(Value::as_object) else { continue };
                let Some(method) = HttpMethod::parse(method_name) else { continue };

                let mut endpoint = Endpoint::new(method, path.clone(), SourceFormat::OpenApi, self.name());
                endpoint.summary = operation.get("summary").and_then(Value::as_str).map(String::from);
                endpoint.operation_id = operation.get("operationId").and_then(Value::as_str).map(String::from);
                endpoint.tags = string_list(operation.get("tags"));

                // Path-level first so operation-level entries replace them.
                let op_params: &[Value] = operation.get("parameters")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                for raw in path_params.iter().chain(op_params.iter()) {
                    for param in resolver.parameters(raw) {
                        endpoint.add_parameter(param);
                    }
                }

                if let Some(body) = operation.get("requestBody") {
                    for param in resolver.request_body(body) {
                        endpoint.add_parameter(param);
                    }
                }

                for placeholder in crate::models::path_placeholders(&path) {
                    if endpoint.parameter(&placeholder, ParamLocation::Path).is_none() {
                        let param = Parameter::new(placeholder, ParamLocation::Path, ParamType::String, true);
                        endpoint.add_parameter(param);
                    }
                }

                let produces = {
                    let op = string_list(operation.get("produces"));
                    if op.is_empty() { global_produces.clone() } else { op }
                };
                if let Some(responses) = operation.get("responses").and_then(Value::as_object) {
                    for (status, response) in responses {
                        endpoint.responses.extend(resolver.responses(status, response, &produces));
                    }
                }

                endpoints.push(endpoint);
            }
        }

        debug!(count = endpoints.len(), version = %version, "Parsed OpenAPI document");
        require_endpoints(endpoints, source)
    }
}

struct RefResolver<'a> {
    root: &'a Value,
}

impl<'a> RefResolver<'a> {
    /// Follow local `$ref` chains. A cycle or unresolvable pointer yields the
    /// last node reached, so parsing degrades rather than loops.
    fn resolve<'b>(&self, value: &'b Value) -> &'b Value
    where
        'a: 'b,
    {
        let mut current = value;
        let mut seen = HashSet::new();
        for _ in 0..MAX_REF_DEPTH {
            let Some(reference) = current.get("$ref").and_then(Value::as_str) else { return current };
            if !seen.insert(reference) {
                debug!(reference, "Cyclic $ref detected");
                return current;
            }
            let Some(pointer) = reference.strip_prefix('#') else { return current };
            match self.root.pointer(pointer) {
                Some(target) => current = target,
                None => return current,
            }
        }
        current
    }

    fn parameters(&self, raw: &Value) -> Vec<Parameter> {
        let raw = self.resolve(raw);
        let Some(name) = raw.get("name").and_then(Value::as_str) else { return Vec::new() };
        let location_name = raw.get("in").and_then(Value::as_str).unwrap_or("query");
        let required = raw.get("required").and_then(Value::as_bool).unwrap_or(false);

        // Swagger 2.0 body parameter: its schema properties are the body fields.
        if location_name == "body" {
            let schema = raw.get("schema").map(|s| self.resolve(s)).unwrap_or(&NULL);
            let fields = self.schema_properties(schema);
            if fields.is_empty() {
                return vec![Parameter::new(name, ParamLocation::Body, self.schema_type(schema), required)];
            }
            return fields;
        }

        // Cookie parameters have no counterpart in the request builder.
        let Some(location) = ParamLocation::parse(location_name) else { return Vec::new() };
        let param_type = match raw.get("schema") {
            Some(schema) => self.schema_type(self.resolve(schema)),
            None => raw.get("type")
                .and_then(Value::as_str)
                .map(ParamType::from_type_name)
                .unwrap_or(ParamType::String),
        };
        vec![Parameter::new(name, location, param_type, required)]
    }

    fn request_body(&self, body: &Value) -> Vec<Parameter> {
        let body = self.resolve(body);
        let Some(content) = body.get("content").and_then(Value::as_object) else { return Vec::new() };
        let media = content.get("application/json")
            .or_else(|| content.iter().find(|(k, _)| k.contains("json")).map(|(_, v)| v))
            .or_else(|| content.values().next());
        let Some(schema) = media.and_then(|m| m.get("schema")) else { return Vec::new() };
        self.schema_properties(self.resolve(schema))
    }

    fn schema_properties(&self, schema: &Value) -> Vec<Parameter> {
        let mut out = Vec::new();
        let required: HashSet<&str> = schema.get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        if let Some(props) = schema.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                let prop = self.resolve(prop);
                out.push(Parameter::new(
                    name.clone(),
                    ParamLocation::Body,
                    self.schema_type(prop),
                    required.contains(name.as_str()),
                ));
            }
        }

        if let Some(all_of) = schema.get("allOf").and_then(Value::as_array) {
            for part in all_of {
                for param in self.schema_properties(self.resolve(part)) {
                    if !out.iter().any(|p| p.name == param.name) {
                        out.push(param);
                    }
                }
            }
        }
        out
    }

    fn schema_type(&self, schema: &Value) -> ParamType {
        if let Some(name) = schema.get(TYPE_EXTENSION).and_then(Value::as_str) {
            return ParamType::Other(name.to_string());
        }
        match schema.get("type") {
            Some(Value::String(t)) => ParamType::from_type_name(t),
            // 3.1 allows `type: [string, "null"]`.
            Some(Value::Array(types)) => types.iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .map(ParamType::from_type_name)
                .unwrap_or(ParamType::String),
            _ if schema.get("properties").is_some() => ParamType::Object,
            _ if schema.get("items").is_some() => ParamType::Array,
            _ => ParamType::String,
        }
    }

    fn responses(&self, status: &str, response: &Value, produces: &[String]) -> Vec<ResponseSchema> {
        let response = self.resolve(response);
        if let Some(content) = response.get("content").and_then(Value::as_object) {
            if !content.is_empty() {
                return content.iter()
                    .map(|(content_type, media)| ResponseSchema {
                        status: status.to_string(),
                        content_type: Some(content_type.clone()),
                        schema: media.get("schema").map(|s| self.resolve(s).clone()),
                    })
                    .collect();
            }
        }
        vec![ResponseSchema {
            status: status.to_string(),
            content_type: response.get("schema").and(produces.first().cloned()),
            schema: response.get("schema").map(|s| self.resolve(s).clone()),
        }]
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value.and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default()
}

/// Serialize endpoints as an OpenAPI 3.0 document. Ingesting the result yields
/// the same identities and parameter lists.
pub fn export_openapi(endpoints: &[Endpoint]) -> Value {
    let mut paths: Map<String, Value> = Map::new();

    for endpoint in endpoints {
        let mut operation = Map::new();
        if let Some(id) = &endpoint.operation_id {
            operation.insert("operationId".into(), json!(id));
        }
        if let Some(summary) = &endpoint.summary {
            operation.insert("summary".into(), json!(summary));
        }
        if !endpoint.tags.is_empty() {
            operation.insert("tags".into(), json!(endpoint.tags));
        }

        let parameters: Vec<Value> = endpoint.parameters.iter()
            .filter(|p| p.location != ParamLocation::Body)
            .map(|p| json!({
                "name": p.name,
                "in": p.location.as_str(),
                "required": p.required,
                "schema": export_schema(&p.param_type),
            }))
            .collect();
        if !parameters.is_empty() {
            operation.insert("parameters".into(), Value::Array(parameters));
        }

        let body: Vec<&Parameter> = endpoint.parameters_in(ParamLocation::Body).collect();
        if !body.is_empty() {
            let properties: Map<String, Value> = body.iter()
                .map(|p| (p.name.clone(), export_schema(&p.param_type)))
                .collect();
            let required: Vec<&str> = body.iter().filter(|p| p.required).map(|p| p.name.as_str()).collect();
            let mut schema = json!({ "type": "object", "properties": properties });
            if !required.is_empty() {
                schema["required"] = json!(required);
            }
            operation.insert("requestBody".into(), json!({
                "content": { "application/json": { "schema": schema } }
            }));
        }

        let mut responses = Map::new();
        for response in &endpoint.responses {
            let entry = responses.entry(response.status.clone())
                .or_insert_with(|| json!({ "description": response.status }));
            if let Some(content_type) = &response.content_type {
                entry["content"][content_type.as_str()] = match &response.schema {
                    Some(schema) => json!({ "schema": schema }),
                    None => json!({}),
                };
            }
        }
        if responses.is_empty() {
            responses.insert("200".into(), json!({ "description": "OK" }));
        }
        operation.insert("responses".into(), Value::Object(responses));

        let item = paths.entry(endpoint.path().to_string()).or_insert_with(|| json!({}));
        item[endpoint.method().as_str().to_ascii_lowercase()] = Value::Object(operation);
    }

    json!({
        "openapi": "3.0.3",
        "info": { "title": "apiprobe export", "version": env!("CARGO_PKG_VERSION") },
        "paths": paths,
    })
}

/// Schema for a parameter type. Unmapped type names travel in an extension
/// so re-ingestion restores them.
fn export_schema(param_type: &ParamType) -> Value {
    match param_type {
        ParamType::Other(name) => {
            let mut schema = json!({ "type": "string" });
            schema[TYPE_EXTENSION] = json!(name);
            schema
        }
        other => json!({ "type": other.as_str() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PETSTORE: &str = r##"
openapi: 3.0.3
info:
  title: Petstore
  version: "1.0"
paths:
  /pets/{petId}:
    parameters:
      - name: petId
        in: path
        required: true
        schema: { type: string }
      - name: verbose
        in: query
        schema: { type: boolean }
    get:
      operationId: getPet
      summary: Fetch a pet
      tags: [pets]
      parameters:
        - name: petId
          in: path
          required: true
          schema: { type: integer }
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema: { $ref: "#/components/schemas/Pet" }
    put:
      requestBody:
        content:
          application/json:
            schema: { $ref: "#/components/schemas/Pet" }
      responses:
        "204": { description: updated }
components:
  schemas:
    Pet:
      type: object
      required: [name]
      properties:
        name: { type: string }
        age: { type: integer }
        parent: { $ref: "#/components/schemas/Pet" }
"##;

    fn ingest(content: &str) -> Result<Vec<Endpoint>, ApiProbeError> {
        OpenApiIngestor::default().ingest(&IngestSource::new("petstore.yaml", content))
    }

    #[test]
    fn test_operation_parameters_override_path_level() {
        let endpoints = ingest(PETSTORE).unwrap();
        assert_eq!(endpoints.len(), 2);
        let get = &endpoints[0];
        assert_eq!(get.method(), HttpMethod::Get);
        assert_eq!(get.operation_id.as_deref(), Some("getPet"));
        let pet_id = get.parameter("petId", ParamLocation::Path).unwrap();
        assert_eq!(pet_id.param_type, ParamType::Integer);
        assert!(get.parameter("verbose", ParamLocation::Query).is_some());
        assert_eq!(get.parameters.len(), 2);
    }

    #[test]
    fn test_request_body_ref_becomes_body_params() {
        let endpoints = ingest(PETSTORE).unwrap();
        let put = endpoints.iter().find(|e| e.method() == HttpMethod::Put).unwrap();
        let name = put.parameter("name", ParamLocation::Body).unwrap();
        assert!(name.required);
        assert_eq!(put.parameter("age", ParamLocation::Body).unwrap().param_type, ParamType::Integer);
        assert_eq!(put.parameter("parent", ParamLocation::Body).unwrap().param_type, ParamType::Object);
    }

    #[test]
    fn test_responses_recorded_with_resolved_schema() {
        let endpoints = ingest(PETSTORE).unwrap();
        let response = &endpoints[0].responses[0];
        assert_eq!(response.status, "200");
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        assert_eq!(response.schema.as_ref().unwrap()["type"], "object");
    }

    #[test]
    fn test_cyclic_ref_terminates() {
        let doc = r##"{"openapi":"3.0.0","paths":{"/a":{"post":{"requestBody":{"$ref":"#/components/requestBodies/A"}}}},
            "components":{"requestBodies":{"A":{"$ref":"#/components/requestBodies/B"},"B":{"$ref":"#/components/requestBodies/A"}}}}"##;
        let endpoints = ingest(doc).unwrap();
        assert!(endpoints[0].parameters.is_empty());
    }

    #[test]
    fn test_swagger2_body_and_form_data() {
        let doc = r#"{
            "swagger": "2.0",
            "basePath": "/v1",
            "paths": {
                "/login": {
                    "post": {
                        "parameters": [
                            {"name": "creds", "in": "body", "schema": {"type": "object", "required": ["user"],
                                "properties": {"user": {"type": "string"}, "pin": {"type": "integer"}}}},
                            {"name": "remember", "in": "formData", "type": "boolean"}
                        ]
                    }
                }
            }
        }"#;
        let endpoints = ingest(doc).unwrap();
        let login = &endpoints[0];
        assert_eq!(login.path(), "/v1/login");
        assert!(login.parameter("user", ParamLocation::Body).unwrap().required);
        assert_eq!(login.parameter("pin", ParamLocation::Body).unwrap().param_type, ParamType::Integer);
        assert_eq!(login.parameter("remember", ParamLocation::Body).unwrap().param_type, ParamType::Boolean);
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let ingestor = OpenApiIngestor::new(vec!["3.0".into()]);
        let doc = r#"{"openapi": "3.1.0", "paths": {"/a": {"get": {}}}}"#;
        let err = ingestor.ingest(&IngestSource::new("a.json", doc)).unwrap_err();
        assert!(err.to_string().contains("unsupported OpenAPI version"));
    }

    #[test]
    fn test_missing_version_and_empty_paths() {
        assert!(ingest(r#"{"paths": {}}"#).is_err());
        let err = ingest(r#"{"openapi": "3.0.0", "paths": {}}"#).unwrap_err();
        assert!(err.to_string().contains("no operations found"));
    }

    #[test]
    fn test_undeclared_placeholder_added_as_path_param() {
        let doc = r#"{"openapi": "3.0.0", "paths": {"/orders/{orderId}": {"delete": {}}}}"#;
        let endpoints = ingest(doc).unwrap();
        assert!(endpoints[0].parameter("orderId", ParamLocation::Path).unwrap().required);
    }

    #[test]
    fn test_export_round_trip() {
        let original = ingest(PETSTORE).unwrap();
        let exported = export_openapi(&original);
        let text = serde_json::to_string(&exported).unwrap();
        let again = OpenApiIngestor::default().ingest(&IngestSource::new("export.json", text)).unwrap();

        assert_eq!(again.len(), original.len());
        for (a, b) in original.iter().zip(again.iter()) {
            assert_eq!(a.key(), b.key());
            let mut pa = a.parameters.clone();
            let mut pb = b.parameters.clone();
            pa.sort_by(|x, y| x.name.cmp(&y.name));
            pb.sort_by(|x, y| x.name.cmp(&y.name));
            assert_eq!(pa, pb);
        }
    }

    const UPLOAD: &str = r#"{
        "swagger": "2.0",
        "paths": {
            "/accounts": {
                "post": {
                    "parameters": [
                        {"name": "account", "in": "body", "schema": {"type": "object", "required": ["username"],
                            "properties": {"username": {"type": "string"}, "password": {"type": "string"},
                                "email": {"type": "string"}}}},
                        {"name": "nickname", "in": "formData", "type": "string"},
                        {"name": "avatar", "in": "formData", "type": "file", "required": true}
                    ]
                }
            }
        }
    }"#;

    #[test]
    fn test_export_keeps_unmapped_types() {
        let original = ingest(UPLOAD).unwrap();
        let avatar = original[0].parameter("avatar", ParamLocation::Body).unwrap();
        assert_eq!(avatar.param_type, ParamType::Other("file".into()));

        let exported = export_openapi(&original);
        let body = &exported["paths"]["/accounts"]["post"]["requestBody"]["content"]["application/json"]["schema"];
        assert_eq!(body["properties"]["avatar"]["type"], "string");
        assert_eq!(body["properties"]["avatar"][TYPE_EXTENSION], "file");

        let text = serde_json::to_string(&exported).unwrap();
        let again = OpenApiIngestor::default().ingest(&IngestSource::new("export.json", text)).unwrap();
        let mut pa = original[0].parameters.clone();
        let mut pb = again[0].parameters.clone();
        pa.sort_by(|x, y| x.name.cmp(&y.name));
        pb.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(pa, pb);
        assert!(again[0].parameter("avatar", ParamLocation::Body).unwrap().required);
    }

    #[test]
    fn test_body_properties_keep_document_order() {
        let endpoints = ingest(UPLOAD).unwrap();
        let names: Vec<&str> = endpoints[0].parameters.iter()
            .filter(|p| p.location == ParamLocation::Body)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, ["username", "password", "email", "nickname", "avatar"]);
    }
}
