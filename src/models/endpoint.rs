use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
        }
    }

    /// Parse a method name case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            "TRACE" => Some(Self::Trace),
            _ => None,
        }
    }

    /// Methods that conventionally change server state.
    pub fn is_state_changing(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The input format an endpoint was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    OpenApi,
    GraphQl,
    Postman,
    Har,
    Gateway,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenApi => "openapi",
            Self::GraphQl => "graphql",
            Self::Postman => "postman",
            Self::Har => "har",
            Self::Gateway => "gateway",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openapi" => Some(Self::OpenApi),
            "graphql" => Some(Self::GraphQl),
            "postman" => Some(Self::Postman),
            "har" => Some(Self::Har),
            "gateway" => Some(Self::Gateway),
            _ => None,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parameter travels in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "body" | "formdata" => Some(Self::Body),
            _ => None,
        }
    }
}

/// Declared parameter type, normalized across formats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// A type name the ingestor could not map (e.g. a custom GraphQL scalar).
    Other(String),
}

impl ParamType {
    /// Map a JSON-Schema / OpenAPI type keyword or GraphQL scalar to a ParamType.
    pub fn from_type_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" | "id" | "date" | "date-time" | "uuid" | "email" | "url" | "text" => Self::String,
            "integer" | "int" | "long" | "int32" | "int64" => Self::Integer,
            "number" | "float" | "double" | "decimal" => Self::Number,
            "boolean" | "bool" => Self::Boolean,
            "array" | "list" => Self::Array,
            "object" | "json" | "map" => Self::Object,
            "" => Self::String,
            _ => Self::Other(name.trim().to_string()),
        }
    }

    /// Infer a type from an example value.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Number,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
            Value::String(s) if s.parse::<i64>().is_ok() => Self::Integer,
            _ => Self::String,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Other(name) => name,
        }
    }

    /// Types whose values are free-form text at the request boundary.
    pub fn is_string_like(&self) -> bool {
        matches!(self, Self::String | Self::Other(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub param_type: ParamType,
    pub required: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, location: ParamLocation, param_type: ParamType, required: bool) -> Self {
        Self {
            name: name.into(),
            location,
            param_type,
            // Path parameters are always required by construction of the URL.
            required: required || location == ParamLocation::Path,
        }
    }
}

/// One declared response of an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    /// Status code or range as declared (`"200"`, `"4XX"`, `"default"`).
    pub status: String,
    pub content_type: Option<String>,
    pub schema: Option<Value>,
}

/// GraphQL operation details for endpoints ingested from an introspection schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphQlOperation {
    /// `query`, `mutation` or `subscription`.
    pub operation_type: String,
    pub field: String,
    /// Argument name to GraphQL type literal (e.g. `ID!`), in declared order.
    pub argument_types: Vec<(String, String)>,
}

/// The immutable identity of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    method: HttpMethod,
    path: String,
    source_format: SourceFormat,
}

impl EndpointKey {
    pub fn new(method: HttpMethod, path: impl Into<String>, source_format: SourceFormat) -> Self {
        Self { method, path: path.into(), source_format }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source_format(&self) -> SourceFormat {
        self.source_format
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]", self.method, self.path, self.source_format)
    }
}

/// Result of an annotation attempt on the append-only metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    Added,
    AlreadyPresent,
}

/// Append-only annotation store: pass name -> key -> value.
///
/// Keys are never overwritten or removed once written, so a later pass can't
/// destroy provenance recorded by an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: BTreeMap<String, BTreeMap<String, Value>>,
}

impl Metadata {
    pub fn annotate(&mut self, pass: &str, key: &str, value: Value) -> Annotation {
        let pass_entries = self.entries.entry(pass.to_string()).or_default();
        if pass_entries.contains_key(key) {
            return Annotation::AlreadyPresent;
        }
        pass_entries.insert(key.to_string(), value);
        Annotation::Added
    }

    pub fn get(&self, pass: &str, key: &str) -> Option<&Value> {
        self.entries.get(pass).and_then(|m| m.get(key))
    }

    pub fn pass(&self, pass: &str) -> Option<&BTreeMap<String, Value>> {
        self.entries.get(pass)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A normalized API operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    key: EndpointKey,
    pub parameters: Vec<Parameter>,
    pub responses: Vec<ResponseSchema>,
    /// Name of the ingestor that produced this endpoint.
    pub ingestor: String,
    pub summary: Option<String>,
    pub operation_id: Option<String>,
    pub tags: Vec<String>,
    pub graphql: Option<GraphQlOperation>,
    metadata: Metadata,
}

impl Endpoint {
    pub fn new(method: HttpMethod, path: impl Into<String>, source_format: SourceFormat, ingestor: &str) -> Self {
        Self {
            key: EndpointKey::new(method, path, source_format),
            parameters: Vec::new(),
            responses: Vec::new(),
            ingestor: ingestor.to_string(),
            summary: None,
            operation_id: None,
            tags: Vec::new(),
            graphql: None,
            metadata: Metadata::default(),
        }
    }

    pub fn key(&self) -> &EndpointKey {
        &self.key
    }

    pub fn method(&self) -> HttpMethod {
        self.key.method
    }

    pub fn path(&self) -> &str {
        &self.key.path
    }

    pub fn source_format(&self) -> SourceFormat {
        self.key.source_format
    }

    /// The URL path to request. Identity paths may carry a `#fragment` to keep
    /// operations multiplexed on one URL distinct.
    pub fn request_path(&self) -> &str {
        self.key.path.split('#').next().unwrap_or(&self.key.path)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn annotate(&mut self, pass: &str, key: &str, value: Value) -> Annotation {
        self.metadata.annotate(pass, key, value)
    }

    /// Add a parameter unless one with the same name and location exists.
    pub fn add_parameter(&mut self, param: Parameter) {
        if let Some(existing) = self.parameters.iter_mut()
            .find(|p| p.name == param.name && p.location == param.location)
        {
            *existing = param;
        } else {
            self.parameters.push(param);
        }
    }

    pub fn parameter(&self, name: &str, location: ParamLocation) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name && p.location == location)
    }

    pub fn parameters_in(&self, location: ParamLocation) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(move |p| p.location == location)
    }

    pub fn is_documented(&self) -> bool {
        self.metadata.get("rag", "documented").and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Placeholder names in a path template, in order (`/users/{id}` -> `["id"]`).
pub fn path_placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if !name.is_empty() {
                    names.push(name.to_string());
                }
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}
