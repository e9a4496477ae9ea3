use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "ingestors": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "priority": {
                        "type": "array",
                        "items": { "$ref": "#/definitions/format" },
                        "uniqueItems": true
                    },
                    "openapi": {
                        "type": "object",
                        "properties": {
                            "enabled": { "type": "boolean" },
                            "versions": { "type": "array", "items": { "type": "string" }, "minItems": 1 }
                        }
                    },
                    "graphql": {
                        "type": "object",
                        "properties": {
                            "enabled": { "type": "boolean" },
                            "endpoint_path": { "type": "string", "pattern": "^/" }
                        }
                    },
                    "postman": { "$ref": "#/definitions/toggle" },
                    "har": { "$ref": "#/definitions/toggle" },
                    "gateway": { "$ref": "#/definitions/toggle" }
                }
            },
            "enrichment": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "workspace": { "type": ["string", "null"] },
                    "source_maps": { "type": "boolean" },
                    "typescript_definitions": { "type": "boolean" },
                    "semantic_analysis": { "type": "boolean" },
                    "code_discovery": {
                        "type": "object",
                        "additionalProperties": false,
                        "properties": {
                            "enabled": { "type": "boolean" },
                            "safe_mode": { "type": "boolean" },
                            "command": { "type": "string", "minLength": 1 }
                        }
                    }
                }
            },
            "rag": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "embedding_model": { "type": "string", "minLength": 1 },
                    "embedding_base_url": { "type": "string", "pattern": "^https?://" },
                    "api_key": { "type": ["string", "null"] },
                    "documentation_sources": { "type": "array", "items": { "type": "string", "minLength": 1 } },
                    "confidence_threshold": { "type": "number", "minimum": 0, "maximum": 1 },
                    "top_k": { "type": "integer", "minimum": 1 },
                    "chunk_size": { "type": "integer", "minimum": 64 },
                    "confidence_table": {
                        "type": "array",
                        "minItems": 2,
                        "items": {
                            "type": "array",
                            "minItems": 2,
                            "maxItems": 2,
                            "items": { "type": "number", "minimum": 0, "maximum": 1 }
                        }
                    }
                }
            },
            "dast": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "max_concurrent": { "type": "integer", "minimum": 1 },
                    "timeout": { "type": "integer", "minimum": 1 },
                    "follow_redirects": { "type": "boolean" },
                    "custom_headers": {
                        "type": "object",
                        "additionalProperties": { "type": "string" }
                    },
                    "max_retries": { "type": "integer", "minimum": 0, "maximum": 10 },
                    "retry_backoff_ms": { "type": "integer", "minimum": 0 },
                    "vulnerability_classes": {
                        "type": "array",
                        "minItems": 1,
                        "uniqueItems": true,
                        "items": { "$ref": "#/definitions/vuln_class" }
                    },
                    "max_payloads_per_parameter": { "type": ["integer", "null"], "minimum": 1 },
                    "severity_table": {
                        "type": "object",
                        "propertyNames": { "$ref": "#/definitions/vuln_class" },
                        "additionalProperties": {
                            "type": "string",
                            "enum": ["critical", "high", "medium", "low", "info"]
                        }
                    },
                    "divergence_threshold": { "type": "number", "minimum": 0, "maximum": 1 }
                }
            },
            "output": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "directory": { "type": "string" },
                    "format": { "type": "string", "enum": ["json", "markdown", "both"] }
                }
            }
        },
        "definitions": {
            "toggle": {
                "type": "object",
                "properties": { "enabled": { "type": "boolean" } }
            },
            "format": {
                "type": "string",
                "enum": ["openapi", "graphql", "postman", "har", "gateway"]
            },
            "vuln_class": {
                "type": "string",
                "enum": [
                    "injection", "blind_injection", "command_injection", "xss",
                    "path_traversal", "ssti", "type_confusion"
                ]
            }
        }
    })
});
