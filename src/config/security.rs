use serde_json::Value;

const DANGEROUS_PATTERNS: &[&str] = &[
    "javascript:",
    "vbscript:",
    "data:text/html",
];

const FORBIDDEN_CHARS: &[(char, &str)] = &[
    ('\r', "carriage return"),
    ('\n', "line feed"),
    ('\0', "NUL byte"),
];

/// Walk every string in the config tree and report values that could smuggle
/// script URIs or split HTTP headers once they reach the request builder.
pub fn check_security_patterns(value: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    check_value(value, &[], &mut errors);
    errors
}

fn check_value(value: &Value, path: &[String], errors: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let path_str = if path.is_empty() { "root".to_string() } else { path.join(".") };
            let lower = s.to_lowercase();
            for pattern in DANGEROUS_PATTERNS {
                if lower.contains(pattern) {
                    errors.push(format!("Dangerous pattern '{}' found at config path: {}", pattern, path_str));
                }
            }
            for (c, name) in FORBIDDEN_CHARS {
                if s.contains(*c) {
                    errors.push(format!("Forbidden {} found at config path: {}", name, path_str));
                }
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                let mut new_path = path.to_vec();
                new_path.push(k.clone());
                check_value(v, &new_path, errors);
            }
        }
        Value::Array(seq) => {
            for (i, v) in seq.iter().enumerate() {
                let mut new_path = path.to_vec();
                new_path.push(format!("[{}]", i));
                check_value(v, &new_path, errors);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_safe_config_passes() {
        let value = json!({"rag": {"embedding_base_url": "https://api.example.com/v1"}});
        assert!(check_security_patterns(&value).is_empty());
    }

    #[test]
    fn test_header_injection_blocked() {
        let value = json!({"dast": {"custom_headers": {"X-Test": "a\r\nSet-Cookie: x=1"}}});
        let errors = check_security_patterns(&value);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("dast.custom_headers.X-Test"));
    }

    #[test]
    fn test_javascript_uri_blocked() {
        let value = json!({"rag": {"documentation_sources": ["javascript:alert(1)"]}});
        let errors = check_security_patterns(&value);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("rag.documentation_sources.[0]"));
    }

    #[test]
    fn test_numeric_values_pass() {
        let value = json!({"dast": {"max_concurrent": 4, "follow_redirects": true}});
        assert!(check_security_patterns(&value).is_empty());
    }

    #[test]
    fn test_relative_paths_allowed() {
        let value = json!({"enrichment": {"workspace": "../frontend/dist"}});
        assert!(check_security_patterns(&value).is_empty());
    }
}
