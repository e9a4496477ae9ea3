use std::sync::LazyLock;

use regex::{Regex, RegexSet};
use similar::TextDiff;

use crate::config::DastConfig;
use crate::models::{
    Finding, Payload, ProbeOutcome, ProbeRecord, ProbeResponse, SignatureKind, VulnClass,
};

const EVIDENCE_WINDOW: usize = 240;
/// Characters of context kept before the match inside the evidence window.
const EVIDENCE_LEAD: usize = 80;
const LATENCY_FACTOR: f64 = 0.8;

const REFLECTION_CONFIDENCE: f32 = 0.9;
const FINGERPRINT_CONFIDENCE: f32 = 0.85;
const LATENCY_CONFIDENCE: f32 = 0.6;
const STATUS_CONFIDENCE: f32 = 0.5;
const DIVERGENCE_CONFIDENCE: f32 = 0.4;
const TIMEOUT_CONFIDENCE: f32 = 0.3;

const SQL_ERRORS: &[&str] = &[
    r"(?i)you have an error in your sql syntax",
    r"(?i)warning: mysql_",
    r"(?i)unclosed quotation mark after the character string",
    r"(?i)quoted string not properly terminated",
    r"(?i)pg_query\(\) expects",
    r"(?i)unterminated quoted string at or near",
    r"(?i)syntax error at or near",
    r"(?i)sqlite3?::(sql)?exception",
    r"(?i)sqlite_error",
    r"(?i)\bora-\d{5}\b",
    r"(?i)sqlstate\[\w+\]",
    r"(?i)microsoft ole db provider for sql server",
    r"(?i)mongoerror|cast to objectid failed",
];

const COMMAND_OUTPUT: &[&str] = &[
    r"uid=\d+\([^)]*\)\s+gid=\d+",
    r"root:x:0:0:",
];

const FILE_CONTENTS: &[&str] = &[
    r"root:x:0:0:",
    r"(?m)^\[fonts\]",
    r"(?m)^\[extensions\]",
];

const TEMPLATE_ERRORS: &[&str] = &[
    r"jinja2\.exceptions",
    r"TemplateSyntaxError",
    r"freemarker\.core\.",
    r"Twig_Error|Twig\\Error",
    r"org\.apache\.velocity",
    r"ActionView::Template::Error",
];

const TYPE_ERRORS: &[&str] = &[
    r"TypeError:",
    r"NumberFormatException",
    r"ClassCastException",
    r"(?i)invalid input syntax for (type )?(integer|numeric|boolean)",
    r"(?i)cannot be cast to",
    r"(?i)json: cannot unmarshal",
    r"(?i)failed to deserialize",
];

struct Fingerprints {
    set: RegexSet,
    patterns: Vec<Regex>,
}

impl Fingerprints {
    fn new(patterns: &[&str]) -> Self {
        Self {
            set: RegexSet::new(patterns).unwrap(),
            patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
        }
    }

    /// First fingerprint present in `body` but not in `baseline`, as (byte offset, length).
    fn find_new(&self, body: &str, baseline: &str) -> Option<(usize, usize)> {
        let in_baseline = self.set.matches(baseline);
        self.set.matches(body).iter()
            .filter(|i| !in_baseline.matched(*i))
            .filter_map(|i| self.patterns[i].find(body))
            .map(|m| (m.start(), m.len()))
            .min_by_key(|(start, _)| *start)
    }
}

static SQL: LazyLock<Fingerprints> = LazyLock::new(|| Fingerprints::new(SQL_ERRORS));
static COMMAND: LazyLock<Fingerprints> = LazyLock::new(|| Fingerprints::new(COMMAND_OUTPUT));
static FILES: LazyLock<Fingerprints> = LazyLock::new(|| Fingerprints::new(FILE_CONTENTS));
static TEMPLATE: LazyLock<Fingerprints> = LazyLock::new(|| Fingerprints::new(TEMPLATE_ERRORS));
static TYPES: LazyLock<Fingerprints> = LazyLock::new(|| Fingerprints::new(TYPE_ERRORS));

fn fingerprints_for(class: VulnClass) -> Option<&'static Fingerprints> {
    match class {
        VulnClass::Injection | VulnClass::BlindInjection => Some(&*SQL),
        VulnClass::CommandInjection => Some(&*COMMAND),
        VulnClass::PathTraversal => Some(&*FILES),
        VulnClass::Ssti => Some(&*TEMPLATE),
        VulnClass::TypeConfusion => Some(&*TYPES),
        VulnClass::Xss => None,
    }
}

/// One matched signature. `span` locates it in the response body when it has a location.
#[derive(Debug, Clone, Copy)]
struct Signal {
    kind: SignatureKind,
    confidence: f32,
    span: Option<(usize, usize)>,
}

/// Turns terminal probes into findings by comparing them with their endpoint's baseline.
#[derive(Debug, Clone)]
pub struct FindingClassifier {
    config: DastConfig,
}

impl FindingClassifier {
    pub fn new(config: &DastConfig) -> Self {
        Self { config: config.clone() }
    }

    /// At most one finding per probe. Baseline probes never produce findings.
    pub fn classify(&self, record: &ProbeRecord, baseline: Option<&ProbeResponse>) -> Option<Finding> {
        let payload = record.probe.payload.as_deref()?;

        let (signals, evidence) = match &record.outcome {
            ProbeOutcome::Completed { response } => {
                let signals = self.signals(payload, response, baseline);
                let strongest = *signals.first()?;
                (signals, evidence(payload, response, baseline, strongest))
            }
            ProbeOutcome::TimedOut { timeout_ms } if payload.is_blocking() => {
                let signal = Signal { kind: SignatureKind::Timeout, confidence: TIMEOUT_CONFIDENCE, span: None };
                (vec![signal], format!("no response within {}ms to blocking payload {}", timeout_ms, payload.template))
            }
            _ => return None,
        };

        let possible = signals.iter().all(|s| s.kind == SignatureKind::Timeout);
        let severity = self.config.severity_for(payload.class);
        Some(Finding {
            endpoint: record.probe.endpoint.key().clone(),
            payload: payload.clone(),
            class: payload.class,
            severity: if possible { severity.lowered() } else { severity },
            evidence,
            confidence: signals[0].confidence,
            signatures: signals.iter().map(|s| s.kind).collect(),
            probe_id: record.probe.id,
            probe_state: record.outcome.state(),
            possible,
        })
    }

    /// Matched signals, strongest first.
    fn signals(&self, payload: &Payload, response: &ProbeResponse, baseline: Option<&ProbeResponse>) -> Vec<Signal> {
        let mut signals = Vec::new();
        let body = response.body.as_str();
        let baseline_body = baseline.map(|b| b.body.as_str()).unwrap_or("");

        if let Some(span) = reflection(payload, body, baseline_body) {
            signals.push(Signal {
                kind: SignatureKind::Reflection,
                confidence: REFLECTION_CONFIDENCE,
                span: Some(span),
            });
        }

        if let Some(span) = fingerprints_for(payload.class).and_then(|f| f.find_new(body, baseline_body)) {
            signals.push(Signal {
                kind: SignatureKind::ErrorFingerprint,
                confidence: FINGERPRINT_CONFIDENCE,
                span: Some(span),
            });
        }

        if let Some(base) = baseline {
            if let Some(delay) = payload.expected_delay_ms {
                let threshold = base.elapsed_ms as f64 + delay as f64 * LATENCY_FACTOR;
                if response.elapsed_ms as f64 >= threshold {
                    signals.push(Signal {
                        kind: SignatureKind::LatencyAnomaly,
                        confidence: LATENCY_CONFIDENCE,
                        span: None,
                    });
                }
            }

            if response.status >= 500 && base.status < 500 {
                signals.push(Signal { kind: SignatureKind::StatusAnomaly, confidence: STATUS_CONFIDENCE, span: None });
            }

            if response.status != base.status
                && line_similarity(&base.body, body) < self.config.divergence_threshold
            {
                signals.push(Signal {
                    kind: SignatureKind::BodyDivergence,
                    confidence: DIVERGENCE_CONFIDENCE,
                    span: None,
                });
            }
        }

        // Stable sort keeps check order among equal confidences.
        signals.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        signals
    }
}

/// Reflection candidates are the template's signatures, or the literal attack
/// string when it has none. Echoed type-confusion values prove nothing.
fn reflection(payload: &Payload, body: &str, baseline_body: &str) -> Option<(usize, usize)> {
    let literal = [payload.value.clone()];
    let candidates: &[String] = if !payload.reflection_signatures.is_empty() {
        &payload.reflection_signatures
    } else if payload.class != VulnClass::TypeConfusion {
        &literal
    } else {
        &[]
    };

    candidates.iter()
        .filter(|c| !c.is_empty() && !baseline_body.contains(c.as_str()))
        .find_map(|c| body.find(c.as_str()).map(|start| (start, c.len())))
}

fn line_similarity(a: &str, b: &str) -> f32 {
    TextDiff::from_lines(a, b).ratio()
}

fn evidence(
    payload: &Payload,
    response: &ProbeResponse,
    baseline: Option<&ProbeResponse>,
    strongest: Signal,
) -> String {
    if let Some((start, len)) = strongest.span {
        return window(&response.body, start, len);
    }
    let summary = match (strongest.kind, baseline) {
        (SignatureKind::LatencyAnomaly, Some(base)) => format!(
            "response took {}ms against a {}ms baseline (payload expects {}ms)",
            response.elapsed_ms,
            base.elapsed_ms,
            payload.expected_delay_ms.unwrap_or_default(),
        ),
        (_, Some(base)) => format!("HTTP {} against baseline HTTP {}: {}", response.status, base.status, response.body),
        (_, None) => format!("HTTP {}: {}", response.status, response.body),
    };
    summary.chars().take(EVIDENCE_WINDOW).collect()
}

/// At most `EVIDENCE_WINDOW` characters of `body` covering the match at `start`.
fn window(body: &str, start: usize, len: usize) -> String {
    let match_char = body[..start].chars().count();
    let match_chars = body[start..start + len].chars().count();
    let lead = EVIDENCE_LEAD.min(EVIDENCE_WINDOW.saturating_sub(match_chars));
    let first = match_char.saturating_sub(lead);
    body.chars().skip(first).take(EVIDENCE_WINDOW).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::models::{
        Endpoint, HttpMethod, ParamLocation, Probe, ProbeState, RequestDescriptor, Severity, SourceFormat,
    };

    fn response(status: u16, body: &str, elapsed_ms: u64) -> ProbeResponse {
        ProbeResponse { status, headers: BTreeMap::new(), body: body.into(), elapsed_ms }
    }

    fn payload(class: VulnClass, value: &str, signatures: &[&str], delay: Option<u64>) -> Payload {
        Payload {
            class,
            parameter: "q".into(),
            location: ParamLocation::Query,
            value: value.into(),
            reflection_signatures: signatures.iter().map(|s| s.to_string()).collect(),
            expected_delay_ms: delay,
            template: "test".into(),
        }
    }

    fn record(payload: Payload, outcome: ProbeOutcome) -> ProbeRecord {
        let endpoint = Arc::new(Endpoint::new(HttpMethod::Get, "/search", SourceFormat::OpenApi, "openapi"));
        let request = RequestDescriptor {
            method: HttpMethod::Get,
            url: "http://localhost/search".into(),
            headers: BTreeMap::new(),
            body: None,
        };
        let mut probe = Probe::new(7, endpoint, Some(Arc::new(payload)), request);
        probe.advance(ProbeState::InFlight).unwrap();
        probe.advance(outcome.state()).unwrap();
        ProbeRecord { probe, outcome }
    }

    fn classifier() -> FindingClassifier {
        FindingClassifier::new(&DastConfig::default())
    }

    #[test]
    fn test_echoed_drop_table_is_one_injection_finding() {
        let attack = "'; DROP TABLE users; --";
        let body = format!("{{\"results\":[],\"query\":\"{}\"}}", attack);
        let rec = record(
            payload(VulnClass::Injection, attack, &[], None),
            ProbeOutcome::Completed { response: response(200, &body, 12) },
        );
        let baseline = response(200, "{\"results\":[],\"query\":\"apiprobe\"}", 10);

        let finding = classifier().classify(&rec, Some(&baseline)).unwrap();
        assert_eq!(finding.class, VulnClass::Injection);
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.signatures, vec![SignatureKind::Reflection]);
        assert!((finding.confidence - 0.9).abs() < f32::EPSILON);
        assert!(finding.evidence.contains("DROP TABLE"));
        assert!(finding.evidence.chars().count() <= 240);
        assert_eq!(finding.probe_id, 7);
        assert!(!finding.possible);
    }

    #[test]
    fn test_reflection_present_in_baseline_is_ignored() {
        let rec = record(
            payload(VulnClass::Xss, "<script>alert(31337)</script>", &["<script>alert(31337)</script>"], None),
            ProbeOutcome::Completed { response: response(200, "<script>alert(31337)</script>", 5) },
        );
        let baseline = response(200, "<script>alert(31337)</script>", 5);
        assert!(classifier().classify(&rec, Some(&baseline)).is_none());
    }

    #[test]
    fn test_sql_error_fingerprint_with_status_anomaly() {
        let body = "Internal error: You have an error in your SQL syntax; check the manual near ''1''";
        let rec = record(
            payload(VulnClass::Injection, "' OR '1'='1", &[], None),
            ProbeOutcome::Completed { response: response(500, body, 20) },
        );
        let finding = classifier().classify(&rec, Some(&response(200, "[]", 10))).unwrap();
        assert_eq!(finding.signatures[0], SignatureKind::ErrorFingerprint);
        assert!(finding.signatures.contains(&SignatureKind::StatusAnomaly));
        assert!((finding.confidence - 0.85).abs() < f32::EPSILON);
        assert!(finding.evidence.starts_with("Internal error: You have an error"));
    }

    #[test]
    fn test_command_output_fingerprint() {
        let rec = record(
            payload(VulnClass::CommandInjection, "; id", &["uid=", "gid="], None),
            ProbeOutcome::Completed {
                response: response(200, "pinging... uid=33(www-data) gid=33(www-data) groups=33", 30),
            },
        );
        let finding = classifier().classify(&rec, Some(&response(200, "pinging...", 30))).unwrap();
        assert_eq!(finding.signatures, vec![SignatureKind::Reflection, SignatureKind::ErrorFingerprint]);
        assert!(finding.evidence.contains("uid=33"));
    }

    #[test]
    fn test_latency_anomaly_for_blocking_payload() {
        let p = payload(VulnClass::BlindInjection, "' OR SLEEP(5)-- -", &[], Some(5_000));
        let slow = record(p.clone(), ProbeOutcome::Completed { response: response(200, "[]", 4_200) });
        let finding = classifier().classify(&slow, Some(&response(200, "[]", 100))).unwrap();
        assert_eq!(finding.signatures, vec![SignatureKind::LatencyAnomaly]);
        assert_eq!(finding.severity, Severity::High);
        assert!(finding.evidence.contains("4200ms"));

        let quick = record(p, ProbeOutcome::Completed { response: response(200, "[]", 3_000) });
        assert!(classifier().classify(&quick, Some(&response(200, "[]", 100))).is_none());
    }

    #[test]
    fn test_timeout_on_blocking_payload_is_possible_finding() {
        let blocking = record(
            payload(VulnClass::BlindInjection, "1 AND SLEEP(5)", &[], Some(5_000)),
            ProbeOutcome::TimedOut { timeout_ms: 2_000 },
        );
        let finding = classifier().classify(&blocking, None).unwrap();
        assert!(finding.possible);
        assert_eq!(finding.signatures, vec![SignatureKind::Timeout]);
        assert!((finding.confidence - 0.3).abs() < f32::EPSILON);
        assert_eq!(finding.severity, Severity::Medium);
        assert_eq!(finding.probe_state, ProbeState::TimedOut);

        let plain = record(payload(VulnClass::Injection, "'", &[], None), ProbeOutcome::TimedOut { timeout_ms: 2_000 });
        assert!(classifier().classify(&plain, None).is_none());
    }

    #[test]
    fn test_body_divergence_requires_status_change() {
        let p = payload(VulnClass::TypeConfusion, "maybe", &[], None);
        let baseline = response(200, "{\n\"id\": 1,\n\"name\": \"a\"\n}", 10);

        let changed = record(p.clone(), ProbeOutcome::Completed { response: response(400, "bad request", 10) });
        let finding = classifier().classify(&changed, Some(&baseline)).unwrap();
        assert_eq!(finding.signatures, vec![SignatureKind::BodyDivergence]);
        assert!(finding.evidence.starts_with("HTTP 400 against baseline HTTP 200"));

        let same_status = record(p, ProbeOutcome::Completed { response: response(200, "bad request", 10) });
        assert!(classifier().classify(&same_status, Some(&baseline)).is_none());
    }

    #[test]
    fn test_failed_probe_yields_nothing() {
        let rec = record(
            payload(VulnClass::Injection, "'", &[], None),
            ProbeOutcome::Failed { error: "connection reset".into(), attempts: 3 },
        );
        assert!(classifier().classify(&rec, None).is_none());
    }

    #[test]
    fn test_evidence_window_bounds_long_bodies() {
        let body = format!("{}MATCH{}", "é".repeat(1000), "x".repeat(1000));
        let start = body.find("MATCH").unwrap();
        let w = window(&body, start, 5);
        assert_eq!(w.chars().count(), 240);
        assert!(w.contains("MATCH"));
    }
}
