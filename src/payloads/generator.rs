use tracing::debug;

use crate::config::DastConfig;
use crate::models::{Endpoint, ParamLocation, ParamType, Parameter, Payload, VulnClass};
use super::templates::{templates_for, PayloadTemplate, TypeFamily};

/// Deterministic payload generation: same endpoint and config, same payloads
/// in the same order. Performs no I/O.
#[derive(Debug, Clone)]
pub struct PayloadGenerator {
    classes: Vec<VulnClass>,
    max_per_parameter: Option<usize>,
}

impl PayloadGenerator {
    pub fn new(classes: Vec<VulnClass>, max_per_parameter: Option<usize>) -> Self {
        Self { classes, max_per_parameter }
    }

    pub fn from_config(config: &DastConfig) -> Self {
        Self::new(config.vulnerability_classes.clone(), config.max_payloads_per_parameter)
    }

    /// Payloads for every parameter, in declared parameter order then class order.
    pub fn generate(&self, endpoint: &Endpoint) -> Vec<Payload> {
        let payloads: Vec<Payload> = endpoint.parameters.iter()
            .flat_map(|param| self.for_parameter(param))
            .collect();
        debug!(endpoint = %endpoint.key(), payloads = payloads.len(), "Generated payloads");
        payloads
    }

    pub fn for_parameter(&self, param: &Parameter) -> Vec<Payload> {
        let family = TypeFamily::of(&param.param_type);
        let limit = self.max_per_parameter.unwrap_or(usize::MAX);

        self.classes.iter()
            .filter(|class| family.accepts(**class))
            .filter(|class| !(param.location == ParamLocation::Header && **class == VulnClass::Xss))
            .flat_map(|class| templates_for(*class, family))
            .filter(|template| allowed_in(template, param.location))
            .take(limit)
            .map(|template| Payload {
                class: template.class,
                parameter: param.name.clone(),
                location: param.location,
                value: template.value.to_string(),
                reflection_signatures: template.signatures.iter().map(|s| s.to_string()).collect(),
                expected_delay_ms: template.delay_ms,
                template: template.id.to_string(),
            })
            .collect()
    }
}

/// Path segments can't carry `/` except when traversal is the point.
fn allowed_in(template: &PayloadTemplate, location: ParamLocation) -> bool {
    location != ParamLocation::Path || template.class == VulnClass::PathTraversal || !template.value.contains('/')
}

/// A harmless value of the declared type, used for baselines and for the
/// parameters a probe doesn't target.
pub fn benign_value(param_type: &ParamType) -> serde_json::Value {
    use serde_json::json;
    match param_type {
        ParamType::Integer => json!(1),
        ParamType::Number => json!(1.5),
        ParamType::Boolean => json!(true),
        ParamType::Array => json!([]),
        ParamType::Object => json!({}),
        ParamType::String | ParamType::Other(_) => json!("apiprobe"),
    }
}
