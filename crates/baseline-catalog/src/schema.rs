//! Per-kind JSON Schemas for a control's `desired` attributes.
//!
//! Validation happens once, at load time, so a typo in the catalog is a
//! configuration error and never a surprise halfway through a run. Every
//! schema rejects unknown attributes: an attribute the account adapter does
//! not understand could never converge.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::warn;

use baseline_contracts::{
    control::{Control, ResourceKind},
    error::{BaselineError, BaselineResult},
};

/// The schema document for `kind`.
pub fn schema_for(kind: ResourceKind) -> Value {
    match kind {
        ResourceKind::IamPolicy => json!({
            "type": "object",
            "required": ["document"],
            "additionalProperties": false,
            "properties": {
                "document": {
                    "type": "object",
                    "required": ["Version", "Statement"],
                    "properties": {
                        "Version": { "type": "string" },
                        "Statement": { "type": "array", "minItems": 1 }
                    }
                },
                "description": { "type": "string" },
                "path": { "type": "string", "pattern": "^/(.*/)?$" }
            }
        }),
        ResourceKind::LogBucket => json!({
            "type": "object",
            "minProperties": 1,
            "additionalProperties": false,
            "properties": {
                "versioning": { "type": "boolean" },
                "encryption": { "enum": ["AES256", "aws:kms"] },
                "block_public_access": { "type": "boolean" },
                "policy": { "type": "object" }
            }
        }),
        ResourceKind::Trail => json!({
            "type": "object",
            "required": ["bucket"],
            "additionalProperties": false,
            "properties": {
                "bucket": { "type": "string", "minLength": 3 },
                "multi_region": { "type": "boolean" },
                "log_file_validation": { "type": "boolean" },
                "include_global_events": { "type": "boolean" },
                "logging": { "type": "boolean" }
            }
        }),
        ResourceKind::ConfigRecorder => json!({
            "type": "object",
            "required": ["delivery_bucket"],
            "additionalProperties": false,
            "properties": {
                "delivery_bucket": { "type": "string", "minLength": 3 },
                "role_arn": { "type": "string", "pattern": "^arn:aws[a-z-]*:iam::" },
                "all_supported": { "type": "boolean" },
                "include_global_resources": { "type": "boolean" },
                "recording": { "type": "boolean" }
            }
        }),
        ResourceKind::ConfigRule => json!({
            "type": "object",
            "required": ["source_identifier"],
            "additionalProperties": false,
            "properties": {
                "source_identifier": { "type": "string", "pattern": "^[A-Z0-9_]+$" },
                "input_parameters": { "type": "object" },
                "resource_types": {
                    "type": "array",
                    "items": { "type": "string", "pattern": "^AWS::" }
                },
                "maximum_execution_frequency": {
                    "enum": [
                        "One_Hour",
                        "Three_Hours",
                        "Six_Hours",
                        "Twelve_Hours",
                        "TwentyFour_Hours"
                    ]
                }
            }
        }),
        ResourceKind::SecurityHub => json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "standards": {
                    "type": "array",
                    "items": { "type": "string", "pattern": "^[a-z0-9-]+/v/[0-9.]+$" },
                    "uniqueItems": true
                },
                "auto_enable_controls": { "type": "boolean" }
            }
        }),
        ResourceKind::Budget => json!({
            "type": "object",
            "required": ["limit_amount"],
            "additionalProperties": false,
            "properties": {
                "limit_amount": { "type": "number", "exclusiveMinimum": 0 },
                "unit": { "type": "string", "minLength": 3, "maxLength": 3 },
                "time_unit": { "enum": ["MONTHLY", "QUARTERLY", "ANNUALLY"] },
                "alert_threshold_percent": {
                    "type": "number",
                    "exclusiveMinimum": 0,
                    "maximum": 1000
                },
                "subscribers": {
                    "type": "array",
                    "items": { "type": "string", "pattern": "^[^@\\s]+@[^@\\s]+$" },
                    "maxItems": 10
                }
            }
        }),
    }
}

/// Validates `desired` attributes against the schema of each control's kind.
pub struct DesiredStateValidator {
    validators: HashMap<ResourceKind, jsonschema::Validator>,
}

impl DesiredStateValidator {
    /// Compile the schema for every resource kind.
    pub fn new() -> BaselineResult<Self> {
        let mut validators = HashMap::new();
        for kind in ResourceKind::all() {
            let validator = jsonschema::validator_for(&schema_for(kind)).map_err(|e| {
                BaselineError::CatalogError {
                    reason: format!("schema for {kind} does not compile: {e}"),
                }
            })?;
            validators.insert(kind, validator);
        }
        Ok(Self { validators })
    }

    /// Every violation in `control.desired`, as readable messages.
    pub fn violations(&self, control: &Control) -> Vec<String> {
        let Some(validator) = self.validators.get(&control.kind) else {
            return vec![format!("no schema registered for {}", control.kind)];
        };
        validator
            .iter_errors(&control.desired)
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{path}: {error}")
                }
            })
            .collect()
    }

    /// Check all controls; the first control with violations fails the load
    /// with every one of its violations listed.
    pub fn check(&self, controls: &[Control]) -> BaselineResult<()> {
        for control in controls {
            let violations = self.violations(control);
            if !violations.is_empty() {
                warn!(control_id = %control.id, kind = %control.kind, "desired state rejected");
                return Err(BaselineError::InvalidDesiredState {
                    control: control.id.to_string(),
                    reason: violations.join("; "),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use baseline_contracts::{
        control::{Category, Control, ControlId, ResourceKind},
        error::BaselineError,
    };

    use super::DesiredStateValidator;

    fn control(kind: ResourceKind, desired: serde_json::Value) -> Control {
        Control {
            id: ControlId::new("c"),
            category: Category::Logging,
            description: String::new(),
            kind,
            resource: "r".to_string(),
            desired,
            depends_on: vec![],
            remediation: None,
        }
    }

    #[test]
    fn every_kind_schema_compiles() {
        assert!(DesiredStateValidator::new().is_ok());
    }

    #[test]
    fn valid_trail_passes() {
        let v = DesiredStateValidator::new().unwrap();
        let c = control(
            ResourceKind::Trail,
            json!({ "bucket": "audit-logs", "multi_region": true, "logging": true }),
        );
        assert!(v.violations(&c).is_empty(), "{:?}", v.violations(&c));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let v = DesiredStateValidator::new().unwrap();
        let c = control(ResourceKind::Trail, json!({ "bucket": "audit-logs", "multiregion": true }));
        let violations = v.violations(&c);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("multiregion"), "{violations:?}");
    }

    #[test]
    fn wrong_type_names_the_attribute() {
        let v = DesiredStateValidator::new().unwrap();
        let c = control(ResourceKind::LogBucket, json!({ "versioning": "yes" }));
        let violations = v.violations(&c);
        assert!(violations.iter().any(|m| m.starts_with("/versioning")), "{violations:?}");
    }

    #[test]
    fn budget_requires_a_positive_limit() {
        let v = DesiredStateValidator::new().unwrap();
        assert!(!v.violations(&control(ResourceKind::Budget, json!({}))).is_empty());
        assert!(!v
            .violations(&control(ResourceKind::Budget, json!({ "limit_amount": 0 })))
            .is_empty());
        assert!(v
            .violations(&control(ResourceKind::Budget, json!({ "limit_amount": 100.0 })))
            .is_empty());
    }

    #[test]
    fn non_object_desired_is_rejected() {
        let v = DesiredStateValidator::new().unwrap();
        let c = control(ResourceKind::SecurityHub, json!(["aws-foundational-security-best-practices/v/1.0.0"]));
        match v.check(&[c]) {
            Err(BaselineError::InvalidDesiredState { control, .. }) => assert_eq!(control, "c"),
            other => panic!("expected InvalidDesiredState, got {:?}", other),
        }
    }
}
