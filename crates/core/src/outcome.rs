// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structural validation of agent outcome payloads.
//!
//! Outcomes split into two camps: signal-only outcomes carry no payload
//! (any of absent, `null`, or `{}` is fine), and structured outcomes
//! require an object with declared fields. Validation is shallow and
//! total: it never fails, it only reports.

use serde_json::Value;

/// Outcomes that carry no structured payload.
pub const SIGNAL_OUTCOMES: &[&str] = &[
    "plan_complete",
    "pr_ready",
    "approved",
    "failed",
    "interrupted",
    "no_changes",
    "conflicts_detected",
    "investigation_complete",
    "design_ready",
    "reproduced",
    "cannot_reproduce",
];

/// Declared type of a required payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    String,
    StringArray,
    Array,
}

impl FieldType {
    fn check(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            FieldType::Array => value.is_array(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            FieldType::String => "a string",
            FieldType::StringArray => "an array of strings",
            FieldType::Array => "an array",
        }
    }
}

/// Required fields for the structured outcomes. `None` means the
/// outcome is signal-only (or unknown) and takes no payload.
fn schema_for(outcome: &str) -> Option<&'static [(&'static str, FieldType)]> {
    match outcome {
        "needs_info" => Some(&[("questions", FieldType::StringArray)]),
        "options_proposed" => Some(&[
            ("summary", FieldType::String),
            ("options", FieldType::StringArray),
        ]),
        "changes_requested" => Some(&[
            ("summary", FieldType::String),
            ("comments", FieldType::Array),
        ]),
        _ => None,
    }
}

/// Result of validating an outcome payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeValidation {
    pub valid: bool,
    pub error: Option<String>,
}

impl OutcomeValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

/// Validate `payload` against the schema registered for `outcome`.
///
/// Total over all inputs. Signal-only and unregistered outcomes always
/// validate. For schema-bearing outcomes the payload must be a non-null
/// non-array object; arrays surface as a missing required field, extra
/// fields are allowed.
pub fn validate_outcome_payload(outcome: &str, payload: Option<&Value>) -> OutcomeValidation {
    let Some(required) = schema_for(outcome) else {
        return OutcomeValidation::ok();
    };

    let object = match payload {
        Some(Value::Object(map)) => map,
        // Anything else (absent, null, array, scalar) has no fields to
        // offer, so the first required field is reported missing.
        _ => {
            let (first, _) = required[0];
            return OutcomeValidation::invalid(format!("missing required field: {first}"));
        }
    };

    for (field, field_type) in required {
        match object.get(*field) {
            None | Some(Value::Null) => {
                return OutcomeValidation::invalid(format!("missing required field: {field}"));
            }
            Some(value) if !field_type.check(value) => {
                return OutcomeValidation::invalid(format!(
                    "field '{field}' must be {}",
                    field_type.describe()
                ));
            }
            Some(_) => {}
        }
    }

    OutcomeValidation::ok()
}

#[cfg(test)]
#[path = "outcome_tests.rs"]
mod tests;
