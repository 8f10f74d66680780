use std::collections::HashMap;

use chrono::DateTime;
use serde_json::Value;

use crate::error::EngineError;

pub struct ValidationOutcome {
    pub ok: bool,
    pub hint: String,
}

pub type ValidatorFn = fn(&str) -> ValidationOutcome;

/// Registry `name -> fn(body) -> (ok, hint, err)` (spec.md §4.7). Unknown
/// validator name surfaces `EvaluateTemplateError` to the caller.
pub struct ValidatorRegistry {
    validators: HashMap<&'static str, ValidatorFn>,
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        let mut validators: HashMap<&'static str, ValidatorFn> = HashMap::new();
        validators.insert("alertmanager", validate_alertmanager);
        Self { validators }
    }
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self, name: &str, body: &str) -> Result<ValidationOutcome, EngineError> {
        let validator = self
            .validators
            .get(name)
            .ok_or_else(|| EngineError::EvaluateTemplateError(format!("unknown validator {name}")))?;
        Ok(validator(body))
    }
}

/// Parses `body` as a JSON array of
/// `{labels, annotations, startsAt, endsAt}` objects; requires a
/// non-empty `alertname` label and ISO-8601 timestamps on each.
fn validate_alertmanager(body: &str) -> ValidationOutcome {
    let parsed: Result<Vec<Value>, _> = serde_json::from_str(body);
    let Ok(alerts) = parsed else {
        return ValidationOutcome {
            ok: false,
            hint: "payload is not a JSON array".into(),
        };
    };

    for alert in &alerts {
        let alertname = alert
            .get("labels")
            .and_then(|labels| labels.get("alertname"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if alertname.is_empty() {
            return ValidationOutcome {
                ok: false,
                hint: "alert missing non-empty alertname label".into(),
            };
        }

        for field in ["startsAt", "endsAt"] {
            let Some(ts) = alert.get(field).and_then(|v| v.as_str()) else {
                return ValidationOutcome {
                    ok: false,
                    hint: format!("alert missing {field}"),
                };
            };
            if DateTime::parse_from_rfc3339(ts).is_err() {
                return ValidationOutcome {
                    ok: false,
                    hint: format!("{field} is not ISO-8601/RFC3339"),
                };
            }
        }
    }

    ValidationOutcome {
        ok: true,
        hint: String::new(),
    }
}
