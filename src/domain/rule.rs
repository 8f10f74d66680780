use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::connector::ConnectorKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompareOp {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Equal,
}

impl CompareOp {
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            CompareOp::GreaterThan => value > threshold,
            CompareOp::GreaterThanOrEqual => value >= threshold,
            CompareOp::LessThan => value < threshold,
            CompareOp::LessThanOrEqual => value <= threshold,
            CompareOp::Equal => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub operator: CompareOp,
    /// float-parseable string, per the declarative contract.
    pub threshold: String,
    pub for_secs: u64,
}

impl Condition {
    pub fn threshold(&self) -> Option<f64> {
        self.threshold.trim().parse::<f64>().ok()
    }

    pub fn for_duration(&self) -> Duration {
        Duration::from_secs(self.for_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchSpec {
    pub index: String,
    /// dot-path (JSON-pointer-ish) into the response body.
    pub condition_field: String,
    #[serde(default)]
    pub query: Option<Value>,
    #[serde(default)]
    pub query_json: Option<String>,
}

impl ElasticsearchSpec {
    /// Exactly one of `query`/`query_json` must be set.
    pub fn validate_query_xor(&self) -> bool {
        self.query.is_some() != self.query_json.is_some()
    }

    pub fn body(&self) -> Value {
        match (&self.query, &self.query_json) {
            (Some(q), _) => q.clone(),
            (None, Some(raw)) => {
                serde_json::from_str(raw).unwrap_or(Value::String(raw.clone()))
            }
            (None, None) => Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionMode {
    Raw,
    Alertmanager,
}

impl Default for ActionMode {
    fn default() -> Self {
        ActionMode::Raw
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRef {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub mode: ActionMode,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub labels: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub annotations: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricLabel {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub static_value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomMetric {
    pub name: String,
    pub help: String,
    pub aggregation_map: String,
    pub value: String,
    #[serde(default)]
    pub labels: Vec<MetricLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRule {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub query_connector_ref: ConnectorKey,
    pub check_interval_secs: u64,
    pub elasticsearch: ElasticsearchSpec,
    pub condition: Condition,
    pub action_ref: ActionRef,
    #[serde(default)]
    pub custom_metrics: Vec<CustomMetric>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SearchRule {
    pub fn key(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_query_requires_exactly_one() {
        let both = ElasticsearchSpec {
            index: "i".into(),
            condition_field: "hits.total.value".into(),
            query: Some(Value::Null),
            query_json: Some("{}".into()),
        };
        assert!(!both.validate_query_xor());

        let neither = ElasticsearchSpec {
            index: "i".into(),
            condition_field: "hits.total.value".into(),
            query: None,
            query_json: None,
        };
        assert!(!neither.validate_query_xor());

        let one = ElasticsearchSpec {
            index: "i".into(),
            condition_field: "hits.total.value".into(),
            query: Some(Value::Null),
            query_json: None,
        };
        assert!(one.validate_query_xor());
    }

    #[test]
    fn compare_op_matches_spec_semantics() {
        assert!(CompareOp::GreaterThan.compare(6.0, 5.0));
        assert!(!CompareOp::GreaterThan.compare(5.0, 5.0));
        assert!(CompareOp::GreaterThanOrEqual.compare(5.0, 5.0));
        assert!(CompareOp::LessThan.compare(4.0, 5.0));
        assert!(CompareOp::Equal.compare(5.0, 5.0));
    }
}
