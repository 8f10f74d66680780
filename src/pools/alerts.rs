use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::Alert;

/// Thread-safe map: rule key -> Alert. Presence of a key is equivalent to
/// `RulePool[key].state == Firing` (invariant I1), enforced by the
/// Evaluator, not by this type.
#[derive(Default)]
pub struct AlertPool {
    inner: RwLock<HashMap<String, Alert>>,
}

impl AlertPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, alert: Alert) {
        self.inner
            .write()
            .expect("alert pool lock poisoned")
            .insert(key.into(), alert);
    }

    pub fn get(&self, key: &str) -> Option<Alert> {
        self.inner
            .read()
            .expect("alert pool lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn delete(&self, key: &str) {
        self.inner
            .write()
            .expect("alert pool lock poisoned")
            .remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .read()
            .expect("alert pool lock poisoned")
            .contains_key(key)
    }

    /// Immutable snapshot: a cloned copy of the current key/value set.
    pub fn get_all(&self) -> HashMap<String, Alert> {
        self.inner.read().expect("alert pool lock poisoned").clone()
    }

    pub fn for_ruler_action<'a>(&self, ruler_action_name: &str) -> Vec<(String, Alert)> {
        self.get_all()
            .into_iter()
            .filter(|(_, alert)| alert.ruler_action_name == ruler_action_name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::*;
    use crate::domain::ConnectorKey;

    fn sample_alert() -> Alert {
        Alert {
            ruler_action_name: "default/webhook".into(),
            search_rule: SearchRule {
                name: "cpu-high".into(),
                namespace: "default".into(),
                query_connector_ref: ConnectorKey::namespaced("default", "es"),
                check_interval_secs: 10,
                elasticsearch: ElasticsearchSpec {
                    index: "logs".into(),
                    condition_field: "hits.total.value".into(),
                    query: Some(serde_json::json!({})),
                    query_json: None,
                },
                condition: Condition {
                    operator: CompareOp::GreaterThan,
                    threshold: "5".into(),
                    for_secs: 30,
                },
                action_ref: ActionRef {
                    name: "webhook".into(),
                    namespace: None,
                    mode: ActionMode::Raw,
                    data: None,
                    labels: Default::default(),
                    annotations: Default::default(),
                },
                custom_metrics: vec![],
                description: None,
            },
            value: 6.0,
            aggregations: None,
        }
    }

    #[test]
    fn snapshot_unaffected_by_later_mutation() {
        let pool = AlertPool::new();
        pool.set("default/cpu-high", sample_alert());
        let snapshot = pool.get_all();
        pool.delete("default/cpu-high");
        assert_eq!(snapshot.len(), 1);
        assert!(!pool.contains("default/cpu-high"));
    }

    #[test]
    fn for_ruler_action_filters_by_name() {
        let pool = AlertPool::new();
        pool.set("default/cpu-high", sample_alert());
        let mut other = sample_alert();
        other.ruler_action_name = "default/other".into();
        pool.set("default/mem-high", other);

        let matches = pool.for_ruler_action("default/webhook");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0, "default/cpu-high");
    }
}
