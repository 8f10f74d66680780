use std::sync::{Arc, RwLock};
use std::time::Duration;

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::RuleLifecycleState;
use crate::pools::RulePool;
use crate::services::jsonpath;

struct CustomMetricDef {
    name: String,
    help: String,
    label_names: Vec<String>,
}

impl PartialEq for CustomMetricDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.help == other.help && self.label_names == other.label_names
    }
}

/// Publishes `searchrule_value{rule}` / `searchrule_state{rule,state}` and
/// user-declared gauges derived from aggregations (spec.md §4.8).
pub struct MetricsExporter {
    rules: Arc<RulePool>,
    inner: RwLock<Inner>,
}

struct Inner {
    registry: Registry,
    value_gauge: GaugeVec,
    state_gauge: GaugeVec,
    custom_gauges: Vec<(CustomMetricDef, GaugeVec)>,
}

impl Inner {
    fn fresh() -> Self {
        let registry = Registry::new();
        let value_gauge = GaugeVec::new(
            Opts::new("searchrule_value", "latest observed value for a SearchRule"),
            &["rule"],
        )
        .expect("valid value gauge opts");
        let state_gauge = GaugeVec::new(
            Opts::new("searchrule_state", "1 if the rule is in this state, else 0"),
            &["rule", "state"],
        )
        .expect("valid state gauge opts");
        registry
            .register(Box::new(value_gauge.clone()))
            .expect("register value gauge");
        registry
            .register(Box::new(state_gauge.clone()))
            .expect("register state gauge");
        Self {
            registry,
            value_gauge,
            state_gauge,
            custom_gauges: Vec::new(),
        }
    }
}

impl MetricsExporter {
    pub fn new(rules: Arc<RulePool>) -> Self {
        Self {
            rules,
            inner: RwLock::new(Inner::fresh()),
        }
    }

    pub fn start(self: Arc<Self>, refresh_interval: Duration, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("metrics exporter refresh loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.refresh();
                    }
                }
            }
        });
    }

    fn refresh(&self) {
        let snapshot = self.rules.get_all();

        // Detect schema drift across all custom metric definitions up
        // front: if any definition changed, rebuild the whole registry
        // (Prometheus gauges with conflicting definitions cannot coexist).
        let mut wanted_defs: Vec<CustomMetricDef> = Vec::new();
        for state in snapshot.values() {
            for metric in &state.rule.custom_metrics {
                wanted_defs.push(CustomMetricDef {
                    name: metric.name.clone(),
                    help: metric.help.clone(),
                    label_names: metric.labels.iter().map(|l| l.name.clone()).collect(),
                });
            }
        }
        wanted_defs.sort_by(|a, b| a.name.cmp(&b.name));
        wanted_defs.dedup_by(|a, b| a.name == b.name);

        let needs_rebuild = {
            let current = self.inner.read().expect("metrics exporter lock poisoned");
            let mut current_defs: Vec<&CustomMetricDef> =
                current.custom_gauges.iter().map(|(d, _)| d).collect();
            current_defs.sort_by(|a, b| a.name.cmp(&b.name));
            current_defs.len() != wanted_defs.len()
                || current_defs
                    .iter()
                    .zip(wanted_defs.iter())
                    .any(|(a, b)| *a != b)
        };

        if needs_rebuild {
            warn!("custom metric schema drift detected, rebuilding metrics registry");
            let mut fresh = Inner::fresh();
            for def in &wanted_defs {
                let label_refs: Vec<&str> = def.label_names.iter().map(|s| s.as_str()).collect();
                if let Ok(gauge) =
                    GaugeVec::new(Opts::new(def.name.clone(), def.help.clone()), &label_refs)
                {
                    if fresh.registry.register(Box::new(gauge.clone())).is_ok() {
                        fresh.custom_gauges.push((
                            CustomMetricDef {
                                name: def.name.clone(),
                                help: def.help.clone(),
                                label_names: def.label_names.clone(),
                            },
                            gauge,
                        ));
                    }
                }
            }
            *self.inner.write().expect("metrics exporter lock poisoned") = fresh;
        }

        let inner = self.inner.read().expect("metrics exporter lock poisoned");
        for (key, state) in &snapshot {
            inner.value_gauge.with_label_values(&[key]).set(state.value);
            for candidate in RuleLifecycleState::ALL {
                let is_active = if candidate == state.state { 1.0 } else { 0.0 };
                inner
                    .state_gauge
                    .with_label_values(&[key, candidate.as_str()])
                    .set(is_active);
            }

            let Some(aggregations) = &state.aggregations else {
                continue;
            };
            for metric in &state.rule.custom_metrics {
                let Some((_, gauge)) = inner
                    .custom_gauges
                    .iter()
                    .find(|(def, _)| def.name == metric.name)
                else {
                    continue;
                };
                let Some(serde_json::Value::Array(elements)) =
                    jsonpath::extract(aggregations, &metric.aggregation_map).cloned()
                else {
                    continue;
                };
                for element in &elements {
                    let Some(value) = jsonpath::extract_f64(element, &metric.value) else {
                        continue;
                    };
                    let mut label_values = Vec::with_capacity(metric.labels.len());
                    for label in &metric.labels {
                        if let Some(static_value) = &label.static_value {
                            label_values.push(static_value.clone());
                        } else if let Some(path) = &label.value {
                            let extracted = jsonpath::extract(element, path)
                                .and_then(|v| v.as_str().map(str::to_string))
                                .unwrap_or_default();
                            label_values.push(extracted);
                        } else {
                            label_values.push(String::new());
                        }
                    }
                    let label_refs: Vec<&str> = label_values.iter().map(String::as_str).collect();
                    gauge.with_label_values(&label_refs).set(value);
                }
            }
        }
    }

    pub fn render(&self) -> String {
        let inner = self.inner.read().expect("metrics exporter lock poisoned");
        let encoder = TextEncoder::new();
        let metric_families = inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .expect("encode metrics");
        String::from_utf8(buffer).expect("prometheus output is utf8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::*;
    use crate::domain::{ConnectorKey, RuleState};

    fn rule_with_custom_metric() -> SearchRule {
        SearchRule {
            name: "by-host".into(),
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
                threshold: "0".into(),
                for_secs: 0,
            },
            action_ref: ActionRef {
                name: "webhook".into(),
                namespace: None,
                mode: ActionMode::Raw,
                data: None,
                labels: Default::default(),
                annotations: Default::default(),
            },
            custom_metrics: vec![CustomMetric {
                name: "by_host_count".into(),
                help: "docs per host".into(),
                aggregation_map: "by_host.buckets".into(),
                value: "doc_count".into(),
                labels: vec![MetricLabel {
                    name: "host".into(),
                    value: Some("key".into()),
                    static_value: None,
                }],
            }],
            description: None,
        }
    }

    #[test]
    fn exports_default_and_custom_gauges() {
        let rules = Arc::new(RulePool::new());
        let mut state = RuleState::new(rule_with_custom_metric());
        state.value = 8.0;
        state.state = RuleLifecycleState::Firing;
        state.aggregations = Some(serde_json::json!({
            "by_host": {"buckets": [
                {"key": "a", "doc_count": 3},
                {"key": "b", "doc_count": 5}
            ]}
        }));
        rules.set("default/by-host", state);

        let exporter = MetricsExporter::new(rules);
        exporter.refresh();
        let text = exporter.render();

        assert!(text.contains("searchrule_value{rule=\"default/by-host\"} 8"));
        assert!(text.contains("searchrule_state{rule=\"default/by-host\",state=\"Firing\"} 1"));
        assert!(text.contains("by_host_count{host=\"a\"} 3"));
        assert!(text.contains("by_host_count{host=\"b\"} 5"));
    }
}
