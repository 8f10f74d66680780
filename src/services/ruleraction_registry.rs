use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::domain::rule::SearchRule;
use crate::domain::{Credentials, RulerActionSpec, WebhookSpec};
use crate::secret_store::SecretStore;

/// A RulerAction resolved with its webhook credentials loaded, ready for
/// the Dispatcher to build a request from (spec.md §4.5 step 3: "Load
/// action credentials via ConnectorRegistry-like mechanism").
#[derive(Debug, Clone)]
pub struct ResolvedRulerAction {
    pub webhook: WebhookSpec,
    pub credentials: Option<Credentials>,
}

/// Keyed the same way as ConnectorRegistry ("namespace/name"); resolution
/// mirrors ConnectorRegistry's namespace-then-cluster-scope lookup.
pub struct RulerActionRegistry {
    entries: RwLock<HashMap<String, RulerActionSpec>>,
    secrets: Arc<dyn SecretStore>,
}

impl RulerActionRegistry {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            secrets,
        }
    }

    pub fn upsert(&self, key: String, spec: RulerActionSpec) {
        self.entries
            .write()
            .expect("ruler action registry lock poisoned")
            .insert(key, spec);
    }

    pub fn delete(&self, key: &str) {
        self.entries
            .write()
            .expect("ruler action registry lock poisoned")
            .remove(key);
    }

    pub fn resolve(&self, key: &str, rule: &SearchRule) -> Option<ResolvedRulerAction> {
        let spec = self
            .entries
            .read()
            .expect("ruler action registry lock poisoned")
            .get(key)
            .cloned()?;

        let credentials = spec.webhook.credentials_secret.as_ref().and_then(|secret_ref| {
            let data = self.secrets.get(&rule.namespace, &secret_ref.name)?;
            let username = data
                .get(secret_ref.key_username.as_deref().unwrap_or("username"))
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            let password = data
                .get(secret_ref.key_password.as_deref().unwrap_or("password"))
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            if username.is_empty() || password.is_empty() {
                warn!(action = %key, "webhook credentials secret present but empty");
                None
            } else {
                Some(Credentials { username, password })
            }
        });

        Some(ResolvedRulerAction {
            webhook: spec.webhook,
            credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::HttpVerb;
    use crate::domain::ConnectorKey;
    use crate::domain::rule::*;
    use crate::secret_store::InMemorySecretStore;

    fn rule() -> SearchRule {
        SearchRule {
            name: "r".into(),
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
            custom_metrics: vec![],
            description: None,
        }
    }

    #[test]
    fn resolve_without_credentials_secret_succeeds() {
        let registry = RulerActionRegistry::new(Arc::new(InMemorySecretStore::new()));
        registry.upsert(
            "default/webhook".into(),
            RulerActionSpec {
                name: "webhook".into(),
                namespace: "default".into(),
                webhook: WebhookSpec {
                    url: "http://sink/hook".into(),
                    verb: HttpVerb::Post,
                    headers: Default::default(),
                    tls_skip_verify: false,
                    validator: None,
                    credentials_secret: None,
                },
            },
        );
        let resolved = registry.resolve("default/webhook", &rule()).expect("resolved");
        assert!(resolved.credentials.is_none());
    }
}
