use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{
    Certificates, ConnectorEntry, ConnectorKey, ConnectorUsability, Credentials, Scope,
};
use crate::domain::rule::SearchRule;
use crate::secret_store::SecretStore;

/// Concurrent map keyed by ConnectorKey (§4.1). Resolution prefers the
/// rule's own namespace, then cluster scope.
pub struct ConnectorRegistry {
    entries: RwLock<HashMap<ConnectorKey, ConnectorEntry>>,
    /// Last time each entry's secrets were resolved, so the background
    /// ticker can skip entries whose `syncInterval` hasn't elapsed yet.
    last_refreshed: RwLock<HashMap<ConnectorKey, Instant>>,
    secrets: Arc<dyn SecretStore>,
}

impl ConnectorRegistry {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            last_refreshed: RwLock::new(HashMap::new()),
            secrets,
        }
    }

    /// Fetches referenced secret(s) once and stores credentials/certs
    /// alongside the spec. Missing or empty fields degrade the entry to
    /// an Unusable substate rather than failing the upsert.
    pub fn upsert(&self, key: ConnectorKey, spec: crate::domain::connector::QueryConnectorSpec) {
        let (credentials, certificates, usability) = self.resolve_secrets(&key, &spec);
        let entry = ConnectorEntry {
            key: key.clone(),
            spec,
            credentials,
            certificates,
            usability,
        };
        self.entries
            .write()
            .expect("connector registry lock poisoned")
            .insert(key.clone(), entry);
        self.last_refreshed
            .write()
            .expect("connector registry lock poisoned")
            .insert(key, Instant::now());
    }

    pub fn delete(&self, key: &ConnectorKey) {
        self.entries
            .write()
            .expect("connector registry lock poisoned")
            .remove(key);
        self.last_refreshed
            .write()
            .expect("connector registry lock poisoned")
            .remove(key);
    }

    /// Resolve(searchRule) -> ConnectorEntry | NotFound, preferring the
    /// rule's namespace then cluster scope, matched by name.
    pub fn resolve(&self, rule: &SearchRule) -> Option<ConnectorEntry> {
        let name = &rule.query_connector_ref.name;
        let entries = self.entries.read().expect("connector registry lock poisoned");
        let namespaced = ConnectorKey {
            scope: Scope::Namespaced,
            namespace: rule.namespace.clone(),
            name: name.clone(),
        };
        if let Some(entry) = entries.get(&namespaced) {
            return Some(entry.clone());
        }
        let cluster = ConnectorKey::cluster(name.clone());
        entries.get(&cluster).cloned()
    }

    /// One refresh per entry per its declared `syncInterval`; a single
    /// background ticker checks all entries each `interval` and refreshes
    /// those whose `syncInterval` has elapsed since the last refresh.
    pub fn start_refresh_loop(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("connector registry refresh loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.refresh_all();
                    }
                }
            }
        });
    }

    fn refresh_all(&self) {
        let keys: Vec<ConnectorKey> = self
            .entries
            .read()
            .expect("connector registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        let now = Instant::now();
        for key in keys {
            let spec = {
                let entries = self.entries.read().expect("connector registry lock poisoned");
                entries.get(&key).map(|e| e.spec.clone())
            };
            let Some(spec) = spec else { continue };

            let due = self
                .last_refreshed
                .read()
                .expect("connector registry lock poisoned")
                .get(&key)
                .map(|last| now.saturating_duration_since(*last) >= spec.sync_interval())
                .unwrap_or(true);
            if !due {
                continue;
            }

            let (credentials, certificates, usability) = self.resolve_secrets(&key, &spec);
            if let Some(entry) = self
                .entries
                .write()
                .expect("connector registry lock poisoned")
                .get_mut(&key)
            {
                entry.credentials = credentials;
                entry.certificates = certificates;
                entry.usability = usability;
            }
            self.last_refreshed
                .write()
                .expect("connector registry lock poisoned")
                .insert(key, now);
        }
    }

    fn resolve_secrets(
        &self,
        key: &ConnectorKey,
        spec: &crate::domain::connector::QueryConnectorSpec,
    ) -> (Option<Credentials>, Option<Certificates>, ConnectorUsability) {
        let mut credentials = None;
        let mut certificates = None;
        let mut usability = ConnectorUsability::Usable;

        if let Some(secret_ref) = &spec.credentials_secret {
            let data = self.secrets.get(&key.namespace, &secret_ref.name);
            let username = data
                .as_ref()
                .and_then(|d| d.get(secret_ref.key_username.as_deref().unwrap_or("username")))
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            let password = data
                .as_ref()
                .and_then(|d| d.get(secret_ref.key_password.as_deref().unwrap_or("password")))
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            if username.is_empty() || password.is_empty() {
                warn!(connector = %key.name, "credentials secret present but empty, marking NoCredsFound");
                usability = ConnectorUsability::NoCredsFound;
            } else {
                credentials = Some(Credentials { username, password });
            }
        }

        if let Some(secret_ref) = &spec.certificates_secret {
            let data = self.secrets.get(&key.namespace, &secret_ref.name);
            let ca = data.as_ref().and_then(|d| d.get("ca")).cloned().unwrap_or_default();
            let client_cert = data
                .as_ref()
                .and_then(|d| d.get("clientCert"))
                .cloned()
                .unwrap_or_default();
            let client_key = data
                .as_ref()
                .and_then(|d| d.get("clientKey"))
                .cloned()
                .unwrap_or_default();
            if ca.is_empty() || client_cert.is_empty() || client_key.is_empty() {
                warn!(connector = %key.name, "certificates secret present but incomplete, marking NoCertsFound");
                usability = ConnectorUsability::NoCertsFound;
            } else {
                certificates = Some(Certificates {
                    ca,
                    client_cert,
                    client_key,
                });
            }
        }

        (credentials, certificates, usability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connector::{QueryConnectorSpec, SecretRef};
    use crate::domain::ConnectorKey;

    fn rule_for(namespace: &str, connector_name: &str) -> SearchRule {
        use crate::domain::rule::*;
        SearchRule {
            name: "r".into(),
            namespace: namespace.into(),
            query_connector_ref: ConnectorKey::namespaced(namespace, connector_name),
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
                name: "a".into(),
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
    fn upsert_without_credentials_is_usable() {
        let registry = ConnectorRegistry::new(Arc::new(crate::secret_store::InMemorySecretStore::new()));
        let key = ConnectorKey::namespaced("default", "es");
        registry.upsert(
            key.clone(),
            QueryConnectorSpec {
                url: "http://es:9200".into(),
                headers: Default::default(),
                tls_skip_verify: false,
                credentials_secret: None,
                certificates_secret: None,
                sync_interval_secs: 300,
            },
        );
        let resolved = registry.resolve(&rule_for("default", "es")).expect("resolved");
        assert!(resolved.is_usable());
    }

    #[test]
    fn missing_credentials_secret_yields_no_creds_found() {
        let secrets = Arc::new(crate::secret_store::InMemorySecretStore::new());
        let registry = ConnectorRegistry::new(secrets);
        let key = ConnectorKey::namespaced("default", "es");
        registry.upsert(
            key,
            QueryConnectorSpec {
                url: "http://es:9200".into(),
                headers: Default::default(),
                tls_skip_verify: false,
                credentials_secret: Some(SecretRef {
                    name: "es-creds".into(),
                    key_username: None,
                    key_password: None,
                }),
                certificates_secret: None,
                sync_interval_secs: 300,
            },
        );
        let resolved = registry.resolve(&rule_for("default", "es")).expect("resolved");
        assert!(!resolved.is_usable());
        assert_eq!(resolved.usability, ConnectorUsability::NoCredsFound);
    }

    #[test]
    fn resolve_falls_back_to_cluster_scope() {
        let registry = ConnectorRegistry::new(Arc::new(crate::secret_store::InMemorySecretStore::new()));
        registry.upsert(
            ConnectorKey::cluster("shared-es"),
            QueryConnectorSpec {
                url: "http://es:9200".into(),
                headers: Default::default(),
                tls_skip_verify: false,
                credentials_secret: None,
                certificates_secret: None,
                sync_interval_secs: 300,
            },
        );
        let resolved = registry
            .resolve(&rule_for("default", "shared-es"))
            .expect("resolved via cluster scope");
        assert!(resolved.is_usable());
    }

    #[test]
    fn delete_removes_entry_round_trip() {
        let registry = ConnectorRegistry::new(Arc::new(crate::secret_store::InMemorySecretStore::new()));
        let key = ConnectorKey::namespaced("default", "es");
        registry.upsert(
            key.clone(),
            QueryConnectorSpec {
                url: "http://es:9200".into(),
                headers: Default::default(),
                tls_skip_verify: false,
                credentials_secret: None,
                certificates_secret: None,
                sync_interval_secs: 300,
            },
        );
        registry.delete(&key);
        assert!(registry.resolve(&rule_for("default", "es")).is_none());
    }

    #[test]
    fn refresh_all_skips_entries_whose_sync_interval_has_not_elapsed() {
        let secrets = Arc::new(crate::secret_store::InMemorySecretStore::new());
        let mut creds = HashMap::new();
        creds.insert("username".to_string(), b"alice".to_vec());
        creds.insert("password".to_string(), b"hunter2".to_vec());
        secrets.put("default", "es-creds", creds);

        let registry = ConnectorRegistry::new(secrets.clone());
        let key = ConnectorKey::namespaced("default", "es");
        registry.upsert(
            key.clone(),
            QueryConnectorSpec {
                url: "http://es:9200".into(),
                headers: Default::default(),
                tls_skip_verify: false,
                credentials_secret: Some(SecretRef {
                    name: "es-creds".into(),
                    key_username: None,
                    key_password: None,
                }),
                certificates_secret: None,
                sync_interval_secs: 300,
            },
        );

        // Secret goes empty; a due refresh would degrade the entry to
        // NoCredsFound, but the 300s sync interval hasn't elapsed yet.
        secrets.put("default", "es-creds", HashMap::new());
        registry.refresh_all();

        let resolved = registry.resolve(&rule_for("default", "es")).expect("resolved");
        assert!(resolved.is_usable());
    }
}
