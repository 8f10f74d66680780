use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Scope + namespace + name triple identifying a QueryConnector or RulerAction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectorKey {
    pub scope: Scope,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Cluster,
    Namespaced,
}

impl ConnectorKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: Scope::Namespaced,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            scope: Scope::Cluster,
            namespace: String::new(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    #[serde(default)]
    pub key_username: Option<String>,
    #[serde(default)]
    pub key_password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Certificates {
    pub ca: Vec<u8>,
    pub client_cert: Vec<u8>,
    pub client_key: Vec<u8>,
}

/// Declarative spec for a QueryConnector as delivered by the change-feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConnectorSpec {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub tls_skip_verify: bool,
    #[serde(default)]
    pub credentials_secret: Option<SecretRef>,
    #[serde(default)]
    pub certificates_secret: Option<SecretRef>,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
}

fn default_sync_interval_secs() -> u64 {
    300
}

impl QueryConnectorSpec {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

/// State ConnectorRegistry attaches to a resolved connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorUsability {
    Usable,
    NoCredsFound,
    NoCertsFound,
}

#[derive(Debug, Clone)]
pub struct ConnectorEntry {
    pub key: ConnectorKey,
    pub spec: QueryConnectorSpec,
    pub credentials: Option<Credentials>,
    pub certificates: Option<Certificates>,
    pub usability: ConnectorUsability,
}

impl ConnectorEntry {
    pub fn is_usable(&self) -> bool {
        self.usability == ConnectorUsability::Usable
    }
}
