use std::collections::HashMap;
use std::sync::RwLock;

/// Read-only secret lookup. `Get(namespace, name) -> map<string, bytes> |
/// NotFound`. Real secret storage is an external collaborator (spec.md
/// §1); this crate only depends on the trait.
pub trait SecretStore: Send + Sync {
    fn get(&self, namespace: &str, name: &str) -> Option<HashMap<String, Vec<u8>>>;
}

/// In-memory reference implementation, used by `StaticChangeFeed` and by
/// tests. Production deployments supply their own `SecretStore` (backed by
/// the same store the declarative resource API reads from).
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<(String, String), HashMap<String, Vec<u8>>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, namespace: &str, name: &str, data: HashMap<String, Vec<u8>>) {
        self.secrets
            .write()
            .expect("secret store lock poisoned")
            .insert((namespace.to_string(), name.to_string()), data);
    }
}

impl SecretStore for InMemorySecretStore {
    fn get(&self, namespace: &str, name: &str) -> Option<HashMap<String, Vec<u8>>> {
        self.secrets
            .read()
            .expect("secret store lock poisoned")
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}
