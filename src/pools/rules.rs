use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::RuleState;

/// Thread-safe map: rule key -> RuleState. `GetAll` returns a cloned
/// snapshot so iteration is never exposed to concurrent mutation.
#[derive(Default)]
pub struct RulePool {
    inner: RwLock<HashMap<String, RuleState>>,
}

impl RulePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, state: RuleState) {
        self.inner
            .write()
            .expect("rule pool lock poisoned")
            .insert(key.into(), state);
    }

    pub fn get(&self, key: &str) -> Option<RuleState> {
        self.inner
            .read()
            .expect("rule pool lock poisoned")
            .get(key)
            .cloned()
    }

    /// Mutates the entry in place under the write lock, creating it via
    /// `default` if absent. Returns the value the mutation left behind.
    pub fn entry_with<F>(&self, key: &str, default: impl FnOnce() -> RuleState, mutate: F) -> RuleState
    where
        F: FnOnce(&mut RuleState),
    {
        let mut guard = self.inner.write().expect("rule pool lock poisoned");
        let entry = guard.entry(key.to_string()).or_insert_with(default);
        mutate(entry);
        entry.clone()
    }

    pub fn delete(&self, key: &str) {
        self.inner.write().expect("rule pool lock poisoned").remove(key);
    }

    pub fn get_all(&self) -> HashMap<String, RuleState> {
        self.inner.read().expect("rule pool lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("rule pool lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
