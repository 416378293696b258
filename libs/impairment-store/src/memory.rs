use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use linker_api::ConfigStore;

// ═══════════════════════════════════════════════════════════════
//  MemoryStore
// ═══════════════════════════════════════════════════════════════

/// Плоское in-memory хранилище: ключ → строковое значение.
/// Для тестов и встраивания без файла.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let values = values.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { values: RwLock::new(values) }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.values.write().unwrap_or_else(PoisonError::into_inner).remove(key);
    }
}

impl ConfigStore for MemoryStore {
    fn get_value(&self, key: &str) -> String {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_key_reads_as_empty_string() {
        let store = MemoryStore::with_values([("a", "1")]);
        assert_eq!(store.get_value("a"), "1");
        assert_eq!(store.get_value("b"), "");

        store.set("b", "2");
        store.remove("a");
        assert_eq!(store.get_value("a"), "");
        assert_eq!(store.get_value("b"), "2");
    }
}
