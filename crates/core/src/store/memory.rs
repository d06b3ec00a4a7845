//! In-process `LocalStore` used by tests and embedders without durability
//! requirements.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::errors::StorageError;

use super::LocalStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_remove() {
        let store = MemoryStore::new();
        store.set("pending_products", "[]").unwrap();
        assert_eq!(
            store.get("pending_products").unwrap().as_deref(),
            Some("[]")
        );
        store.remove("pending_products").unwrap();
        assert_eq!(store.get("pending_products").unwrap(), None);
    }

    #[test]
    fn prefix_scan_is_sorted() {
        let store = MemoryStore::new();
        store.set("pending_suppliers", "b").unwrap();
        store.set("pending_products", "a").unwrap();
        store.set("backup_products", "c").unwrap();
        assert_eq!(
            store.keys_with_prefix("pending_").unwrap(),
            vec!["pending_products", "pending_suppliers"]
        );
    }
}
