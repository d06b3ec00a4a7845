//! Storage capability traits consumed by the sync coordinator.
//!
//! The coordinator never talks to a concrete backend directly: the remote
//! relational store and the durable local key-value store are both narrow,
//! injectable capabilities. `stockbook-connect` and
//! `stockbook-storage-sqlite` provide the production adapters.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{RemoteStoreError, StorageError};

/// Row filter for remote store operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every row in the table.
    All,
    /// Rows whose `id` column equals the value.
    Id(Value),
    /// Rows where the named column equals the value.
    Eq(String, Value),
}

impl Filter {
    pub fn id(value: impl Into<Value>) -> Self {
        Self::Id(value.into())
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(column.into(), value.into())
    }
}

/// Remote relational row store.
///
/// The concrete connection is established asynchronously during application
/// startup, so the coordinator treats this capability as injectable after
/// construction. Every operation is fallible with a structured error; the
/// coordinator converts failures into buffering, never into caller-visible
/// exceptions.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch rows matching `filter`, optionally capped at `limit` rows.
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> std::result::Result<Vec<Value>, RemoteStoreError>;

    /// Insert rows, returning the stored representation.
    async fn insert(
        &self,
        table: &str,
        rows: Vec<Value>,
    ) -> std::result::Result<Vec<Value>, RemoteStoreError>;

    /// Patch rows matching `filter`, returning the updated representation.
    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: Value,
    ) -> std::result::Result<Vec<Value>, RemoteStoreError>;

    /// Delete rows matching `filter`.
    async fn delete(&self, table: &str, filter: &Filter)
        -> std::result::Result<(), RemoteStoreError>;
}

/// Durable string-keyed local storage. Values survive process restart.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> std::result::Result<(), StorageError>;

    fn remove(&self, key: &str) -> std::result::Result<(), StorageError>;

    /// All keys starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> std::result::Result<Vec<String>, StorageError>;
}

/// Key prefix for buffered write lists.
pub const PENDING_PREFIX: &str = "pending_";

/// Key prefix for read-through table snapshots.
pub const BACKUP_PREFIX: &str = "backup_";

/// Storage key for the buffered write list of `table`.
pub fn pending_key(table: &str) -> String {
    format!("{PENDING_PREFIX}{table}")
}

/// Storage key for the read-through snapshot of `table`.
pub fn backup_key(table: &str) -> String {
    format!("{BACKUP_PREFIX}{table}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_keys() {
        assert_eq!(pending_key("products"), "pending_products");
        assert_eq!(backup_key("suppliers"), "backup_suppliers");
    }
}
