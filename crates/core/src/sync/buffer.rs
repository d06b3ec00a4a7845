//! Durable table-keyed queue of writes made while disconnected.
//!
//! The buffer is the only writer of the `pending_<table>` keys. Entries are
//! appended by the facade, read back grouped by table for replay, and
//! removed only after the sync engine confirms a fully successful drain.
//! They survive process restarts; the pending count and the local id counter
//! are rebuilt from the durable store at construction.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use log::{debug, warn};
use serde_json::Value;

use crate::errors::StorageError;
use crate::store::{pending_key, LocalStore, PENDING_PREFIX};

use super::status_model::{BufferedWrite, WriteAction};

struct BufferInner {
    pending: usize,
    next_local_id: i64,
}

pub struct WriteBuffer {
    store: Arc<dyn LocalStore>,
    inner: Mutex<BufferInner>,
}

impl WriteBuffer {
    /// Opens the buffer over the durable store, rebuilding the pending count
    /// and reseeding the local id counter from whatever survived a restart.
    pub fn load(store: Arc<dyn LocalStore>) -> Result<Self, StorageError> {
        let mut pending = 0;
        let mut max_local_id = 0;
        for key in store.keys_with_prefix(PENDING_PREFIX)? {
            let Some(raw) = store.get(&key)? else { continue };
            match serde_json::from_str::<Vec<BufferedWrite>>(&raw) {
                Ok(entries) => {
                    pending += entries.len();
                    max_local_id = entries
                        .iter()
                        .map(|entry| entry.local_id)
                        .fold(max_local_id, i64::max);
                }
                Err(err) => {
                    // Left in place rather than dropped; it will surface again
                    // on the next load.
                    warn!("[Buffer] Unreadable pending list under '{}': {}", key, err);
                }
            }
        }
        Ok(Self {
            store,
            inner: Mutex::new(BufferInner {
                pending,
                next_local_id: max_local_id + 1,
            }),
        })
    }

    fn inner(&self) -> MutexGuard<'_, BufferInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count of buffered writes awaiting sync.
    pub fn pending(&self) -> usize {
        self.inner().pending
    }

    /// Appends a write to the table-keyed durable list.
    pub fn enqueue(
        &self,
        table: &str,
        record_id: Option<Value>,
        payload: Value,
        action: WriteAction,
    ) -> Result<BufferedWrite, StorageError> {
        let mut inner = self.inner();
        let key = pending_key(table);
        let mut entries = self.read_list(&key)?;
        let write = BufferedWrite {
            table: table.to_string(),
            record_id,
            payload,
            local_id: inner.next_local_id,
            timestamp: Utc::now(),
            action,
        };
        entries.push(write.clone());
        let raw = serde_json::to_string(&entries).map_err(|err| StorageError::corrupt(err.to_string()))?;
        self.store.set(&key, &raw)?;
        inner.next_local_id += 1;
        inner.pending += 1;
        debug!(
            "[Buffer] Queued {:?} for '{}' (local_id={}, pending={})",
            action, table, write.local_id, inner.pending
        );
        Ok(write)
    }

    /// Every buffered entry grouped by table, in enqueue order.
    ///
    /// Does not remove anything; removal happens via [`WriteBuffer::clear`]
    /// or [`WriteBuffer::clear_drained`] after the sync engine confirms
    /// success.
    pub fn drain_all(&self) -> Result<Vec<(String, Vec<BufferedWrite>)>, StorageError> {
        let _inner = self.inner();
        let mut groups = Vec::new();
        for key in self.store.keys_with_prefix(PENDING_PREFIX)? {
            let entries = self.read_list(&key)?;
            if entries.is_empty() {
                continue;
            }
            let table = key
                .strip_prefix(PENDING_PREFIX)
                .unwrap_or(key.as_str())
                .to_string();
            groups.push((table, entries));
        }
        Ok(groups)
    }

    /// Removes exactly the drained entries, keeping anything enqueued while
    /// the drain was running.
    pub fn clear_drained(
        &self,
        drained: &[(String, Vec<BufferedWrite>)],
    ) -> Result<(), StorageError> {
        let mut inner = self.inner();
        for (table, writes) in drained {
            let drained_ids: HashSet<i64> = writes.iter().map(|write| write.local_id).collect();
            let key = pending_key(table);
            let entries = self.read_list(&key)?;
            let before = entries.len();
            let kept: Vec<BufferedWrite> = entries
                .into_iter()
                .filter(|entry| !drained_ids.contains(&entry.local_id))
                .collect();
            let removed = before - kept.len();
            if kept.is_empty() {
                self.store.remove(&key)?;
            } else {
                let raw =
                    serde_json::to_string(&kept).map_err(|err| StorageError::corrupt(err.to_string()))?;
                self.store.set(&key, &raw)?;
            }
            inner.pending = inner.pending.saturating_sub(removed);
        }
        debug!("[Buffer] Drained entries cleared (pending={})", inner.pending);
        Ok(())
    }

    /// Wipes all buffered entries and resets the pending count.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut inner = self.inner();
        for key in self.store.keys_with_prefix(PENDING_PREFIX)? {
            self.store.remove(&key)?;
        }
        inner.pending = 0;
        Ok(())
    }

    fn read_list(&self, key: &str) -> Result<Vec<BufferedWrite>, StorageError> {
        match self.store.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|err| StorageError::corrupt(err.to_string())),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn buffer() -> (Arc<MemoryStore>, WriteBuffer) {
        let store = Arc::new(MemoryStore::new());
        let buffer = WriteBuffer::load(Arc::clone(&store) as Arc<dyn LocalStore>).unwrap();
        (store, buffer)
    }

    #[test]
    fn enqueue_preserves_order_and_counts() {
        let (_store, buffer) = buffer();
        for i in 0..3 {
            buffer
                .enqueue(
                    "products",
                    None,
                    json!({"name": format!("w{i}")}),
                    WriteAction::Create,
                )
                .unwrap();
        }
        assert_eq!(buffer.pending(), 3);

        let groups = buffer.drain_all().unwrap();
        assert_eq!(groups.len(), 1);
        let (table, entries) = &groups[0];
        assert_eq!(table, "products");
        let names: Vec<_> = entries
            .iter()
            .map(|entry| entry.payload["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["w0", "w1", "w2"]);
        assert!(entries.windows(2).all(|w| w[0].local_id < w[1].local_id));
    }

    #[test]
    fn local_id_reseeds_after_restart() {
        let (store, buffer) = buffer();
        buffer
            .enqueue("products", None, json!({"name": "a"}), WriteAction::Create)
            .unwrap();
        buffer
            .enqueue("suppliers", None, json!({"name": "b"}), WriteAction::Create)
            .unwrap();
        drop(buffer);

        let reopened = WriteBuffer::load(store as Arc<dyn LocalStore>).unwrap();
        assert_eq!(reopened.pending(), 2);
        let write = reopened
            .enqueue("products", None, json!({"name": "c"}), WriteAction::Create)
            .unwrap();
        assert_eq!(write.local_id, 3);
    }

    #[test]
    fn clear_drained_keeps_later_entries() {
        let (_store, buffer) = buffer();
        buffer
            .enqueue("products", None, json!({"name": "a"}), WriteAction::Create)
            .unwrap();
        let drained = buffer.drain_all().unwrap();
        buffer
            .enqueue("products", None, json!({"name": "late"}), WriteAction::Create)
            .unwrap();

        buffer.clear_drained(&drained).unwrap();
        assert_eq!(buffer.pending(), 1);
        let remaining = buffer.drain_all().unwrap();
        assert_eq!(remaining[0].1[0].payload["name"], json!("late"));
    }

    #[test]
    fn clear_wipes_everything() {
        let (_store, buffer) = buffer();
        buffer
            .enqueue("products", None, json!({}), WriteAction::Create)
            .unwrap();
        buffer
            .enqueue("suppliers", None, json!({}), WriteAction::Create)
            .unwrap();
        buffer.clear().unwrap();
        assert_eq!(buffer.pending(), 0);
        assert!(buffer.drain_all().unwrap().is_empty());
    }
}
