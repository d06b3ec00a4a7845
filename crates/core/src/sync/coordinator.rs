//! The connectivity & sync coordinator: shared state, status fan-out and the
//! save/update/delete facade consumed by UI collaborators.
//!
//! One coordinator is constructed explicitly during application startup and
//! shared as an `Arc`; the remote client is injected with
//! [`SyncCoordinator::set_remote`] once the asynchronous connection exists.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::{Error, RemoteStoreError, Result, StorageError};
use crate::store::{backup_key, Filter, LocalStore, RemoteStore};

use super::buffer::WriteBuffer;
use super::scheduler::CoordinatorConfig;
use super::status_model::{
    ConflictKind, ConflictResolution, ConnectionMode, ConnectionStatus, SyncConflict, WriteAction,
    WriteOutcome,
};

pub type StatusCallback = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

pub(super) struct CoordinatorState {
    pub(super) is_online: bool,
    pub(super) is_cloud_connected: bool,
    pub(super) last_sync_time: Option<DateTime<Utc>>,
    pub(super) connection_attempts: u64,
    pub(super) syncing: bool,
}

pub struct SyncCoordinator {
    pub(super) config: CoordinatorConfig,
    pub(super) local: Arc<dyn LocalStore>,
    remote: RwLock<Option<Arc<dyn RemoteStore>>>,
    pub(super) buffer: WriteBuffer,
    pub(super) state: Mutex<CoordinatorState>,
    subscribers: Mutex<Vec<StatusCallback>>,
    pub(super) conflicts: Mutex<Vec<SyncConflict>>,
    /// At-most-one drain: overlapping triggers take the `try_lock` miss and
    /// become no-ops.
    pub(super) drain_guard: AsyncMutex<()>,
    pub(super) probe_task: Mutex<Option<JoinHandle<()>>>,
    pub(super) self_ref: Weak<SyncCoordinator>,
}

impl SyncCoordinator {
    /// Opens the coordinator over the durable local store.
    ///
    /// Starts in `offline` mode with no connectivity assumption; pending
    /// writes left over from a previous run are counted immediately.
    pub fn new(
        config: CoordinatorConfig,
        local: Arc<dyn LocalStore>,
    ) -> std::result::Result<Arc<Self>, StorageError> {
        let buffer = WriteBuffer::load(Arc::clone(&local))?;
        Ok(Arc::new_cyclic(|weak| Self {
            config,
            local,
            remote: RwLock::new(None),
            buffer,
            state: Mutex::new(CoordinatorState {
                is_online: false,
                is_cloud_connected: false,
                last_sync_time: None,
                connection_attempts: 0,
                syncing: false,
            }),
            subscribers: Mutex::new(Vec::new()),
            conflicts: Mutex::new(Vec::new()),
            drain_guard: AsyncMutex::new(()),
            probe_task: Mutex::new(None),
            self_ref: weak.clone(),
        }))
    }

    /// Injects (or replaces) the remote store client.
    pub fn set_remote(&self, remote: Arc<dyn RemoteStore>) {
        *self
            .remote
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(remote);
    }

    pub(super) fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        self.remote
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(super) fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_cloud_connected(&self) -> bool {
        self.state().is_cloud_connected
    }

    /// Immutable status snapshot. The mode is derived, never stored.
    pub fn get_connection_status(&self) -> ConnectionStatus {
        let state = self.state();
        let mode = if state.syncing {
            ConnectionMode::Syncing
        } else if state.is_cloud_connected {
            ConnectionMode::Cloud
        } else {
            ConnectionMode::Offline
        };
        ConnectionStatus {
            is_online: state.is_online,
            is_cloud_connected: state.is_cloud_connected,
            last_sync_time: state.last_sync_time,
            pending_local_data: self.buffer.pending(),
            connection_attempts: state.connection_attempts,
            mode,
        }
    }

    /// Registers a status subscriber. Best-effort: callbacks are invoked with
    /// a full snapshot on every transition, and there is no unsubscribe.
    pub fn on_status_change(&self, callback: impl Fn(ConnectionStatus) + Send + Sync + 'static) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    pub(super) fn notify_subscribers(&self) {
        let status = self.get_connection_status();
        let callbacks: Vec<StatusCallback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            callback(status.clone());
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Facade: save / update / delete / fetch
    // ─────────────────────────────────────────────────────────────────────

    /// Inserts a record, remotely when connected, buffered locally otherwise.
    ///
    /// Remote errors never propagate: a failed remote attempt falls back to
    /// the write buffer. Only a buffering failure yields `success == false`.
    pub async fn save(&self, table: &str, data: Value) -> WriteOutcome {
        if self.is_cloud_connected() {
            if let Some(remote) = self.remote() {
                match remote.insert(table, vec![data.clone()]).await {
                    Ok(_) => return WriteOutcome::cloud(),
                    Err(err) => {
                        warn!(
                            "[Sync] Remote insert into '{}' failed, buffering locally: {}",
                            table, err
                        );
                    }
                }
            }
        }
        self.buffer_write(table, None, data, WriteAction::Create)
    }

    /// Updates a record by id, with the same dual-path behavior as `save`.
    pub async fn update(&self, table: &str, id: Value, data: Value) -> WriteOutcome {
        if self.is_cloud_connected() {
            if let Some(remote) = self.remote() {
                match remote
                    .update(table, &Filter::Id(id.clone()), data.clone())
                    .await
                {
                    Ok(_) => return WriteOutcome::cloud(),
                    Err(err) => {
                        warn!(
                            "[Sync] Remote update of '{}' failed, buffering locally: {}",
                            table, err
                        );
                    }
                }
            }
        }
        self.buffer_write(table, Some(id), data, WriteAction::Update)
    }

    /// Deletes a record by id, with the same dual-path behavior as `save`.
    pub async fn delete(&self, table: &str, id: Value) -> WriteOutcome {
        if self.is_cloud_connected() {
            if let Some(remote) = self.remote() {
                match remote.delete(table, &Filter::Id(id.clone())).await {
                    Ok(()) => return WriteOutcome::cloud(),
                    Err(err) => {
                        warn!(
                            "[Sync] Remote delete from '{}' failed, buffering locally: {}",
                            table, err
                        );
                    }
                }
            }
        }
        self.buffer_write(table, Some(id), Value::Null, WriteAction::Delete)
    }

    /// Reads a table: remote with a snapshot refresh when connected, the last
    /// read-through snapshot otherwise.
    pub async fn fetch(&self, table: &str) -> Result<Vec<Value>> {
        if self.is_cloud_connected() {
            if let Some(remote) = self.remote() {
                match remote.select(table, &Filter::All, None).await {
                    Ok(rows) => {
                        if let Err(err) = self.store_snapshot(table, &rows) {
                            warn!("[Sync] Snapshot refresh for '{}' failed: {}", table, err);
                        }
                        return Ok(rows);
                    }
                    Err(err) => {
                        warn!(
                            "[Sync] Remote fetch of '{}' failed, serving snapshot: {}",
                            table, err
                        );
                    }
                }
            }
        }
        self.load_snapshot(table)
    }

    fn buffer_write(
        &self,
        table: &str,
        record_id: Option<Value>,
        payload: Value,
        action: WriteAction,
    ) -> WriteOutcome {
        match self.buffer.enqueue(table, record_id, payload, action) {
            Ok(_) => {
                self.notify_subscribers();
                // Covers the case where connectivity is already up but the
                // caller buffered because a remote attempt just failed.
                if self.is_cloud_connected() {
                    self.spawn_drain();
                }
                WriteOutcome::local()
            }
            Err(err) => {
                error!(
                    "[Sync] Buffering for '{}' failed; write is lost unless retried by the caller: {}",
                    table, err
                );
                WriteOutcome::failed()
            }
        }
    }

    pub(super) fn spawn_drain(&self) {
        if let Some(coordinator) = self.self_ref.upgrade() {
            tokio::spawn(async move {
                coordinator.sync_now().await;
            });
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Conflict surface
    // ─────────────────────────────────────────────────────────────────────

    /// Conflicts awaiting an operator decision.
    pub fn conflicts(&self) -> Vec<SyncConflict> {
        self.conflicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(super) fn push_conflicts(&self, new_conflicts: Vec<SyncConflict>) {
        if new_conflicts.is_empty() {
            return;
        }
        self.conflicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(new_conflicts);
    }

    /// Applies an operator decision to a surfaced conflict and discards it.
    ///
    /// A failed application puts the conflict back so it is not lost.
    pub async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        resolution: ConflictResolution,
    ) -> Result<()> {
        let conflict = {
            let mut conflicts = self
                .conflicts
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let index = conflicts
                .iter()
                .position(|conflict| conflict.id == conflict_id)
                .ok_or_else(|| Error::unexpected(format!("unknown conflict {conflict_id}")))?;
            conflicts.remove(index)
        };

        if let Err(err) = self.apply_resolution(&conflict, &resolution).await {
            self.conflicts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(conflict);
            return Err(err);
        }
        Ok(())
    }

    async fn apply_resolution(
        &self,
        conflict: &SyncConflict,
        resolution: &ConflictResolution,
    ) -> Result<()> {
        match resolution {
            ConflictResolution::KeepServer => {
                self.patch_snapshot_row(
                    &conflict.table,
                    &conflict.record_id,
                    conflict.server_data.as_ref(),
                )?;
                Ok(())
            }
            ConflictResolution::KeepLocal => {
                let remote = self.remote().ok_or(RemoteStoreError::NotConfigured)?;
                let filter = Filter::Id(conflict.record_id.clone());
                match conflict.conflict_kind {
                    ConflictKind::Delete => {
                        remote.delete(&conflict.table, &filter).await?;
                        self.patch_snapshot_row(&conflict.table, &conflict.record_id, None)?;
                    }
                    ConflictKind::Create | ConflictKind::Update => {
                        if conflict.server_data.is_some() {
                            remote
                                .update(&conflict.table, &filter, conflict.local_data.clone())
                                .await?;
                        } else {
                            remote
                                .insert(&conflict.table, vec![conflict.local_data.clone()])
                                .await?;
                        }
                        self.patch_snapshot_row(
                            &conflict.table,
                            &conflict.record_id,
                            Some(&conflict.local_data),
                        )?;
                    }
                }
                Ok(())
            }
            ConflictResolution::Merge(merged) => {
                let remote = self.remote().ok_or(RemoteStoreError::NotConfigured)?;
                let filter = Filter::Id(conflict.record_id.clone());
                remote
                    .update(&conflict.table, &filter, merged.clone())
                    .await?;
                self.patch_snapshot_row(&conflict.table, &conflict.record_id, Some(merged))?;
                Ok(())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read-through snapshots
    // ─────────────────────────────────────────────────────────────────────

    pub(super) fn store_snapshot(
        &self,
        table: &str,
        rows: &[Value],
    ) -> std::result::Result<(), StorageError> {
        let raw = serde_json::to_string(rows).map_err(|err| StorageError::corrupt(err.to_string()))?;
        self.local.set(&backup_key(table), &raw)
    }

    pub(super) fn load_snapshot(&self, table: &str) -> Result<Vec<Value>> {
        match self.local.get(&backup_key(table))? {
            Some(raw) => {
                let rows = serde_json::from_str(&raw)
                    .map_err(|err| StorageError::corrupt(err.to_string()))?;
                Ok(rows)
            }
            None => Ok(Vec::new()),
        }
    }

    fn patch_snapshot_row(
        &self,
        table: &str,
        record_id: &Value,
        row: Option<&Value>,
    ) -> std::result::Result<(), StorageError> {
        let mut rows = match self.load_snapshot(table) {
            Ok(rows) => rows,
            Err(err) => {
                debug!("[Sync] Snapshot for '{}' unreadable during patch: {}", table, err);
                Vec::new()
            }
        };
        rows.retain(|existing| existing.get("id") != Some(record_id));
        if let Some(row) = row {
            rows.push(row.clone());
        }
        self.store_snapshot(table, &rows)
    }
}
