//! Sync engine: drain buffered writes against the remote store, refresh
//! read-through snapshots and surface conflicts.

use std::collections::HashMap;

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value;

use crate::errors::RemoteStoreError;
use crate::store::{Filter, RemoteStore};

use super::coordinator::SyncCoordinator;
use super::status_model::{
    BufferedWrite, ConflictKind, DrainSummary, SyncConflict, WriteAction,
};

/// Result of replaying a single buffered write.
enum ApplyOutcome {
    Applied,
    Conflicted(SyncConflict),
}

/// Snapshot rows keyed by record identity, the three-way baseline for
/// conflict detection.
type BaselineMap = HashMap<String, Value>;

fn record_key(id: &Value) -> String {
    match id {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn record_id_of(write: &BufferedWrite) -> Option<Value> {
    write
        .record_id
        .clone()
        .or_else(|| write.payload.get("id").cloned())
}

/// A record diverged when its remote current value no longer matches the
/// snapshot taken before we went offline: someone else mutated it in the
/// interim.
fn diverged(baseline: Option<&Value>, current: Option<&Value>) -> bool {
    match baseline {
        // No baseline to compare against: replay proceeds, last write wins.
        None => false,
        Some(baseline_row) => match current {
            Some(current_row) => baseline_row != current_row,
            None => true,
        },
    }
}

impl SyncCoordinator {
    /// Runs one drain pass. Returns `None` when a drain is already in
    /// progress: overlapping triggers are no-ops, never concurrent drains.
    pub async fn sync_now(&self) -> Option<DrainSummary> {
        let Ok(_guard) = self.drain_guard.try_lock() else {
            debug!("[Sync] Drain already in progress, skipping");
            return None;
        };
        Some(self.run_drain().await)
    }

    /// Probes first when disconnected, then drains. Returns whether a drain
    /// ran and fully succeeded.
    pub async fn force_sync(&self) -> bool {
        if !self.is_cloud_connected() && !self.probe_remote().await {
            return false;
        }
        match self.sync_now().await {
            Some(summary) => summary.success,
            None => false,
        }
    }

    async fn run_drain(&self) -> DrainSummary {
        {
            let mut state = self.state();
            state.syncing = true;
        }
        self.notify_subscribers();
        info!("[Sync] Drain started ({} pending)", self.buffer.pending());

        let summary = self.drain_inner().await;

        {
            let mut state = self.state();
            state.syncing = false;
            state.is_cloud_connected = summary.success;
            if summary.success {
                state.last_sync_time = Some(Utc::now());
            }
        }
        self.notify_subscribers();
        info!(
            "[Sync] Drain finished: uploaded={} failed={} conflicts={} success={}",
            summary.uploaded, summary.failed, summary.conflicts, summary.success
        );
        summary
    }

    async fn drain_inner(&self) -> DrainSummary {
        let Some(remote) = self.remote() else {
            warn!("[Sync] Drain aborted: remote store not configured");
            return DrainSummary::aborted(self.buffer.pending());
        };

        let groups = match self.buffer.drain_all() {
            Ok(groups) => groups,
            Err(err) => {
                warn!("[Sync] Drain aborted: write buffer unreadable: {}", err);
                return DrainSummary::aborted(self.buffer.pending());
            }
        };

        let mut summary = DrainSummary {
            attempted: groups.iter().map(|(_, writes)| writes.len()).sum(),
            uploaded: 0,
            failed: 0,
            conflicts: 0,
            success: true,
        };
        let mut new_conflicts = Vec::new();

        // Upload phase: per table, in strict enqueue order. Individual
        // failures are logged and skipped; any failure marks the drain
        // failed so the buffer is retained for retry.
        for (table, writes) in &groups {
            let baseline = self.baseline_for(table);
            for write in writes {
                match self
                    .apply_write(remote.as_ref(), table, write, &baseline)
                    .await
                {
                    Ok(ApplyOutcome::Applied) => summary.uploaded += 1,
                    Ok(ApplyOutcome::Conflicted(conflict)) => {
                        info!(
                            "[Sync] Conflict on '{}' record {}: held for resolution",
                            table,
                            record_key(&conflict.record_id)
                        );
                        summary.conflicts += 1;
                        new_conflicts.push(conflict);
                    }
                    Err(err) => {
                        warn!(
                            "[Sync] Upload of '{}' local_id={} failed: {}",
                            table, write.local_id, err
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        // Download phase: refresh read-through snapshots for every registered
        // table plus any table that had buffered writes. A refresh failure
        // fails the drain; the next pass re-replays, which is safe under
        // last-write-wins.
        let mut tables = self.config.tables.clone();
        for (table, _) in &groups {
            if !tables.contains(table) {
                tables.push(table.clone());
            }
        }
        for table in &tables {
            match remote.select(table, &Filter::All, None).await {
                Ok(rows) => {
                    if let Err(err) = self.store_snapshot(table, &rows) {
                        warn!("[Sync] Snapshot store for '{}' failed: {}", table, err);
                        summary.success = false;
                    }
                }
                Err(err) => {
                    warn!("[Sync] Snapshot refresh for '{}' failed: {}", table, err);
                    summary.success = false;
                }
            }
        }

        if summary.failed > 0 {
            summary.success = false;
        }

        if summary.success {
            if let Err(err) = self.buffer.clear_drained(&groups) {
                warn!("[Sync] Could not clear drained entries: {}", err);
                summary.success = false;
            }
        }

        self.push_conflicts(new_conflicts);
        self.notify_subscribers();
        summary
    }

    /// Replays one buffered write, three-way checked against the snapshot
    /// baseline so a third-party remote mutation surfaces as a conflict
    /// instead of being silently overwritten.
    async fn apply_write(
        &self,
        remote: &dyn RemoteStore,
        table: &str,
        write: &BufferedWrite,
        baseline: &BaselineMap,
    ) -> Result<ApplyOutcome, RemoteStoreError> {
        match write.action {
            WriteAction::Create => {
                if let Some(id) = record_id_of(write) {
                    let existing = remote
                        .select(table, &Filter::Id(id.clone()), Some(1))
                        .await?;
                    if let Some(row) = existing.first() {
                        return Ok(ApplyOutcome::Conflicted(SyncConflict::new(
                            table,
                            id,
                            ConflictKind::Create,
                            write.payload.clone(),
                            Some(row.clone()),
                        )));
                    }
                }
                remote.insert(table, vec![write.payload.clone()]).await?;
                Ok(ApplyOutcome::Applied)
            }
            WriteAction::Update => {
                let id = record_id_of(write).ok_or_else(|| {
                    RemoteStoreError::invalid_request("buffered update is missing a record id")
                })?;
                let current = remote
                    .select(table, &Filter::Id(id.clone()), Some(1))
                    .await?
                    .into_iter()
                    .next();
                if diverged(baseline.get(&record_key(&id)), current.as_ref()) {
                    return Ok(ApplyOutcome::Conflicted(SyncConflict::new(
                        table,
                        id,
                        ConflictKind::Update,
                        write.payload.clone(),
                        current,
                    )));
                }
                remote
                    .update(table, &Filter::Id(id), write.payload.clone())
                    .await?;
                Ok(ApplyOutcome::Applied)
            }
            WriteAction::Delete => {
                let id = record_id_of(write).ok_or_else(|| {
                    RemoteStoreError::invalid_request("buffered delete is missing a record id")
                })?;
                let current = remote
                    .select(table, &Filter::Id(id.clone()), Some(1))
                    .await?
                    .into_iter()
                    .next();
                let Some(current_row) = current else {
                    // Already gone remotely; the delete intent is satisfied.
                    return Ok(ApplyOutcome::Applied);
                };
                if diverged(baseline.get(&record_key(&id)), Some(&current_row)) {
                    return Ok(ApplyOutcome::Conflicted(SyncConflict::new(
                        table,
                        id,
                        ConflictKind::Delete,
                        Value::Null,
                        Some(current_row),
                    )));
                }
                remote.delete(table, &Filter::Id(id)).await?;
                Ok(ApplyOutcome::Applied)
            }
        }
    }

    fn baseline_for(&self, table: &str) -> BaselineMap {
        let rows = match self.load_snapshot(table) {
            Ok(rows) => rows,
            Err(err) => {
                debug!(
                    "[Sync] No usable snapshot baseline for '{}': {}",
                    table, err
                );
                return BaselineMap::new();
            }
        };
        rows.into_iter()
            .filter_map(|row| {
                let id = row.get("id")?.clone();
                Some((record_key(&id), row))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn divergence_requires_a_baseline() {
        let baseline = json!({"id": 1, "name": "A"});
        let changed = json!({"id": 1, "name": "C"});
        assert!(!diverged(None, Some(&changed)));
        assert!(!diverged(Some(&baseline), Some(&baseline)));
        assert!(diverged(Some(&baseline), Some(&changed)));
        assert!(diverged(Some(&baseline), None));
    }

    #[test]
    fn record_keys_are_stable_across_types() {
        assert_eq!(record_key(&json!("abc")), "abc");
        assert_eq!(record_key(&json!(42)), "42");
    }
}
