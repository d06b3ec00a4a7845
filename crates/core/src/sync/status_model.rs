//! Sync domain models: status snapshots, buffered writes, drain results and
//! conflicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Operating mode derived from connectivity and drain state.
///
/// Never set directly by callers: `Syncing` only while a drain is in
/// progress, otherwise `Cloud` iff the last reachability probe succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    Cloud,
    Offline,
    Syncing,
}

/// Connection status snapshot, recomputed and broadcast on every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Raw network-reachability signal fed by the platform.
    pub is_online: bool,
    /// Last reachability probe against the remote store succeeded.
    pub is_cloud_connected: bool,
    /// Completion time of the most recent fully successful drain.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Count of buffered writes awaiting sync.
    pub pending_local_data: usize,
    /// Monotonic probe counter. Never reset.
    pub connection_attempts: u64,
    pub mode: ConnectionMode,
}

/// Mutation kind carried by a buffered write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAction {
    Create,
    Update,
    Delete,
}

/// One locally queued mutation awaiting remote replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferedWrite {
    /// Logical target collection name.
    pub table: String,
    /// Target row identity for updates and deletes.
    pub record_id: Option<Value>,
    /// Full record for create/update, null for delete.
    pub payload: Value,
    /// Generation-time monotonic tag. Local ordering and debugging only,
    /// not a server identity.
    pub local_id: i64,
    /// Enqueue time.
    pub timestamp: DateTime<Utc>,
    pub action: WriteAction,
}

/// Where a facade write landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteLocation {
    Cloud,
    Local,
    None,
}

/// Explicit typed result of a facade write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub success: bool,
    pub location: WriteLocation,
}

impl WriteOutcome {
    /// The remote mutation was applied synchronously.
    pub fn cloud() -> Self {
        Self {
            success: true,
            location: WriteLocation::Cloud,
        }
    }

    /// The write was buffered locally for a later drain.
    pub fn local() -> Self {
        Self {
            success: true,
            location: WriteLocation::Local,
        }
    }

    /// Neither the remote attempt nor local buffering succeeded.
    pub fn failed() -> Self {
        Self {
            success: false,
            location: WriteLocation::None,
        }
    }
}

/// Explicit typed outcome of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainSummary {
    /// Buffered writes considered by this pass.
    pub attempted: usize,
    /// Writes applied to the remote store.
    pub uploaded: usize,
    /// Writes that failed to upload. Any failure keeps the buffer intact.
    pub failed: usize,
    /// Conflicts surfaced instead of being applied.
    pub conflicts: usize,
    pub success: bool,
}

impl DrainSummary {
    /// A pass that could not run at all.
    pub fn aborted(pending: usize) -> Self {
        Self {
            attempted: pending,
            uploaded: 0,
            failed: pending,
            conflicts: 0,
            success: false,
        }
    }
}

/// Conflict kind, mirroring the buffered write's action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Create,
    Update,
    Delete,
}

impl From<WriteAction> for ConflictKind {
    fn from(action: WriteAction) -> Self {
        match action {
            WriteAction::Create => Self::Create,
            WriteAction::Update => Self::Update,
            WriteAction::Delete => Self::Delete,
        }
    }
}

/// A buffered write and the remote current state disagree at drain time.
///
/// Surfaced, never auto-resolved: held until an operator decision removes it
/// and applies the winning value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub id: Uuid,
    pub table: String,
    pub record_id: Value,
    pub conflict_kind: ConflictKind,
    /// The buffered local value (null for delete conflicts).
    pub local_data: Value,
    /// The remote current row, if it still exists.
    pub server_data: Option<Value>,
    pub detected_at: DateTime<Utc>,
}

impl SyncConflict {
    pub fn new(
        table: impl Into<String>,
        record_id: Value,
        conflict_kind: ConflictKind,
        local_data: Value,
        server_data: Option<Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            table: table.into(),
            record_id,
            conflict_kind,
            local_data,
            server_data,
            detected_at: Utc::now(),
        }
    }
}

/// Operator decision applied to a surfaced conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Push the buffered local value to the remote store.
    KeepLocal,
    /// Accept the remote row; only the local snapshot is touched.
    KeepServer,
    /// Push a manually merged value.
    Merge(Value),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_camel_case() {
        let status = ConnectionStatus {
            is_online: true,
            is_cloud_connected: false,
            last_sync_time: None,
            pending_local_data: 3,
            connection_attempts: 7,
            mode: ConnectionMode::Offline,
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["isCloudConnected"], json!(false));
        assert_eq!(value["pendingLocalData"], json!(3));
        assert_eq!(value["mode"], json!("offline"));
    }

    #[test]
    fn buffered_write_roundtrips() {
        let write = BufferedWrite {
            table: "products".to_string(),
            record_id: Some(json!(42)),
            payload: json!({"id": 42, "name": "Widget"}),
            local_id: 1,
            timestamp: Utc::now(),
            action: WriteAction::Update,
        };
        let raw = serde_json::to_string(&write).unwrap();
        let back: BufferedWrite = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, write);
    }

    #[test]
    fn outcome_constructors() {
        assert_eq!(WriteOutcome::cloud().location, WriteLocation::Cloud);
        assert!(WriteOutcome::local().success);
        assert!(!WriteOutcome::failed().success);
    }
}
