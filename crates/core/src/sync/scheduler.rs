//! Probe cadence constants and coordinator configuration.

/// Reachability probe cadence while disconnected, in seconds.
pub const PROBE_INTERVAL_SECS: u64 = 30;

/// Maximum jitter (seconds) added to the probe interval.
pub const PROBE_INTERVAL_JITTER_SECS: u64 = 5;

/// Upper bound on a single reachability probe.
pub const PROBE_TIMEOUT_SECS: u64 = 5;

/// Canonical list of logical tables snapshotted for offline reads.
pub const DEFAULT_SYNC_TABLES: [&str; 6] = [
    "products",
    "suppliers",
    "inventory",
    "price_agreements",
    "price_history",
    "settings",
];

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Table used for the lightweight reachability probe (fetch 1 row).
    pub probe_table: String,
    /// Logical tables refreshed into read-through snapshots after a drain.
    pub tables: Vec<String>,
}

impl CoordinatorConfig {
    pub fn new(tables: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let tables: Vec<String> = tables.into_iter().map(Into::into).collect();
        let probe_table = tables
            .first()
            .cloned()
            .unwrap_or_else(|| "products".to_string());
        Self {
            probe_table,
            tables,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SYNC_TABLES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_probes_first_table() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.probe_table, "products");
        assert_eq!(config.tables.len(), DEFAULT_SYNC_TABLES.len());
    }
}
