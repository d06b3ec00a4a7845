//! Connectivity monitor: platform network signal intake, reachability probes
//! and the background probe loop.

use std::sync::PoisonError;
use std::time::Duration;

use log::{debug, info};
use rand::Rng;

use crate::store::Filter;

use super::coordinator::SyncCoordinator;
use super::scheduler::{PROBE_INTERVAL_JITTER_SECS, PROBE_INTERVAL_SECS, PROBE_TIMEOUT_SECS};

impl SyncCoordinator {
    /// Feeds the platform online/offline signal.
    ///
    /// An offline transition immediately drops the cloud connection belief;
    /// an online transition triggers an immediate probe in the background.
    pub fn handle_network_event(&self, online: bool) {
        {
            let mut state = self.state();
            state.is_online = online;
            if !online {
                state.is_cloud_connected = false;
            }
        }
        info!(
            "[Connectivity] Network signal: {}",
            if online { "online" } else { "offline" }
        );
        self.notify_subscribers();

        if online {
            if let Some(coordinator) = self.self_ref.upgrade() {
                tokio::spawn(async move {
                    coordinator.probe_now().await;
                });
            }
        }
    }

    /// One monitor pass: probe, then kick a drain when the probe succeeded
    /// and writes are pending. Returns the probe result.
    pub async fn probe_now(&self) -> bool {
        let reachable = self.probe_remote().await;
        if reachable && self.buffer.pending() > 0 {
            self.sync_now().await;
        }
        reachable
    }

    /// One reachability probe against the remote store.
    ///
    /// Increments the attempt counter unconditionally and updates the cloud
    /// connection belief. Failures are expected and logged, never surfaced.
    pub async fn probe_remote(&self) -> bool {
        {
            let mut state = self.state();
            state.connection_attempts += 1;
        }
        let reachable = self.run_probe().await;
        {
            let mut state = self.state();
            state.is_cloud_connected = reachable;
        }
        self.notify_subscribers();
        reachable
    }

    async fn run_probe(&self) -> bool {
        let Some(remote) = self.remote() else {
            debug!("[Connectivity] Probe skipped: remote store not configured");
            return false;
        };
        let probe = remote.select(&self.config.probe_table, &Filter::All, Some(1));
        match tokio::time::timeout(Duration::from_secs(PROBE_TIMEOUT_SECS), probe).await {
            Ok(Ok(_)) => {
                debug!("[Connectivity] Probe succeeded");
                true
            }
            Ok(Err(err)) => {
                debug!("[Connectivity] Probe failed: {}", err);
                false
            }
            Err(_) => {
                debug!(
                    "[Connectivity] Probe timed out after {}s",
                    PROBE_TIMEOUT_SECS
                );
                false
            }
        }
    }

    /// Starts the background probe loop (idempotent; respawns if the previous
    /// task finished).
    ///
    /// The loop probes on a fixed cadence plus jitter whenever the network
    /// signal is online but the cloud connection belief is down. This is the
    /// retry path that recovers from remote-side outages without a
    /// network-level online event.
    pub fn ensure_probe_loop_started(&self) {
        let mut guard = self
            .probe_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
            guard.take();
        }

        let weak = self.self_ref.clone();
        *guard = Some(tokio::spawn(async move {
            loop {
                let jitter_ms = rand::thread_rng().gen_range(0..=PROBE_INTERVAL_JITTER_SECS * 1000);
                tokio::time::sleep(Duration::from_millis(
                    PROBE_INTERVAL_SECS * 1000 + jitter_ms,
                ))
                .await;

                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                let (online, connected) = {
                    let state = coordinator.state();
                    (state.is_online, state.is_cloud_connected)
                };
                if online && !connected {
                    coordinator.probe_now().await;
                }
            }
            debug!("[Connectivity] Probe loop stopped");
        }));
    }
}
