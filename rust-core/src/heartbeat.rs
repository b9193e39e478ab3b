//! Liveness Heartbeat Module.
//!
//! While the monitor runs it periodically stamps the store with the
//! current time. The next boot compares that stamp against its own clock
//! to tell a forced power-off from an orderly one (see `shutdown.rs`).
//!
//! Each tick:
//! 1. Writes `last_heartbeat_time`, `heartbeat_interval_ms` and clears
//!    `forced_shutdown_detected`, all in one edit
//! 2. Refreshes the location cache, best effort and silently
//!
//! The stamp never moves backwards within one process lifetime, even if
//! the wall clock does.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use smol::{Task, Timer};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::location::{CapturePurpose, LocationCapture};
use crate::store::{keys, Edit, KeyValueStore};
use crate::types::DEFAULT_HEARTBEAT_INTERVAL_MS;

/// Configuration for the heartbeat.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Time between two stamps (ms).
    pub interval_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

/// Periodic liveness stamper.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    capture: LocationCapture,
    last_stamp_ms: AtomicU64,
}

impl HeartbeatMonitor {
    pub fn new(
        config: HeartbeatConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        capture: LocationCapture,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            capture,
            last_stamp_ms: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.config.interval_ms)
    }

    /// Write one liveness stamp for `now_ms`.
    ///
    /// Returns the stamp actually written: `now_ms`, or this monitor's
    /// previous stamp if the clock went backwards. Stamps left by earlier
    /// processes are overwritten.
    pub fn stamp(&self, now_ms: u64) -> Result<u64, StoreError> {
        let previous = self.last_stamp_ms.load(Ordering::SeqCst);
        let stamp = now_ms.max(previous);
        if stamp != now_ms {
            debug!(now_ms, previous, "clock behind last heartbeat, keeping previous stamp");
        }

        let edit = Edit::new()
            .put_time(keys::LAST_HEARTBEAT_TIME, stamp)
            .put_time(keys::HEARTBEAT_INTERVAL_MS, self.config.interval_ms)
            .put_bool(keys::FORCED_SHUTDOWN_DETECTED, false);
        self.store.commit(&edit)?;

        self.last_stamp_ms.fetch_max(stamp, Ordering::SeqCst);
        Ok(stamp)
    }

    /// One full heartbeat: stamp, then refresh the location cache.
    pub async fn tick(&self) {
        let now = self.clock.now_ms();
        match self.stamp(now) {
            Ok(stamp) => info!(stamp, "heartbeat written"),
            Err(e) => warn!(error = %e, "failed to write heartbeat"),
        }
        // Failure already logged by the capture; next tick retries.
        let _ = self.capture.capture(CapturePurpose::Heartbeat).await;
    }

    /// Run ticks forever, the first one immediately.
    ///
    /// The loop lives as long as the returned handle.
    pub fn start(self: &Arc<Self>) -> HeartbeatHandle {
        let monitor = Arc::clone(self);
        let interval = self.interval();
        info!(interval_ms = self.config.interval_ms, "heartbeat started");
        let task = smol::spawn(async move {
            loop {
                monitor.tick().await;
                Timer::after(interval).await;
            }
        });
        HeartbeatHandle { task: Some(task) }
    }
}

impl std::fmt::Debug for HeartbeatMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatMonitor")
            .field("config", &self.config)
            .field("last_stamp_ms", &self.last_stamp_ms)
            .finish_non_exhaustive()
    }
}

/// Owner of a running heartbeat loop. Dropping it cancels the loop.
#[derive(Debug)]
pub struct HeartbeatHandle {
    task: Option<Task<()>>,
}

impl HeartbeatHandle {
    /// Cancel the loop and wait until it has stopped.
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.cancel().await;
            info!("heartbeat stopped");
        }
    }
}
