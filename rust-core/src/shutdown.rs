//! Shutdown Inference Module.
//!
//! Two halves of one protocol:
//! - [`ShutdownSignalHandler`] runs when the host announces an orderly
//!   shutdown. It flags the shutdown as orderly and sends the cached
//!   location out while it still can.
//! - [`BootReconciler`] runs once at the next start. It reads the flag and
//!   the last heartbeat stamp and classifies what happened in between.
//!
//! No signal plus a heartbeat gap larger than `gap_multiplier` cadences is
//! reported as a forced power-off. The multiplier trades false alarms
//! (device asleep past its heartbeat, low value) against missed ones
//! (short forced outage, high value).

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::clock::{format_timestamp, Clock};
use crate::location::LocationCapture;
use crate::notify::Dispatcher;
use crate::store::{keys, Edit, KeyValueStore, Snapshot};
use crate::tasks::BackgroundTasks;
use crate::types::{HeartbeatState, Location, ShutdownVerdict};

pub const FORCED_SHUTDOWN_SUBJECT: &str = "⚠ ALERT: Phone was forcefully switched off";
pub const SHUTDOWN_SUBJECT: &str = "Device shutdown location";
pub const DELAYED_SHUTDOWN_SUBJECT: &str = "Device shutdown location (delayed)";

/// Configuration for shutdown inference.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Gap, in heartbeat cadences, beyond which silence means forced.
    pub gap_multiplier: f64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            gap_multiplier: 2.0,
        }
    }
}

/// A notification to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub subject: String,
    pub body: String,
}

/// Result of classifying the previous shutdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub verdict: ShutdownVerdict,
    pub alert: Option<Alert>,
    /// Store changes implied by the verdict. Always clears `orderly_shutdown`.
    pub edit: Edit,
}

/// Classify the previous shutdown from the persisted liveness state.
pub fn reconcile(
    state: &HeartbeatState,
    now_ms: u64,
    location: Option<Location>,
    config: &ShutdownConfig,
) -> ReconcileOutcome {
    let edit = Edit::new().put_bool(keys::ORDERLY_SHUTDOWN, false);

    if state.orderly_shutdown {
        return ReconcileOutcome {
            verdict: ShutdownVerdict::Orderly,
            alert: None,
            edit,
        };
    }

    if state.last_heartbeat_time_ms == 0 {
        return ReconcileOutcome {
            verdict: ShutdownVerdict::Unknown,
            alert: None,
            edit,
        };
    }

    let gap_ms = now_ms.saturating_sub(state.last_heartbeat_time_ms);
    let limit = config.gap_multiplier * state.heartbeat_interval_ms as f64;
    if (gap_ms as f64) <= limit {
        debug!(gap_ms, limit, "heartbeat gap within tolerance");
        return ReconcileOutcome {
            verdict: ShutdownVerdict::Unknown,
            alert: None,
            edit,
        };
    }

    let body = forced_shutdown_body(state.last_heartbeat_time_ms, gap_ms, location);
    let edit = edit
        .put_bool(keys::FORCED_SHUTDOWN_DETECTED, true)
        .put_string(keys::FORCED_SHUTDOWN_MESSAGE, body.clone());
    ReconcileOutcome {
        verdict: ShutdownVerdict::Forced,
        alert: Some(Alert {
            subject: FORCED_SHUTDOWN_SUBJECT.to_string(),
            body,
        }),
        edit,
    }
}

/// The delayed orderly-shutdown notification, if one is still owed.
pub fn pending_notification(snapshot: &Snapshot) -> Option<Alert> {
    if snapshot.shutdown_notification_sent() {
        return None;
    }
    let location = snapshot.location()?;
    Some(Alert {
        subject: DELAYED_SHUTDOWN_SUBJECT.to_string(),
        body: format!(
            "Device was previously shut down orderly.\nLast cached location:\n\
             Lat: {}\nLon: {}\nTime: {}",
            location.lat,
            location.lon,
            format_timestamp(location.captured_at_ms)
        ),
    })
}

fn forced_shutdown_body(last_seen_ms: u64, gap_ms: u64, location: Option<Location>) -> String {
    let location = match location {
        Some(loc) => format!(
            "Lat: {}\nLon: {}\nCaptured: {}",
            loc.lat,
            loc.lon,
            format_timestamp(loc.captured_at_ms)
        ),
        None => "Location not available.".to_string(),
    };
    format!(
        "The phone appears to have been FORCEFULLY switched off (not an orderly shutdown).\n\n\
         Last seen alive: {}\nTime since last ping: {} minutes\n\nLast known location:\n{}",
        format_timestamp(last_seen_ms),
        gap_ms / 60_000,
        location
    )
}

// ============================================================================
// BOOT RECONCILIATION
// ============================================================================

/// What boot processing did.
#[derive(Debug, Clone, PartialEq)]
pub struct BootReport {
    pub verdict: ShutdownVerdict,
    /// A forced-shutdown alert was queued.
    pub alert_queued: bool,
    /// The owed orderly-shutdown notification was queued again.
    pub pending_resent: bool,
}

/// Runs once per process start.
pub struct BootReconciler {
    config: ShutdownConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    capture: LocationCapture,
    dispatcher: Dispatcher,
    tasks: Arc<BackgroundTasks>,
}

impl BootReconciler {
    pub fn new(
        config: ShutdownConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        capture: LocationCapture,
        dispatcher: Dispatcher,
        tasks: Arc<BackgroundTasks>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            capture,
            dispatcher,
            tasks,
        }
    }

    /// Read the store once, decide, commit once, then queue notifications.
    pub async fn run(&self) -> BootReport {
        let snapshot = self.store.snapshot().unwrap_or_else(|e| {
            warn!(error = %e, "failed to read state at boot, assuming first run");
            Snapshot::default()
        });
        let state = snapshot.heartbeat_state();
        let now = self.clock.now_ms();

        let location = match snapshot.location() {
            Some(location) => Some(location),
            None => self.capture.last_known().await,
        };

        let outcome = reconcile(&state, now, location, &self.config);
        let pending = pending_notification(&snapshot);

        let mut edit = outcome.edit;
        if pending.is_some() {
            edit = edit.put_bool(keys::SHUTDOWN_NOTIFICATION_SENT, true);
        }
        if let Err(e) = self.store.commit(&edit) {
            warn!(error = %e, "failed to persist boot verdict");
        }

        match outcome.verdict {
            ShutdownVerdict::Forced => warn!(
                last_heartbeat = state.last_heartbeat_time_ms,
                now, "forced shutdown detected"
            ),
            verdict => info!(?verdict, "previous shutdown classified"),
        }

        let alert_queued = outcome.alert.is_some();
        if let Some(alert) = outcome.alert {
            self.send(alert);
        }
        let pending_resent = pending.is_some();
        if let Some(alert) = pending {
            info!("resending owed shutdown notification");
            self.send(alert);
        }

        BootReport {
            verdict: outcome.verdict,
            alert_queued,
            pending_resent,
        }
    }

    fn send(&self, alert: Alert) {
        let task = self.dispatcher.dispatch(alert.subject, alert.body);
        self.tasks.spawn(async move {
            task.await;
        });
    }
}

impl std::fmt::Debug for BootReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootReconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SHUTDOWN SIGNAL
// ============================================================================

/// Handles the host's orderly-shutdown broadcast.
pub struct ShutdownSignalHandler {
    store: Arc<dyn KeyValueStore>,
    dispatcher: Dispatcher,
    tasks: Arc<BackgroundTasks>,
}

impl ShutdownSignalHandler {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        dispatcher: Dispatcher,
        tasks: Arc<BackgroundTasks>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            tasks,
        }
    }

    /// Mark the shutdown orderly and send the cached location.
    ///
    /// The orderly flag is always written. The notification is only queued
    /// when a location is cached; returns whether it was.
    pub fn on_shutdown_signal(&self, now_ms: u64) -> bool {
        let location = match self.store.snapshot().map(|s| s.location()) {
            Ok(location) => location,
            Err(e) => {
                warn!(error = %e, "failed to read cached location at shutdown");
                None
            }
        };

        let mut edit = Edit::new().put_bool(keys::ORDERLY_SHUTDOWN, true);
        if location.is_some() {
            edit = edit.put_bool(keys::SHUTDOWN_NOTIFICATION_SENT, false);
        }
        if let Err(e) = self.store.commit(&edit) {
            warn!(error = %e, "failed to flag orderly shutdown");
        }
        info!(now_ms, "orderly shutdown flagged");

        let Some(location) = location else {
            warn!(now_ms, "shutdown signal with no cached location");
            return false;
        };

        let body = format!(
            "Device is shutting down. Last cached location:\n\
             Lat: {}\nLon: {}\nTime(ms since epoch): {}",
            location.lat, location.lon, location.captured_at_ms
        );
        let task = self.dispatcher.dispatch(SHUTDOWN_SUBJECT, body);
        let store = Arc::clone(&self.store);
        self.tasks.spawn(async move {
            if task.await {
                let edit = Edit::new().put_bool(keys::SHUTDOWN_NOTIFICATION_SENT, true);
                if let Err(e) = store.commit(&edit) {
                    warn!(error = %e, "failed to mark shutdown notification sent");
                }
            }
        });
        true
    }
}

impl std::fmt::Debug for ShutdownSignalHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignalHandler").finish_non_exhaustive()
    }
}
