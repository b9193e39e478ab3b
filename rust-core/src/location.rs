//! Location Capture Module.
//!
//! Raw fix acquisition belongs to the host. This module wraps whatever the
//! host provides with the monitor's policy:
//! - Ask for a current fix, bounded by a timeout
//! - Fall back to the provider's last-known fix when that fails or is empty
//! - Overwrite the durable location cache on success
//! - Push a UI message only for activation-tied captures
//!
//! Every failure is logged and reported as `None`. The next natural cycle
//! (heartbeat tick or activation) is the retry.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use smol::Timer;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::LocationError;
use crate::notify::EventSink;
use crate::store::{Edit, KeyValueStore};
use crate::types::{Location, SinkMessage};

/// Host-side source of location fixes.
///
/// Both calls may block; they are always run on the blocking pool.
pub trait LocationProvider: Send + Sync {
    /// A fresh fix. `Ok(None)` means the provider had nothing to report.
    fn current_fix(&self, timeout: Duration) -> Result<Option<Location>, LocationError>;

    /// Whatever fix the provider last saw, possibly stale.
    fn last_known_fix(&self) -> Result<Option<Location>, LocationError>;
}

/// Provider for hosts without positioning.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocationProvider;

impl LocationProvider for NoLocationProvider {
    fn current_fix(&self, _timeout: Duration) -> Result<Option<Location>, LocationError> {
        Ok(None)
    }

    fn last_known_fix(&self) -> Result<Option<Location>, LocationError> {
        Ok(None)
    }
}

/// Provider that always reports the same coordinates, stamped with the
/// current time.
pub struct FixedLocationProvider {
    lat: f64,
    lon: f64,
    clock: Arc<dyn Clock>,
}

impl FixedLocationProvider {
    pub fn new(lat: f64, lon: f64, clock: Arc<dyn Clock>) -> Self {
        Self { lat, lon, clock }
    }
}

impl LocationProvider for FixedLocationProvider {
    fn current_fix(&self, _timeout: Duration) -> Result<Option<Location>, LocationError> {
        Ok(Some(Location::new(self.lat, self.lon, self.clock.now_ms())))
    }

    fn last_known_fix(&self) -> Result<Option<Location>, LocationError> {
        self.current_fix(Duration::ZERO)
    }
}

/// Configuration for location capture.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Upper bound on one current-fix request (ms).
    pub fix_timeout_ms: u64,
    /// Upper bound on the provider lookup during boot reconciliation (ms).
    pub boot_lookup_timeout_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            fix_timeout_ms: 10_000,        // High-accuracy fix budget
            boot_lookup_timeout_ms: 5_000, // Boot must not hang on the provider
        }
    }
}

/// Why a capture was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePurpose {
    /// Tied to an activation; the UI is told about the fix.
    Activation,
    /// Periodic refresh of the cache; silent.
    Heartbeat,
}

/// Capture policy around a [`LocationProvider`].
#[derive(Clone)]
pub struct LocationCapture {
    config: LocationConfig,
    provider: Arc<dyn LocationProvider>,
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn EventSink>,
}

impl LocationCapture {
    pub fn new(
        config: LocationConfig,
        provider: Arc<dyn LocationProvider>,
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            provider,
            store,
            sink,
        }
    }

    /// Acquire a fix and update the location cache.
    pub async fn capture(&self, purpose: CapturePurpose) -> Option<Location> {
        let location = match self.acquire().await {
            Some(location) => location,
            None => {
                warn!(?purpose, "no location fix available");
                return None;
            }
        };

        if let Err(e) = self.store.commit(&Edit::new().put_location(&location)) {
            warn!(error = %e, "failed to cache location");
        }
        debug!(?purpose, lat = location.lat, lon = location.lon, "location captured");

        if purpose == CapturePurpose::Activation {
            self.sink.publish(SinkMessage::for_location(&location));
        }
        Some(location)
    }

    /// Last-known fix only, bounded by the boot lookup timeout.
    pub async fn last_known(&self) -> Option<Location> {
        let timeout = Duration::from_millis(self.config.boot_lookup_timeout_ms);
        let provider = Arc::clone(&self.provider);
        match with_timeout(timeout, smol::unblock(move || provider.last_known_fix())).await {
            Ok(location) => location,
            Err(e) => {
                warn!(error = %e, "last-known location lookup failed");
                None
            }
        }
    }

    async fn acquire(&self) -> Option<Location> {
        let timeout = Duration::from_millis(self.config.fix_timeout_ms);
        let provider = Arc::clone(&self.provider);
        let current =
            with_timeout(timeout, smol::unblock(move || provider.current_fix(timeout))).await;

        match current {
            Ok(Some(location)) => return Some(location),
            Ok(None) => debug!("current fix empty, trying last known"),
            Err(e) => debug!(error = %e, "current fix failed, trying last known"),
        }

        let provider = Arc::clone(&self.provider);
        match smol::unblock(move || provider.last_known_fix()).await {
            Ok(location) => location,
            Err(e) => {
                warn!(error = %e, "last-known location lookup failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for LocationCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationCapture")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Race `fut` against a timer.
async fn with_timeout<F>(timeout: Duration, fut: F) -> Result<Option<Location>, LocationError>
where
    F: std::future::Future<Output = Result<Option<Location>, LocationError>>,
{
    let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    smol::future::or(fut, async move {
        Timer::after(timeout).await;
        Err(LocationError::Timeout(millis))
    })
    .await
}
