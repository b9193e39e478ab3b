//! Shake Gesture Classification Module.
//!
//! Detects a deliberate shake from raw accelerometer samples using a
//! windowed threshold-crossing counter:
//! - Each sample is reduced to its gravity-normalized magnitude
//! - Samples strictly above the threshold count as a "hit"
//! - Hits older than the window restart the count
//! - Enough hits in one window fire an activation, subject to a cooldown
//!
//! The threshold and required count are deployment constants, not derived
//! from the signal. See `MonitorConfig::strict` and `MonitorConfig::sensitive`
//! for the two calibrated variants.

use serde::Deserialize;
use tracing::{debug, info};

use crate::signal::SignalWindow;
use crate::types::{ActivationDecision, ActivationSource, SensorSample};

/// Configuration for shake classification.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShakeConfig {
    /// Minimum g-force for a sample to count (strict `>`).
    pub threshold_g: f32,
    /// Hits further apart than this restart the count (ms).
    pub window_ms: u64,
    /// Hits needed within one window to activate.
    pub required_count: u32,
    /// Minimum time between two activations (ms).
    pub cooldown_ms: u64,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            threshold_g: 10.0,  // Hard shake only
            window_ms: 2000,    // Hits must chain within 2s
            required_count: 4,  // Four hits per gesture
            cooldown_ms: 3000,  // No re-trigger for 3s
        }
    }
}

/// Windowed shake classifier.
///
/// Owned by a single sensor delivery stream. Create a fresh classifier (or
/// call [`ShakeClassifier::reset`]) whenever the sensor listener is
/// registered.
#[derive(Debug, Clone)]
pub struct ShakeClassifier {
    config: ShakeConfig,
    signal: SignalWindow,

    shake_count: u32,
    last_shake_time_ms: Option<u64>,
    last_activation_time_ms: Option<u64>,

    // Statistics
    total_hits: u64,
    total_activations: u64,
}

impl ShakeClassifier {
    /// Create a new classifier with the given configuration.
    pub fn new(config: ShakeConfig) -> Self {
        Self {
            config,
            signal: SignalWindow::new(),
            shake_count: 0,
            last_shake_time_ms: None,
            last_activation_time_ms: None,
            total_hits: 0,
            total_activations: 0,
        }
    }

    /// Classify one sample observed at `now_ms`.
    ///
    /// Returns a decision only on the sample that completes a gesture.
    pub fn classify(&mut self, sample: &SensorSample, now_ms: u64) -> Option<ActivationDecision> {
        let processed = self.signal.process(sample);
        let g_force = processed.g_force;
        if g_force.is_nan() || g_force <= self.config.threshold_g {
            return None;
        }

        // A rewound clock yields a zero gap, which stays inside the window.
        if let Some(last) = self.last_shake_time_ms {
            let gap = now_ms.saturating_sub(last);
            if gap > self.config.window_ms {
                debug!(gap_ms = gap, "shake window expired, resetting count");
                self.shake_count = 0;
            }
        }

        self.shake_count += 1;
        self.last_shake_time_ms = Some(now_ms);
        self.total_hits += 1;
        debug!(
            count = self.shake_count,
            required = self.config.required_count,
            g_force,
            sample_ms = processed.timestamp_ms,
            "shake hit"
        );

        if self.shake_count < self.config.required_count {
            return None;
        }

        if !self.cooldown_elapsed(now_ms) {
            debug!(
                remaining_ms = self.cooldown_remaining(now_ms),
                "shake cooldown active"
            );
            return None;
        }

        self.shake_count = 0;
        self.last_activation_time_ms = Some(now_ms);
        self.total_activations += 1;
        info!(g_force, "shake gesture detected");

        Some(ActivationDecision::new(ActivationSource::Shake, now_ms))
    }

    /// Forget all gesture state (listener re-registration).
    pub fn reset(&mut self) {
        self.shake_count = 0;
        self.last_shake_time_ms = None;
        self.last_activation_time_ms = None;
    }

    /// Hits counted in the current window.
    pub fn shake_count(&self) -> u32 {
        self.shake_count
    }

    /// Timestamp of the last hit, if any.
    pub fn last_shake_time(&self) -> Option<u64> {
        self.last_shake_time_ms
    }

    /// Timestamp of the last activation, if any.
    pub fn last_activation_time(&self) -> Option<u64> {
        self.last_activation_time_ms
    }

    /// Total qualifying samples seen since creation.
    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    /// Total activations emitted since creation.
    pub fn total_activations(&self) -> u64 {
        self.total_activations
    }

    /// Active configuration.
    pub fn config(&self) -> &ShakeConfig {
        &self.config
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn cooldown_elapsed(&self, now_ms: u64) -> bool {
        match self.last_activation_time_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) > self.config.cooldown_ms,
        }
    }

    fn cooldown_remaining(&self, now_ms: u64) -> u64 {
        match self.last_activation_time_ms {
            None => 0,
            Some(last) => self
                .config
                .cooldown_ms
                .saturating_sub(now_ms.saturating_sub(last)),
        }
    }
}

impl Default for ShakeClassifier {
    fn default() -> Self {
        Self::new(ShakeConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
