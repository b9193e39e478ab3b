//! Gravity-normalized magnitude extraction.
//!
//! Converts a raw tri-axial accelerometer sample into a single g-force
//! value: each axis is divided by standard gravity and the Euclidean norm
//! of the result is taken. A phone at rest reads ~1.0 regardless of
//! orientation; a hard shake reads well above 10.
//!
//! Every call is independent (O(1), no history). Gravity is not removed,
//! so the reading includes the static 1 g component.

use crate::types::SensorSample;

/// Standard gravity in m/s².
pub const STANDARD_GRAVITY: f32 = 9.80665;

/// Stateless converter from raw samples to g-force magnitude.
#[derive(Debug, Clone, Copy)]
pub struct SignalWindow {
    /// Gravity constant used for normalization (m/s²).
    gravity: f32,
}

impl SignalWindow {
    /// Create a window normalizing by standard gravity.
    pub fn new() -> Self {
        Self {
            gravity: STANDARD_GRAVITY,
        }
    }

    /// Create a window normalizing by a custom gravity constant.
    ///
    /// Only useful for calibration rigs and tests.
    pub fn with_gravity(gravity: f32) -> Self {
        Self { gravity }
    }

    /// The gravity constant in use.
    pub fn gravity(&self) -> f32 {
        self.gravity
    }

    /// Per-axis acceleration expressed in g.
    pub fn normalize(&self, accel: [f32; 3]) -> [f32; 3] {
        [
            accel[0] / self.gravity,
            accel[1] / self.gravity,
            accel[2] / self.gravity,
        ]
    }

    /// Gravity-normalized magnitude: `sqrt((x/G)^2 + (y/G)^2 + (z/G)^2)`.
    pub fn g_force(&self, accel: [f32; 3]) -> f32 {
        let g = self.normalize(accel);
        (g[0] * g[0] + g[1] * g[1] + g[2] * g[2]).sqrt()
    }

    /// Process one sample.
    pub fn process(&self, sample: &SensorSample) -> ProcessedSample {
        ProcessedSample {
            timestamp_ms: sample.timestamp_ms,
            g_force: self.g_force(sample.accel),
        }
    }
}

impl Default for SignalWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// A sample reduced to its g-force magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessedSample {
    /// Original timestamp.
    pub timestamp_ms: u64,
    /// Gravity-normalized magnitude.
    pub g_force: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_rest_reads_one_g() {
        let window = SignalWindow::new();
        let g = window.g_force([0.0, 0.0, STANDARD_GRAVITY]);
        assert!((g - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_orientation_invariance() {
        let window = SignalWindow::new();
        let flat = window.g_force([0.0, 0.0, -STANDARD_GRAVITY]);
        let upright = window.g_force([0.0, STANDARD_GRAVITY, 0.0]);
        let side = window.g_force([STANDARD_GRAVITY, 0.0, 0.0]);

        assert!((flat - upright).abs() < 1e-5);
        assert!((flat - side).abs() < 1e-5);
    }

    #[test]
    fn test_magnitude_scales_linearly() {
        let window = SignalWindow::new();
        let g = window.g_force([0.0, 0.0, STANDARD_GRAVITY * 11.0]);
        assert!((g - 11.0).abs() < 1e-4);
    }

    #[test]
    fn test_normalize_per_axis() {
        let window = SignalWindow::with_gravity(10.0);
        let g = window.normalize([10.0, -20.0, 5.0]);
        assert_eq!(g, [1.0, -2.0, 0.5]);
    }

    #[test]
    fn test_process_keeps_timestamp() {
        let window = SignalWindow::default();
        let processed = window.process(&SensorSample::new(1234, [3.0, 4.0, 0.0]));

        assert_eq!(processed.timestamp_ms, 1234);
        assert!((processed.g_force - 5.0 / STANDARD_GRAVITY).abs() < 1e-5);
    }
}
