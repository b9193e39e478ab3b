//! Core data types for the safety monitor.
//!
//! This module defines the values that flow between the detectors, the
//! activation log, the heartbeat and the boot-time reconciliation. Every
//! concept gets a type; raw tuples never cross module boundaries.
//!
//! Timestamps are wall-clock milliseconds since the Unix epoch. Durable
//! state must be comparable across process lifetimes, so a monotonic
//! clock is not an option here.

use serde::{Deserialize, Serialize};

// ============================================================================
// SENSOR INPUT
// ============================================================================

/// A single raw accelerometer sample.
///
/// Ephemeral: produced by the platform, consumed once by the shake path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Wall-clock timestamp in milliseconds.
    pub timestamp_ms: u64,

    /// Accelerometer reading [x, y, z] in m/s², gravity included.
    pub accel: [f32; 3],
}

impl SensorSample {
    /// Creates a new sample.
    pub fn new(timestamp_ms: u64, accel: [f32; 3]) -> Self {
        Self { timestamp_ms, accel }
    }

    /// Raw acceleration magnitude in m/s².
    pub fn accel_magnitude(&self) -> f32 {
        let x2 = self.accel[0] * self.accel[0];
        let y2 = self.accel[1] * self.accel[1];
        let z2 = self.accel[2] * self.accel[2];
        (x2 + y2 + z2).sqrt()
    }
}

/// Hardware key identifiers the key-sequence path understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCode {
    VolumeUp,
    VolumeDown,
    Power,
    /// Any other platform key code.
    Other(u32),
}

/// A discrete key-down event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub timestamp_ms: u64,
}

impl KeyEvent {
    pub fn new(code: KeyCode, timestamp_ms: u64) -> Self {
        Self { code, timestamp_ms }
    }
}

// ============================================================================
// ACTIVATION TYPES
// ============================================================================

/// Which detector produced an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivationSource {
    /// Deliberate shake gesture.
    Shake,
    /// Spoken hotword.
    Hotword,
    /// Volume-key sequence.
    KeySequence,
}

impl ActivationSource {
    /// All sources, in a stable order.
    pub const ALL: [ActivationSource; 3] = [
        ActivationSource::Shake,
        ActivationSource::Hotword,
        ActivationSource::KeySequence,
    ];

    /// The type string persisted in the activation log.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationSource::Shake => "shake",
            ActivationSource::Hotword => "hotword",
            ActivationSource::KeySequence => "key_sequence",
        }
    }

    /// Parse a persisted type string.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "shake" => Some(ActivationSource::Shake),
            "hotword" => Some(ActivationSource::Hotword),
            "key_sequence" => Some(ActivationSource::KeySequence),
            _ => None,
        }
    }
}

/// A positive decision from one of the detectors.
///
/// Emitted at most once per qualifying gesture. Immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationDecision {
    pub source: ActivationSource,
    pub timestamp_ms: u64,
}

impl ActivationDecision {
    pub fn new(source: ActivationSource, timestamp_ms: u64) -> Self {
        Self {
            source,
            timestamp_ms,
        }
    }
}

/// A location fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    /// When the fix was taken (ms since epoch).
    #[serde(rename = "captured_at")]
    pub captured_at_ms: u64,
}

impl Location {
    pub fn new(lat: f64, lon: f64, captured_at_ms: u64) -> Self {
        Self {
            lat,
            lon,
            captured_at_ms,
        }
    }
}

/// One persisted entry of the activation log.
///
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationEvent {
    #[serde(rename = "type")]
    pub activation_type: String,
    #[serde(rename = "time")]
    pub time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl ActivationEvent {
    /// Build the event for a decision, snapshotting the cached location.
    pub fn from_decision(decision: &ActivationDecision, location: Option<Location>) -> Self {
        Self {
            activation_type: decision.source.as_str().to_string(),
            time_ms: decision.timestamp_ms,
            location,
        }
    }

    /// The source this event was recorded for, if the type string is known.
    pub fn source(&self) -> Option<ActivationSource> {
        ActivationSource::from_name(&self.activation_type)
    }
}

// ============================================================================
// LIVENESS TYPES
// ============================================================================

/// Reference heartbeat cadence: 30 minutes.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30 * 60 * 1000;

/// Durable liveness state shared between one process lifetime and the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatState {
    /// Last liveness stamp (ms since epoch). 0 means never written.
    pub last_heartbeat_time_ms: u64,
    /// Cadence the stamp was written with.
    pub heartbeat_interval_ms: u64,
    /// Set by the shutdown-signal handler, cleared at boot.
    pub orderly_shutdown: bool,
    /// Set at boot when a forced shutdown is inferred, cleared by the heartbeat.
    pub forced_shutdown_detected: bool,
    /// Alert text for the last inferred forced shutdown.
    pub forced_shutdown_message: Option<String>,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self {
            last_heartbeat_time_ms: 0,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            orderly_shutdown: false,
            forced_shutdown_detected: false,
            forced_shutdown_message: None,
        }
    }
}

/// What boot-time reconciliation concluded about the previous shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownVerdict {
    /// A shutdown signal was observed before the process died.
    Orderly,
    /// No signal, and the heartbeat gap is too large to be scheduling jitter.
    Forced,
    /// First run, or a gap within tolerance.
    Unknown,
}

// ============================================================================
// OUTBOUND MESSAGES
// ============================================================================

/// Push message for the UI bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkMessage {
    /// A location captured for an activation.
    Location {
        time: u64,
        lat: f64,
        lon: f64,
    },
    /// A recorded activation event.
    Activation {
        time: u64,
        #[serde(rename = "activationType")]
        activation_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lat: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lon: Option<f64>,
    },
}

impl SinkMessage {
    pub fn for_location(location: &Location) -> Self {
        SinkMessage::Location {
            time: location.captured_at_ms,
            lat: location.lat,
            lon: location.lon,
        }
    }

    pub fn for_event(event: &ActivationEvent) -> Self {
        SinkMessage::Activation {
            time: event.time_ms,
            activation_type: event.activation_type.clone(),
            lat: event.location.map(|l| l.lat),
            lon: event.location.map(|l| l.lon),
        }
    }
}
