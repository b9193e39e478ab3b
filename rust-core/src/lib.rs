//! Safewatch Personal-Safety Monitor Library
//!
//! A background monitor that turns raw device signals into emergency
//! activations and keeps enough liveness state to tell, after a restart,
//! whether the device was switched off normally or forcefully.
//!
//! # Design Philosophy
//!
//! - **Detectors are pure state machines**: each classifier is a function of
//!   its own state and one inbound event. No I/O, no clock reads.
//! - **Collaborators are injected**: storage, notifications, location and
//!   the UI bridge are traits, so every behavior is testable with fakes.
//! - **Never fail the host**: collaborator errors are logged and degrade to
//!   defaults; the monitor keeps running.
//! - **Side effects are fire-and-forget**: location capture and notification
//!   run on background tasks after the event is already logged.
//!
//! # Example
//!
//! ```no_run
//! use safewatch::{Collaborators, MonitorConfig, SafetyMonitor, SensorSample};
//!
//! let monitor = SafetyMonitor::new(MonitorConfig::strict(), Collaborators::in_memory());
//! smol::block_on(monitor.on_boot());
//! let _heartbeat = monitor.start_heartbeat();
//!
//! let sample = SensorSample::new(1_700_000_000_000, [0.0, 0.0, 140.0]);
//! if let Some(event) = monitor.on_sensor_sample(&sample) {
//!     println!("activated by {}", event.activation_type);
//! }
//! smol::block_on(monitor.flush());
//! ```

pub mod activation_log;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod heartbeat;
pub mod hotword;
pub mod key_sequence;
pub mod location;
pub mod monitor;
pub mod notify;
pub mod shake_detection;
pub mod shutdown;
pub mod signal;
pub mod store;
pub mod tasks;
pub mod types;
pub mod voice;

#[cfg(test)]
mod testing;



// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MonitorConfig;
pub use error::{ConfigError, LocationError, NotifyError, SpeechError, StoreError};
pub use location::{LocationProvider, NoLocationProvider};
pub use monitor::{Collaborators, ForcedShutdownStatus, SafetyMonitor};
pub use notify::{EventSink, Notifier};
pub use shutdown::BootReport;
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use types::{
    ActivationDecision, ActivationEvent, ActivationSource, KeyCode, KeyEvent, Location,
    SensorSample, ShutdownVerdict, SinkMessage,
};
pub use voice::SpeechSource;
