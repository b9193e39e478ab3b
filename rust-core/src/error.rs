//! Error types for the monitor's fallible collaborators.
//!
//! None of these ever reach the host as a hard failure: the monitor logs
//! them and degrades to a default (see `monitor.rs`). They exist so the
//! internals can use `?` and so fakes in tests can inject failures.

use std::io;

/// Durable key-value store failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode store contents: {0}")]
    Encode(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Notification dispatch failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Unavailable(String),
}

/// Location fix failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LocationError {
    #[error("location provider error: {0}")]
    Provider(String),

    #[error("no fix within {0} ms")]
    Timeout(u64),
}

/// Speech source failure. Always transient from the monitor's point of view.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SpeechError {
    #[error("speech recognition not available")]
    Unavailable,

    #[error("speech recognizer error code {0}")]
    Recognizer(i32),
}

/// Configuration load failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
