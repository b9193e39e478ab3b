//! Monitor configuration.
//!
//! Every deployment variant is the same code with different numbers. The
//! two calibrated presets are [`MonitorConfig::strict`] and
//! [`MonitorConfig::sensitive`]; anything else can be loaded from TOML,
//! where every field is optional and falls back to the reference default.
//!
//! ```toml
//! [shake]
//! threshold_g = 12.0
//! required_count = 2
//!
//! [gate]
//! scope = "shared"
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::activation_log::LogConfig;
use crate::error::ConfigError;
use crate::gate::GateConfig;
use crate::heartbeat::HeartbeatConfig;
use crate::hotword::HotwordConfig;
use crate::key_sequence::KeySequenceConfig;
use crate::location::LocationConfig;
use crate::shake_detection::ShakeConfig;
use crate::shutdown::ShutdownConfig;
use crate::voice::VoiceConfig;

/// Complete configuration of a [`crate::SafetyMonitor`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub shake: ShakeConfig,
    pub hotword: HotwordConfig,
    pub key_sequence: KeySequenceConfig,
    pub gate: GateConfig,
    pub heartbeat: HeartbeatConfig,
    pub shutdown: ShutdownConfig,
    pub location: LocationConfig,
    pub voice: VoiceConfig,
    pub log: LogConfig,
}

impl MonitorConfig {
    /// Hard shake, four hits. The reference deployment.
    pub fn strict() -> Self {
        Self::default()
    }

    /// Lighter shake, two hits.
    pub fn sensitive() -> Self {
        Self {
            shake: ShakeConfig {
                threshold_g: 12.0,
                required_count: 2,
                ..ShakeConfig::default()
            },
            ..Self::default()
        }
    }

    /// Look a preset up by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "strict" => Some(Self::strict()),
            "sensitive" => Some(Self::sensitive()),
            _ => None,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}
