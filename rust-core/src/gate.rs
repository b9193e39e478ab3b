//! Cooldown gate for activation decisions.
//!
//! Stateless detectors (hotword) and detectors without their own cooldown
//! (key sequence) would otherwise fire on every partial transcript or
//! every repeated sequence. The gate drops any decision that arrives
//! within the cooldown of the previous accepted one, either across all
//! sources or per source.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::types::{ActivationDecision, ActivationSource};

/// Which activations share a cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    /// One cooldown for every source.
    Shared,
    /// Each source cools down independently.
    PerSource,
}

/// Configuration for the activation gate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub scope: CooldownScope,
    /// Minimum time between two accepted activations (ms).
    pub cooldown_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            scope: CooldownScope::PerSource,
            cooldown_ms: 3000,
        }
    }
}

/// Debounces decisions by their timestamps.
#[derive(Debug, Clone)]
pub struct ActivationGate {
    config: GateConfig,
    last_accepted: HashMap<Option<ActivationSource>, u64>,
}

impl ActivationGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            last_accepted: HashMap::new(),
        }
    }

    /// Accept `decision` unless its key is still cooling down.
    pub fn admit(&mut self, decision: ActivationDecision) -> Option<ActivationDecision> {
        let key = self.key(decision.source);
        let now = decision.timestamp_ms;

        if let Some(&last) = self.last_accepted.get(&key) {
            let elapsed = now.saturating_sub(last);
            if elapsed <= self.config.cooldown_ms {
                debug!(
                    source = decision.source.as_str(),
                    elapsed_ms = elapsed,
                    "activation suppressed by cooldown"
                );
                return None;
            }
        }

        self.last_accepted.insert(key, now);
        Some(decision)
    }

    /// Timestamp of the last accepted decision for `source`.
    pub fn last_accepted(&self, source: ActivationSource) -> Option<u64> {
        self.last_accepted.get(&self.key(source)).copied()
    }

    /// Forget every cooldown.
    pub fn reset(&mut self) {
        self.last_accepted.clear();
    }

    fn key(&self, source: ActivationSource) -> Option<ActivationSource> {
        match self.config.scope {
            CooldownScope::Shared => None,
            CooldownScope::PerSource => Some(source),
        }
    }
}

impl Default for ActivationGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}
