//! Two-stage hardware key sequence detection.
//!
//! Recognizes N presses of key A followed by N presses of key B, with a
//! bounded pause between consecutive presses. The reference sequence is
//! three volume-up presses then three volume-down presses.
//!
//! ```text
//!   Idle ──A──▶ CountingA(1) ──A──▶ ... ──A──▶ Armed
//!   Armed ──B──▶ CountingB(1) ──B──▶ ... ──B──▶ Idle + decision
//!   any ──timeout / wrong key──▶ Idle
//! ```
//!
//! A wrong key resets to Idle and is then evaluated again from Idle, so an
//! A press that breaks a sequence immediately starts a new one.

use serde::Deserialize;
use tracing::{debug, info};

use crate::types::{ActivationDecision, ActivationSource, KeyCode, KeyEvent};

/// Configuration for key sequence detection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct KeySequenceConfig {
    /// Key for the first stage.
    pub key_a: KeyCode,
    /// Key for the second stage.
    pub key_b: KeyCode,
    /// Presses required per stage.
    pub presses: u32,
    /// Maximum pause between two presses (ms).
    pub sequence_interval_ms: u64,
}

impl Default for KeySequenceConfig {
    fn default() -> Self {
        Self {
            key_a: KeyCode::VolumeUp,
            key_b: KeyCode::VolumeDown,
            presses: 3,
            sequence_interval_ms: 2000,
        }
    }
}

/// Position in the two-stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    Idle,
    /// Presses of key A seen so far (< N).
    CountingA(u32),
    /// Stage A complete, waiting for key B.
    Armed,
    /// Presses of key B seen so far (< N).
    CountingB(u32),
}

/// Result of applying one key to the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    /// Key accepted; move to the given state.
    Step(SequenceState),
    /// Final press of stage B.
    Complete,
    /// Key does not fit the current stage.
    Reject,
}

/// Stateful key sequence matcher.
#[derive(Debug, Clone)]
pub struct KeySequenceClassifier {
    config: KeySequenceConfig,
    state: SequenceState,
    last_press_ms: Option<u64>,
}

impl KeySequenceClassifier {
    pub fn new(config: KeySequenceConfig) -> Self {
        Self {
            config,
            state: SequenceState::Idle,
            last_press_ms: None,
        }
    }

    /// Feed one key-down event.
    pub fn on_key_down(&mut self, event: KeyEvent) -> Option<ActivationDecision> {
        self.expire(event.timestamp_ms);

        let mut transition = self.transition(event.code);
        if transition == Transition::Reject && self.state != SequenceState::Idle {
            debug!(key = ?event.code, state = ?self.state, "out-of-sequence key, resetting");
            self.reset();
            // The breaking key may itself open a new sequence.
            transition = self.transition(event.code);
        }

        match transition {
            Transition::Step(next) => {
                self.state = next;
                self.last_press_ms = Some(event.timestamp_ms);
                None
            }
            Transition::Complete => {
                self.reset();
                info!("key sequence completed");
                Some(ActivationDecision::new(
                    ActivationSource::KeySequence,
                    event.timestamp_ms,
                ))
            }
            Transition::Reject => None,
        }
    }

    /// Drop back to Idle if the inactivity interval has passed.
    ///
    /// Returns true if a partial sequence was discarded.
    pub fn expire(&mut self, now_ms: u64) -> bool {
        let Some(last) = self.last_press_ms else {
            return false;
        };
        // A rewound clock counts as no pause at all.
        if now_ms.saturating_sub(last) <= self.config.sequence_interval_ms {
            return false;
        }
        debug!(state = ?self.state, "key sequence timed out");
        self.reset();
        true
    }

    /// Return to Idle, forgetting all counts.
    pub fn reset(&mut self) {
        self.state = SequenceState::Idle;
        self.last_press_ms = None;
    }

    /// Current position in the sequence.
    pub fn state(&self) -> SequenceState {
        self.state
    }

    /// True once stage A has completed.
    pub fn is_armed(&self) -> bool {
        matches!(self.state, SequenceState::Armed | SequenceState::CountingB(_))
    }

    fn transition(&self, code: KeyCode) -> Transition {
        let n = self.config.presses.max(1);
        let is_a = code == self.config.key_a;
        let is_b = code == self.config.key_b;

        match self.state {
            SequenceState::Idle | SequenceState::CountingA(_) if is_a => {
                let count = match self.state {
                    SequenceState::CountingA(count) => count + 1,
                    _ => 1,
                };
                if count >= n {
                    Transition::Step(SequenceState::Armed)
                } else {
                    Transition::Step(SequenceState::CountingA(count))
                }
            }
            SequenceState::Armed | SequenceState::CountingB(_) if is_b => {
                let count = match self.state {
                    SequenceState::CountingB(count) => count + 1,
                    _ => 1,
                };
                if count >= n {
                    Transition::Complete
                } else {
                    Transition::Step(SequenceState::CountingB(count))
                }
            }
            _ => Transition::Reject,
        }
    }
}

impl Default for KeySequenceClassifier {
    fn default() -> Self {
        Self::new(KeySequenceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    /// Feed keys 300ms apart; returns the decisions produced.
    fn feed(classifier: &mut KeySequenceClassifier, keys: &[KeyCode]) -> Vec<ActivationDecision> {
        keys.iter()
            .enumerate()
            .filter_map(|(i, code)| {
                classifier.on_key_down(KeyEvent::new(*code, T0 + i as u64 * 300))
            })
            .collect()
    }

    use KeyCode::{VolumeDown as B, VolumeUp as A};

    #[test]
    fn test_full_sequence_emits_once() {
        let mut classifier = KeySequenceClassifier::default();
        let decisions = feed(&mut classifier, &[A, A, A, B, B, B]);

        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].source, ActivationSource::KeySequence);
        assert_eq!(decisions[0].timestamp_ms, T0 + 5 * 300);
        assert_eq!(classifier.state(), SequenceState::Idle);
    }

    #[test]
    fn test_stray_b_resets_then_second_run_emits() {
        let mut classifier = KeySequenceClassifier::default();
        let decisions = feed(&mut classifier, &[A, A, B, A, A, A, B, B, B]);

        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].timestamp_ms, T0 + 8 * 300);
    }

    #[test]
    fn test_state_progression() {
        let mut classifier = KeySequenceClassifier::default();

        feed(&mut classifier, &[A]);
        assert_eq!(classifier.state(), SequenceState::CountingA(1));
        classifier.on_key_down(KeyEvent::new(A, T0 + 300));
        assert_eq!(classifier.state(), SequenceState::CountingA(2));
        classifier.on_key_down(KeyEvent::new(A, T0 + 600));
        assert_eq!(classifier.state(), SequenceState::Armed);
        assert!(classifier.is_armed());
        classifier.on_key_down(KeyEvent::new(B, T0 + 900));
        assert_eq!(classifier.state(), SequenceState::CountingB(1));
    }

    #[test]
    fn test_extra_a_when_armed_restarts_stage_a() {
        let mut classifier = KeySequenceClassifier::default();
        feed(&mut classifier, &[A, A, A, A]);

        assert_eq!(classifier.state(), SequenceState::CountingA(1));
    }

    #[test]
    fn test_other_key_resets() {
        let mut classifier = KeySequenceClassifier::default();
        let decisions = feed(&mut classifier, &[A, A, A, B, KeyCode::Power, B, B]);

        assert!(decisions.is_empty());
        assert_eq!(classifier.state(), SequenceState::Idle);
    }

    #[test]
    fn test_b_in_idle_is_ignored() {
        let mut classifier = KeySequenceClassifier::default();
        assert!(feed(&mut classifier, &[B, B, B]).is_empty());
        assert_eq!(classifier.state(), SequenceState::Idle);
    }

    #[test]
    fn test_timeout_resets() {
        let mut classifier = KeySequenceClassifier::default();
        classifier.on_key_down(KeyEvent::new(A, T0));
        classifier.on_key_down(KeyEvent::new(A, T0 + 500));
        classifier.on_key_down(KeyEvent::new(A, T0 + 1_000));
        assert!(classifier.is_armed());

        // 2001ms of inactivity: the B press opens nothing.
        assert!(classifier.on_key_down(KeyEvent::new(B, T0 + 3_001)).is_none());
        assert_eq!(classifier.state(), SequenceState::Idle);
    }

    #[test]
    fn test_pause_equal_to_interval_is_allowed() {
        let mut classifier = KeySequenceClassifier::default();
        let mut t = T0;
        let mut decision = None;
        for code in [A, A, A, B, B, B] {
            decision = classifier.on_key_down(KeyEvent::new(code, t));
            t += 2_000;
        }
        assert!(decision.is_some());
    }

    #[test]
    fn test_expire_without_event() {
        let mut classifier = KeySequenceClassifier::default();
        feed(&mut classifier, &[A, A]);

        assert!(!classifier.expire(T0 + 2_000));
        assert!(classifier.expire(T0 + 300 + 2_001));
        assert_eq!(classifier.state(), SequenceState::Idle);
    }

    #[test]
    fn test_single_press_stages() {
        let mut classifier = KeySequenceClassifier::new(KeySequenceConfig {
            presses: 1,
            ..KeySequenceConfig::default()
        });
        assert_eq!(feed(&mut classifier, &[A, B]).len(), 1);
    }
}
