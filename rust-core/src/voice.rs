//! Voice Listener Supervision.
//!
//! The speech engine itself is the host's. The monitor keeps it listening:
//! every utterance's transcripts are handed to the hotword port, and the
//! engine is restarted after each utterance. Recognizer errors (no match,
//! busy, network) restart it with exponential backoff so a broken engine
//! does not spin.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use smol::{Task, Timer};
use tracing::{debug, info, warn};

use crate::error::SpeechError;

/// Configuration for voice listening.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// First retry delay after an error (ms).
    pub base_delay_ms: u64,
    /// Retry delay ceiling (ms).
    pub max_delay_ms: u64,
    /// Consecutive errors before a warning is logged.
    pub failure_threshold: u32,
    /// Pause before listening again after an utterance (ms).
    pub restart_delay_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 800,    // Recognizer needs a moment to release
            max_delay_ms: 8000,    // Never deaf for longer than 8s
            failure_threshold: 6,  // ~30s of continuous failure
            restart_delay_ms: 200, // Back to listening almost at once
        }
    }
}

/// Exponential restart delay.
#[derive(Debug, Clone)]
pub struct RestartBackoff {
    base_ms: u64,
    max_ms: u64,
    threshold: u32,
    next_ms: u64,
    failures: u32,
}

impl RestartBackoff {
    pub fn new(config: &VoiceConfig) -> Self {
        Self {
            base_ms: config.base_delay_ms,
            max_ms: config.max_delay_ms.max(config.base_delay_ms),
            threshold: config.failure_threshold,
            next_ms: config.base_delay_ms,
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn on_error(&mut self) -> Duration {
        let delay = self.next_ms;
        self.next_ms = self.next_ms.saturating_mul(2).min(self.max_ms);
        self.failures = self.failures.saturating_add(1);
        if self.failures == self.threshold {
            warn!(failures = self.failures, "speech recognizer keeps failing");
        }
        Duration::from_millis(delay)
    }

    /// Record a success; the next failure starts from the base delay.
    pub fn on_success(&mut self) {
        self.next_ms = self.base_ms;
        self.failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn next_delay(&self) -> Duration {
        Duration::from_millis(self.next_ms)
    }
}

/// Host speech engine.
pub trait SpeechSource: Send + Sync {
    /// Listen for one utterance and return its candidate transcripts,
    /// partial results included. Blocks until the utterance ends.
    fn listen(&self) -> Result<Vec<String>, SpeechError>;
}

/// Keeps a [`SpeechSource`] listening.
pub struct VoiceSupervisor {
    config: VoiceConfig,
    source: Arc<dyn SpeechSource>,
}

impl VoiceSupervisor {
    pub fn new(config: VoiceConfig, source: Arc<dyn SpeechSource>) -> Self {
        Self { config, source }
    }

    /// Start the listen loop, passing every non-empty transcript batch to
    /// `on_transcripts`. The loop lives as long as the returned handle.
    pub fn start<F>(self, on_transcripts: F) -> VoiceHandle
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        info!("voice listener started");
        let task = smol::spawn(async move {
            let mut backoff = RestartBackoff::new(&self.config);
            let restart = Duration::from_millis(self.config.restart_delay_ms);
            loop {
                let source = Arc::clone(&self.source);
                match smol::unblock(move || source.listen()).await {
                    Ok(candidates) => {
                        backoff.on_success();
                        if !candidates.is_empty() {
                            debug!(count = candidates.len(), "transcripts received");
                            on_transcripts(&candidates);
                        }
                        Timer::after(restart).await;
                    }
                    Err(e) => {
                        let delay = backoff.on_error();
                        debug!(
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            failures = backoff.consecutive_failures(),
                            "speech error, restarting later"
                        );
                        Timer::after(delay).await;
                    }
                }
            }
        });
        VoiceHandle { task: Some(task) }
    }
}

impl std::fmt::Debug for VoiceSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceSupervisor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Owner of a running listen loop. Dropping it cancels the loop.
#[derive(Debug)]
pub struct VoiceHandle {
    task: Option<Task<()>>,
}

impl VoiceHandle {
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.cancel().await;
            info!("voice listener stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = RestartBackoff::new(&VoiceConfig::default());
        let delays: Vec<u64> = (0..6).map(|_| backoff.on_error().as_millis() as u64).collect();
        assert_eq!(delays, vec![800, 1600, 3200, 6400, 8000, 8000]);
        assert_eq!(backoff.consecutive_failures(), 6);
    }

    #[test]
    fn test_backoff_resets_on_success() {
        let mut backoff = RestartBackoff::new(&VoiceConfig::default());
        backoff.on_error();
        backoff.on_error();
        backoff.on_success();
        assert_eq!(backoff.consecutive_failures(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(800));
    }

    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Vec<String>, SpeechError>>>,
    }

    impl SpeechSource for ScriptedSource {
        fn listen(&self) -> Result<Vec<String>, SpeechError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(SpeechError::Recognizer(7)))
        }
    }

    #[test]
    fn test_supervisor_delivers_after_errors() {
        let source = Arc::new(ScriptedSource {
            script: Mutex::new(VecDeque::from(vec![
                Err(SpeechError::Recognizer(7)),
                Err(SpeechError::Recognizer(6)),
                Ok(vec![]),
                Ok(vec!["please".to_string(), "please help me".to_string()]),
            ])),
        });
        let config = VoiceConfig {
            base_delay_ms: 1,
            max_delay_ms: 2,
            restart_delay_ms: 1,
            ..VoiceConfig::default()
        };
        let (tx, rx) = smol::channel::unbounded::<Vec<String>>();

        let handle = VoiceSupervisor::new(config, source).start(move |candidates| {
            let _ = tx.try_send(candidates.to_vec());
        });
        let received = smol::block_on(rx.recv()).unwrap();
        smol::block_on(handle.stop());

        assert_eq!(received, vec!["please", "please help me"]);
        assert!(rx.try_recv().is_err());
    }
}
