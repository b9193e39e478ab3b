//! Safety monitor: the host-facing façade.
//!
//! Wires the detectors, the activation pipeline and the liveness protocol
//! around injected collaborators. The host feeds it three typed inbound
//! ports and four lifecycle signals:
//!
//! | Port / signal            | Effect                                          |
//! |--------------------------|-------------------------------------------------|
//! | `on_sensor_sample`       | shake classifier, then activation pipeline      |
//! | `on_transcript(s)`       | hotword classifier, gate, activation pipeline   |
//! | `on_key_event`           | key-sequence classifier, gate, pipeline         |
//! | `on_boot`                | previous-shutdown reconciliation                |
//! | `on_shutdown_signal`     | orderly flag and shutdown notification          |
//! | `start_heartbeat`        | liveness stamps until the handle drops          |
//! | `start_voice`            | supervised speech listening                     |
//!
//! An accepted activation is logged synchronously with whatever location
//! is cached at that moment. A fresh fix and the notification follow on a
//! background task; [`SafetyMonitor::flush`] waits for them.
//!
//! Nothing here returns an error to the host. Collaborator failures are
//! logged and the monitor carries on with defaults.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::activation_log::ActivationLog;
use crate::clock::{format_timestamp, Clock, SystemClock};
use crate::config::MonitorConfig;
use crate::gate::{ActivationGate, CooldownScope};
use crate::heartbeat::{HeartbeatHandle, HeartbeatMonitor};
use crate::hotword::HotwordClassifier;
use crate::key_sequence::KeySequenceClassifier;
use crate::location::{CapturePurpose, LocationCapture, LocationProvider, NoLocationProvider};
use crate::notify::{Dispatcher, EventSink, LogNotifier, LogSink, Notifier};
use crate::shake_detection::ShakeClassifier;
use crate::shutdown::{BootReconciler, BootReport, ShutdownSignalHandler};
use crate::store::{keys, Edit, KeyValueStore, MemoryStore};
use crate::tasks::BackgroundTasks;
use crate::types::{
    ActivationDecision, ActivationEvent, ActivationSource, KeyEvent, Location, SensorSample,
};
use crate::voice::{SpeechSource, VoiceHandle, VoiceSupervisor};

/// The host-provided side of the monitor.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn KeyValueStore>,
    pub notifier: Arc<dyn Notifier>,
    pub locations: Arc<dyn LocationProvider>,
    pub sink: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Volatile store, log-only notifier and sink, no positioning.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            notifier: Arc::new(LogNotifier),
            locations: Arc::new(NoLocationProvider),
            sink: Arc::new(LogSink),
            clock: Arc::new(SystemClock),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Persisted forced-shutdown alert, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedShutdownStatus {
    pub detected: bool,
    pub message: Option<String>,
}

/// Personal-safety background monitor.
pub struct SafetyMonitor {
    config: MonitorConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,

    // Detectors
    shake: Mutex<ShakeClassifier>,
    hotword: HotwordClassifier,
    key_sequence: Mutex<KeySequenceClassifier>,
    gate: Mutex<ActivationGate>,

    // Activation pipeline
    log: ActivationLog,
    capture: LocationCapture,
    dispatcher: Dispatcher,

    // Liveness protocol
    heartbeat: Arc<HeartbeatMonitor>,
    reconciler: BootReconciler,
    shutdown: ShutdownSignalHandler,

    tasks: Arc<BackgroundTasks>,
}

impl SafetyMonitor {
    pub fn new(config: MonitorConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            store,
            notifier,
            locations,
            sink,
            clock,
        } = collaborators;

        let tasks = Arc::new(BackgroundTasks::new());
        let dispatcher = Dispatcher::new(notifier);
        let capture = LocationCapture::new(
            config.location.clone(),
            locations,
            Arc::clone(&store),
            Arc::clone(&sink),
        );
        let heartbeat = Arc::new(HeartbeatMonitor::new(
            config.heartbeat.clone(),
            Arc::clone(&store),
            Arc::clone(&clock),
            capture.clone(),
        ));
        let reconciler = BootReconciler::new(
            config.shutdown.clone(),
            Arc::clone(&store),
            Arc::clone(&clock),
            capture.clone(),
            dispatcher.clone(),
            Arc::clone(&tasks),
        );
        let shutdown =
            ShutdownSignalHandler::new(Arc::clone(&store), dispatcher.clone(), Arc::clone(&tasks));

        Self {
            shake: Mutex::new(ShakeClassifier::new(config.shake.clone())),
            hotword: HotwordClassifier::new(config.hotword.clone()),
            key_sequence: Mutex::new(KeySequenceClassifier::new(config.key_sequence.clone())),
            gate: Mutex::new(ActivationGate::new(config.gate.clone())),
            log: ActivationLog::new(config.log.clone(), Arc::clone(&store), sink),
            capture,
            dispatcher,
            heartbeat,
            reconciler,
            shutdown,
            tasks,
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    // ===== INBOUND PORTS =====

    /// Feed one accelerometer sample. Its timestamp is the classifier's now.
    pub fn on_sensor_sample(&self, sample: &SensorSample) -> Option<ActivationEvent> {
        let decision = lock(&self.shake).classify(sample, sample.timestamp_ms)?;
        // The shake classifier has its own cooldown; the gate only adds the
        // cross-source one.
        let decision = match self.config.gate.scope {
            CooldownScope::Shared => lock(&self.gate).admit(decision)?,
            CooldownScope::PerSource => decision,
        };
        self.activate(decision)
    }

    /// Restart shake counting, e.g. after the sensor listener re-registers.
    pub fn reset_sensor_stream(&self) {
        lock(&self.shake).reset();
    }

    /// Feed one transcript.
    pub fn on_transcript(&self, transcript: &str) -> Option<ActivationEvent> {
        let decision = self.hotword.classify(transcript, self.clock.now_ms())?;
        self.gated(decision)
    }

    /// Feed every candidate transcript of one utterance.
    pub fn on_transcripts<S: AsRef<str>>(&self, candidates: &[S]) -> Option<ActivationEvent> {
        let decision = self
            .hotword
            .classify_candidates(candidates, self.clock.now_ms())?;
        self.gated(decision)
    }

    /// Feed one key-down event.
    pub fn on_key_event(&self, event: KeyEvent) -> Option<ActivationEvent> {
        let decision = lock(&self.key_sequence).on_key_down(event)?;
        self.gated(decision)
    }

    fn gated(&self, decision: ActivationDecision) -> Option<ActivationEvent> {
        let decision = lock(&self.gate).admit(decision)?;
        self.activate(decision)
    }

    fn activate(&self, decision: ActivationDecision) -> Option<ActivationEvent> {
        let cached = match self.store.snapshot() {
            Ok(snapshot) => snapshot.location(),
            Err(e) => {
                warn!(error = %e, "failed to read cached location");
                None
            }
        };
        let event = self.log.record(&decision, cached);

        let capture = self.capture.clone();
        let dispatcher = self.dispatcher.clone();
        let source = decision.source;
        let time_ms = decision.timestamp_ms;
        self.tasks.spawn(async move {
            let fresh = capture.capture(CapturePurpose::Activation).await;
            let (subject, body) = activation_notification(source, time_ms, fresh.or(cached));
            dispatcher.dispatch(subject, body).await;
        });
        Some(event)
    }

    // ===== LIFECYCLE =====

    /// Classify the previous shutdown. Call once per process start.
    pub async fn on_boot(&self) -> BootReport {
        self.reconciler.run().await
    }

    /// The host announced an orderly shutdown.
    pub fn on_shutdown_signal(&self) -> bool {
        self.shutdown.on_shutdown_signal(self.clock.now_ms())
    }

    pub fn start_heartbeat(&self) -> HeartbeatHandle {
        self.heartbeat.start()
    }

    /// Keep `source` listening, feeding its transcripts to the hotword port.
    pub fn start_voice(self: &Arc<Self>, source: Arc<dyn SpeechSource>) -> VoiceHandle {
        let monitor = Arc::clone(self);
        VoiceSupervisor::new(self.config.voice.clone(), source).start(move |candidates| {
            monitor.on_transcripts(candidates);
        })
    }

    pub fn forced_shutdown_status(&self) -> ForcedShutdownStatus {
        let state = self
            .store
            .snapshot()
            .map(|s| s.heartbeat_state())
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to read shutdown status");
                Default::default()
            });
        ForcedShutdownStatus {
            detected: state.forced_shutdown_detected,
            message: state.forced_shutdown_message,
        }
    }

    /// Clear the forced-shutdown flag and message.
    pub fn acknowledge_forced_shutdown(&self) -> bool {
        let edit = Edit::new()
            .put_bool(keys::FORCED_SHUTDOWN_DETECTED, false)
            .remove(keys::FORCED_SHUTDOWN_MESSAGE);
        match self.store.commit(&edit) {
            Ok(()) => {
                info!("forced shutdown acknowledged");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to clear forced shutdown flag");
                false
            }
        }
    }

    /// Every logged activation, oldest first.
    pub fn activation_log(&self) -> Vec<ActivationEvent> {
        self.log.read()
    }

    /// Wait for in-flight captures and notifications.
    pub async fn flush(&self) {
        self.tasks.flush().await;
        debug!("background work flushed");
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.pending()
    }
}

impl std::fmt::Debug for SafetyMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Subject and body of the notification sent for an activation.
pub fn activation_notification(
    source: ActivationSource,
    time_ms: u64,
    location: Option<Location>,
) -> (String, String) {
    let location = match location {
        Some(loc) => format!(
            "Lat: {}\nLon: {}\nCaptured: {}",
            loc.lat,
            loc.lon,
            format_timestamp(loc.captured_at_ms)
        ),
        None => "Location not available.".to_string(),
    };
    (
        format!("Emergency activation ({})", source.as_str()),
        format!(
            "Emergency activation triggered by {}.\nTime: {}\n\nLast known location:\n{}",
            source.as_str(),
            format_timestamp(time_ms),
            location
        ),
    )
}

// Detector state stays consistent across a panic in another holder.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
