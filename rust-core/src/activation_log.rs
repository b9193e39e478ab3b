//! Activation Event Journal.
//!
//! Append-only, bounded log of every accepted activation, persisted as one
//! JSON array under [`keys::ACTIVATION_LOG`]. Each recorded event is also
//! pushed to the UI sink, exactly once, whether or not persistence worked.

use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::notify::EventSink;
use crate::store::{keys, Edit, KeyValueStore};
use crate::types::{ActivationDecision, ActivationEvent, Location, SinkMessage};

/// Configuration for the activation log.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Entries kept; the oldest are dropped first.
    pub max_entries: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { max_entries: 500 }
    }
}

/// Serialize a log, oldest first.
pub fn encode(events: &[ActivationEvent]) -> Result<String, StoreError> {
    serde_json::to_string(events).map_err(|e| StoreError::Encode(e.to_string()))
}

/// Parse a stored log. Anything unparseable is an empty log.
pub fn decode(raw: &str) -> Vec<ActivationEvent> {
    match serde_json::from_str::<Vec<ActivationEvent>>(raw) {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "activation log corrupt, starting empty");
            Vec::new()
        }
    }
}

/// The persisted activation journal.
pub struct ActivationLog {
    config: LogConfig,
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn EventSink>,
    // Serializes read-modify-write of the log field.
    append: Mutex<()>,
}

impl ActivationLog {
    pub fn new(config: LogConfig, store: Arc<dyn KeyValueStore>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            store,
            sink,
            append: Mutex::new(()),
        }
    }

    /// Append an event for `decision` carrying `location`, then publish it.
    pub fn record(
        &self,
        decision: &ActivationDecision,
        location: Option<Location>,
    ) -> ActivationEvent {
        let event = ActivationEvent::from_decision(decision, location);

        match self.persist(&event) {
            Ok(len) => debug!(kind = %event.activation_type, len, "activation logged"),
            Err(e) => warn!(
                error = %e,
                kind = %event.activation_type,
                "failed to persist activation"
            ),
        }

        self.sink.publish(SinkMessage::for_event(&event));
        info!(
            kind = %event.activation_type,
            time = event.time_ms,
            has_location = event.location.is_some(),
            "activation recorded"
        );
        event
    }

    /// Every stored event, oldest first.
    pub fn read(&self) -> Vec<ActivationEvent> {
        match self.store.snapshot() {
            Ok(snapshot) => snapshot
                .get_string(keys::ACTIVATION_LOG)
                .map(decode)
                .unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "failed to read activation log");
                Vec::new()
            }
        }
    }

    fn persist(&self, event: &ActivationEvent) -> Result<usize, StoreError> {
        let _guard = self.append.lock().map_err(|_| StoreError::Poisoned)?;

        let mut events = self.read();
        events.push(event.clone());
        if events.len() > self.config.max_entries {
            let excess = events.len() - self.config.max_entries;
            events.drain(..excess);
        }

        let encoded = encode(&events)?;
        self.store
            .commit(&Edit::new().put_string(keys::ACTIVATION_LOG, encoded))?;
        Ok(events.len())
    }
}

impl std::fmt::Debug for ActivationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationLog")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{FlakyStore, RecordingSink};
    use crate::types::ActivationSource;

    const T0: u64 = 1_700_000_000_000;

    fn log_with(max_entries: usize) -> (ActivationLog, Arc<MemoryStore>, Arc<RecordingSink>) {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        let log = ActivationLog::new(LogConfig { max_entries }, store.clone(), sink.clone());
        (log, store, sink)
    }

    #[test]
    fn test_records_in_call_order() {
        let (log, _, _) = log_with(500);
        let sources = [
            ActivationSource::Shake,
            ActivationSource::Hotword,
            ActivationSource::KeySequence,
            ActivationSource::Shake,
        ];
        for (i, source) in sources.iter().enumerate() {
            log.record(&ActivationDecision::new(*source, T0 + i as u64), None);
        }

        let events = log.read();
        assert_eq!(events.len(), 4);
        for (i, (event, source)) in events.iter().zip(sources).enumerate() {
            assert_eq!(event.time_ms, T0 + i as u64);
            assert_eq!(event.source(), Some(source));
        }
    }

    #[test]
    fn test_event_carries_location() {
        let (log, _, sink) = log_with(500);
        let loc = Location::new(6.9, 79.8, T0 - 5_000);

        let event = log.record(&ActivationDecision::new(ActivationSource::Hotword, T0), Some(loc));

        assert_eq!(event.location, Some(loc));
        assert_eq!(log.read(), vec![event.clone()]);
        assert_eq!(sink.messages(), vec![SinkMessage::for_event(&event)]);
    }

    #[test]
    fn test_cap_drops_oldest() {
        let (log, _, _) = log_with(3);
        for i in 0..5 {
            log.record(&ActivationDecision::new(ActivationSource::Shake, T0 + i), None);
        }

        let times: Vec<u64> = log.read().iter().map(|e| e.time_ms).collect();
        assert_eq!(times, vec![T0 + 2, T0 + 3, T0 + 4]);
    }

    #[test]
    fn test_publishes_even_when_persistence_fails() {
        let store = Arc::new(FlakyStore::new());
        store.set_fail_writes(true);
        let sink = Arc::new(RecordingSink::new());
        let log = ActivationLog::new(LogConfig::default(), store.clone(), sink.clone());

        log.record(&ActivationDecision::new(ActivationSource::Shake, T0), None);

        assert_eq!(sink.messages().len(), 1);
        assert_eq!(store.commits(), 1);
        assert!(log.read().is_empty());
    }

    #[test]
    fn test_corrupt_log_is_replaced() {
        let (log, store, _) = log_with(500);
        store
            .commit(&Edit::new().put_string(keys::ACTIVATION_LOG, "[{\"type\":"))
            .unwrap();
        assert!(log.read().is_empty());

        log.record(&ActivationDecision::new(ActivationSource::KeySequence, T0), None);
        assert_eq!(log.read().len(), 1);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let events = vec![
            ActivationEvent::from_decision(
                &ActivationDecision::new(ActivationSource::Shake, T0),
                Some(Location::new(1.5, -2.25, T0 - 1)),
            ),
            ActivationEvent::from_decision(
                &ActivationDecision::new(ActivationSource::Hotword, T0 + 1),
                None,
            ),
        ];
        let raw = encode(&events).unwrap();
        assert!(raw.contains("\"type\":\"shake\""));
        assert!(raw.contains("\"captured_at\""));
        assert_eq!(decode(&raw), events);
        assert!(decode("not json").is_empty());
        assert!(decode("").is_empty());
    }
}
