//! Drives the monitor through its public API only, the way a host would.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use safewatch::notify::BufferedSink;
use safewatch::{
    ActivationSource, Collaborators, FileStore, KeyValueStore, Location, LocationError,
    LocationProvider, ManualClock, MemoryStore, MonitorConfig, Notifier, NotifyError,
    SafetyMonitor, SensorSample, ShutdownVerdict, SinkMessage,
};

const T0: u64 = 1_700_000_000_000;

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<String>>,
}

impl Notifier for Outbox {
    fn notify(&self, subject: &str, _body: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(subject.to_string());
        Ok(())
    }
}

struct Gps(Location);

impl LocationProvider for Gps {
    fn current_fix(&self, _timeout: Duration) -> Result<Option<Location>, LocationError> {
        Ok(Some(self.0))
    }

    fn last_known_fix(&self) -> Result<Option<Location>, LocationError> {
        Ok(Some(self.0))
    }
}

fn build(
    store: Arc<dyn KeyValueStore>,
    clock: Arc<ManualClock>,
) -> (SafetyMonitor, Arc<Outbox>, Arc<BufferedSink>) {
    let outbox = Arc::new(Outbox::default());
    let sink = Arc::new(BufferedSink::new());
    let monitor = SafetyMonitor::new(
        MonitorConfig::strict(),
        Collaborators {
            store,
            notifier: outbox.clone(),
            locations: Arc::new(Gps(Location::new(-33.9249, 18.4241, T0))),
            sink: sink.clone(),
            clock,
        },
    );
    (monitor, outbox, sink)
}

#[test]
fn shake_activation_reaches_every_collaborator() {
    let (monitor, outbox, sink) = build(
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::new(T0)),
    );

    let events: Vec<_> = (0..4)
        .filter_map(|i| {
            monitor.on_sensor_sample(&SensorSample::new(T0 + i * 200, [0.0, 0.0, 120.0]))
        })
        .collect();
    smol::block_on(monitor.flush());

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source(), Some(ActivationSource::Shake));
    assert_eq!(
        outbox.sent.lock().unwrap().as_slice(),
        ["Emergency activation (shake)"]
    );

    let messages = sink.drain();
    assert_eq!(messages.len(), 2);
    assert!(matches!(messages[0], SinkMessage::Activation { .. }));
    assert!(matches!(messages[1], SinkMessage::Location { .. }));
}

#[test]
fn forced_shutdown_detected_across_file_store_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let clock = Arc::new(ManualClock::new(T0));

    {
        let (monitor, _, _) = build(Arc::new(FileStore::open(&path)), clock.clone());
        smol::block_on(async {
            monitor.on_boot().await;
            let heartbeat = monitor.start_heartbeat();
            let observer = FileStore::open(&path);
            for _ in 0..400 {
                let state = observer.snapshot().unwrap().heartbeat_state();
                if state.last_heartbeat_time_ms != 0 {
                    break;
                }
                smol::Timer::after(Duration::from_millis(5)).await;
            }
            heartbeat.stop().await;
        });
    }

    clock.advance(3 * 60 * 60 * 1000);
    let (monitor, outbox, _) = build(Arc::new(FileStore::open(&path)), clock.clone());
    let report = smol::block_on(monitor.on_boot());
    smol::block_on(monitor.flush());

    assert_eq!(report.verdict, ShutdownVerdict::Forced);
    assert!(monitor.forced_shutdown_status().detected);
    assert_eq!(outbox.sent.lock().unwrap().len(), 1);

    assert!(monitor.acknowledge_forced_shutdown());
    assert!(!monitor.forced_shutdown_status().detected);
}

#[test]
fn config_round_trips_through_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("safewatch.toml");
    std::fs::write(&path, "[shake]\nthreshold_g = 12.0\nrequired_count = 2\n").unwrap();

    let config = MonitorConfig::load(&path).unwrap();
    assert_eq!(config, MonitorConfig::sensitive());
}
