//! Recording fakes for the external collaborators.
//!
//! Compiled for unit tests only; the integration tests under `tests/`
//! carry their own copies.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{LocationError, NotifyError, StoreError};
use crate::location::LocationProvider;
use crate::notify::{EventSink, Notifier};
use crate::store::{Edit, KeyValueStore, MemoryStore, Snapshot};
use crate::types::{Location, SinkMessage};

/// Notifier that remembers what it was asked to send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|(s, _)| s).collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Unavailable("test transport down".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// Sink that remembers every message.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<SinkMessage>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<SinkMessage> {
        self.messages.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, message: SinkMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

/// Provider returning canned fixes.
#[derive(Debug)]
pub struct FakeLocationProvider {
    current: Mutex<Result<Option<Location>, LocationError>>,
    last_known: Mutex<Option<Location>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl Default for FakeLocationProvider {
    fn default() -> Self {
        Self {
            current: Mutex::new(Ok(None)),
            last_known: Mutex::new(None),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeLocationProvider {
    pub fn with_fix(location: Location) -> Self {
        let provider = Self::default();
        *provider.current.lock().unwrap() = Ok(Some(location));
        provider
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn set_current(&self, result: Result<Option<Location>, LocationError>) {
        *self.current.lock().unwrap() = result;
    }

    pub fn set_last_known(&self, location: Option<Location>) {
        *self.last_known.lock().unwrap() = location;
    }

    /// Make `current_fix` block for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LocationProvider for FakeLocationProvider {
    fn current_fix(&self, _timeout: Duration) -> Result<Option<Location>, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.current.lock().unwrap().clone()
    }

    fn last_known_fix(&self) -> Result<Option<Location>, LocationError> {
        Ok(*self.last_known.lock().unwrap())
    }
}

/// Store whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    commits: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

impl KeyValueStore for FlakyStore {
    fn snapshot(&self) -> Result<Snapshot, StoreError> {
        self.inner.snapshot()
    }

    fn commit(&self, edit: &Edit) -> Result<(), StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.inner.commit(edit)
    }
}
