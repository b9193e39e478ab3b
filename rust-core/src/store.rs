//! Durable key-value state.
//!
//! The monitor keeps every piece of cross-lifetime state (liveness stamps,
//! shutdown flags, cached location, activation log) in one flat record of
//! typed fields. Two operations are all it needs:
//!
//! - [`KeyValueStore::snapshot`]: read the whole record atomically
//! - [`KeyValueStore::commit`]: apply an [`Edit`] atomically
//!
//! An edit only touches the keys it names. Two mutators writing different
//! fields at the same time therefore never clobber each other, and a
//! multi-field decision (e.g. the boot verdict) lands as one write.
//!
//! Read failures are never fatal to readers: an unreadable or corrupt
//! backing file snapshots as an empty record. A commit only replaces a
//! missing or corrupt file; any other read error fails the commit and
//! leaves the file alone.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::types::{HeartbeatState, Location, DEFAULT_HEARTBEAT_INTERVAL_MS};

/// Field names of the persisted record.
pub mod keys {
    pub const LAST_LAT: &str = "last_lat";
    pub const LAST_LON: &str = "last_lon";
    pub const LAST_LOCATION_TIME: &str = "last_time";

    pub const LAST_HEARTBEAT_TIME: &str = "last_heartbeat_time";
    pub const HEARTBEAT_INTERVAL_MS: &str = "heartbeat_interval_ms";
    pub const ORDERLY_SHUTDOWN: &str = "orderly_shutdown";
    pub const FORCED_SHUTDOWN_DETECTED: &str = "forced_shutdown_detected";
    pub const FORCED_SHUTDOWN_MESSAGE: &str = "forced_shutdown_message";
    pub const SHUTDOWN_NOTIFICATION_SENT: &str = "shutdown_email_sent";

    pub const ACTIVATION_LOG: &str = "activation_log";
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Long(i64),
    Str(String),
}

/// An immutable copy of the whole record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    fields: BTreeMap<String, Value>,
}

impl Snapshot {
    pub fn from_fields(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(Value::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.fields.get(key) {
            Some(Value::Long(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.fields.get(key) {
            Some(Value::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Timestamp field as `u64`; negative or missing values read as 0.
    fn get_time(&self, key: &str) -> u64 {
        self.get_long(key)
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(0)
    }

    /// The cached location, if all of its fields are present and valid.
    ///
    /// A zero capture time counts as "no location", matching how the
    /// shutdown path has always treated it.
    pub fn location(&self) -> Option<Location> {
        let lat = self.get_string(keys::LAST_LAT)?.parse::<f64>().ok()?;
        let lon = self.get_string(keys::LAST_LON)?.parse::<f64>().ok()?;
        let time = self.get_time(keys::LAST_LOCATION_TIME);
        if time == 0 {
            return None;
        }
        Some(Location::new(lat, lon, time))
    }

    /// The liveness fields, defaulted where absent.
    pub fn heartbeat_state(&self) -> HeartbeatState {
        let interval = match self.get_time(keys::HEARTBEAT_INTERVAL_MS) {
            0 => DEFAULT_HEARTBEAT_INTERVAL_MS,
            v => v,
        };
        HeartbeatState {
            last_heartbeat_time_ms: self.get_time(keys::LAST_HEARTBEAT_TIME),
            heartbeat_interval_ms: interval,
            orderly_shutdown: self.get_bool(keys::ORDERLY_SHUTDOWN).unwrap_or(false),
            forced_shutdown_detected: self
                .get_bool(keys::FORCED_SHUTDOWN_DETECTED)
                .unwrap_or(false),
            forced_shutdown_message: self
                .get_string(keys::FORCED_SHUTDOWN_MESSAGE)
                .map(str::to_string),
        }
    }

    /// Whether the last orderly-shutdown notification was confirmed sent.
    ///
    /// Absent means sent: there is nothing to retry.
    pub fn shutdown_notification_sent(&self) -> bool {
        self.get_bool(keys::SHUTDOWN_NOTIFICATION_SENT).unwrap_or(true)
    }

    fn apply(&mut self, edit: &Edit) {
        for (key, value) in &edit.changes {
            match value {
                Some(v) => {
                    self.fields.insert(key.clone(), v.clone());
                }
                None => {
                    self.fields.remove(key);
                }
            }
        }
    }
}

/// A batch of field writes applied atomically by [`KeyValueStore::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Edit {
    changes: Vec<(String, Option<Value>)>,
}

impl Edit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_string(mut self, key: &str, value: impl Into<String>) -> Self {
        self.changes
            .push((key.to_string(), Some(Value::Str(value.into()))));
        self
    }

    pub fn put_long(mut self, key: &str, value: i64) -> Self {
        self.changes.push((key.to_string(), Some(Value::Long(value))));
        self
    }

    /// Store a millisecond timestamp, saturating at `i64::MAX`.
    pub fn put_time(self, key: &str, value: u64) -> Self {
        let value = i64::try_from(value).unwrap_or(i64::MAX);
        self.put_long(key, value)
    }

    pub fn put_bool(mut self, key: &str, value: bool) -> Self {
        self.changes.push((key.to_string(), Some(Value::Bool(value))));
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.changes.push((key.to_string(), None));
        self
    }

    /// Overwrite the cached location.
    pub fn put_location(self, location: &Location) -> Self {
        self.put_string(keys::LAST_LAT, location.lat.to_string())
            .put_string(keys::LAST_LON, location.lon.to_string())
            .put_time(keys::LAST_LOCATION_TIME, location.captured_at_ms)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Durable typed key-value storage.
///
/// Implementations must make `snapshot` and `commit` atomic with respect
/// to each other.
pub trait KeyValueStore: Send + Sync {
    /// Read the whole record.
    fn snapshot(&self) -> Result<Snapshot, StoreError>;

    /// Apply every change in `edit` as one write.
    fn commit(&self, edit: &Edit) -> Result<(), StoreError>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Volatile store for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.clone())
    }

    fn commit(&self, edit: &Edit) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        guard.apply(edit);
        Ok(())
    }
}

// ============================================================================
// FILE STORE
// ============================================================================

/// JSON-file backed store.
///
/// The record is one JSON object. Commits rewrite the whole file through a
/// sibling temporary file and a rename, so a crash mid-write leaves either
/// the old or the new record, never a torn one.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or corrupt file reads as an empty record. Any other I/O
    /// failure is returned so a commit never overwrites a record it could
    /// not read.
    fn read_record(&self) -> Result<Snapshot, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Snapshot::default()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<BTreeMap<String, Value>>(&raw) {
            Ok(fields) => Ok(Snapshot::from_fields(fields)),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "state file corrupt, using empty record"
                );
                Ok(Snapshot::default())
            }
        }
    }

    fn write_record(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let encoded = serde_json::to_string_pretty(&snapshot.fields)
            .map_err(|e| StoreError::Encode(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "state file written");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        match self.read_record() {
            Ok(record) => Ok(record),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "state file unreadable, using empty record"
                );
                Ok(Snapshot::default())
            }
        }
    }

    fn commit(&self, edit: &Edit) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut record = self.read_record()?;
        record.apply(edit);
        self.write_record(&record)
    }
}
