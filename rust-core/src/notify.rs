//! Outbound collaborators: notification transport and UI event sink.
//!
//! Both are best-effort. A notification is handed to a background task and
//! the caller's contract ends there; a failure is logged and never rolls
//! back the state change that triggered it.

use std::sync::{Arc, Mutex};

use smol::Task;
use tracing::{error, info};

use crate::error::NotifyError;
use crate::types::SinkMessage;

/// Delivers a notification (e-mail in the reference deployment).
///
/// Implementations may block; the dispatcher runs them off the caller's
/// thread.
pub trait Notifier: Send + Sync {
    fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Receives push messages for the UI bridge.
pub trait EventSink: Send + Sync {
    fn publish(&self, message: SinkMessage);
}

/// Notifier that only logs. Used when no transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(subject, body, "notification");
        Ok(())
    }
}

/// Sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, message: SinkMessage) {
        match serde_json::to_string(&message) {
            Ok(json) => info!(message = %json, "ui event"),
            Err(e) => error!(error = %e, "failed to encode ui event"),
        }
    }
}

/// Sink that keeps every message. Handy for hosts that poll.
#[derive(Debug, Default)]
pub struct BufferedSink {
    messages: Mutex<Vec<SinkMessage>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything published so far.
    pub fn drain(&self) -> Vec<SinkMessage> {
        self.messages
            .lock()
            .map(|mut m| m.drain(..).collect())
            .unwrap_or_default()
    }
}

impl EventSink for BufferedSink {
    fn publish(&self, message: SinkMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}

/// Runs notifications on the blocking pool.
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Start sending a notification.
    ///
    /// The returned task resolves to `true` if the transport accepted it.
    /// Detaching it is fine; failures are logged either way.
    pub fn dispatch(&self, subject: impl Into<String>, body: impl Into<String>) -> Task<bool> {
        let notifier = Arc::clone(&self.notifier);
        let subject = subject.into();
        let body = body.into();
        smol::spawn(smol::unblock(move || match notifier.notify(&subject, &body) {
            Ok(()) => {
                info!(subject = %subject, "notification sent");
                true
            }
            Err(e) => {
                error!(subject = %subject, error = %e, "failed to send notification");
                false
            }
        }))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}
