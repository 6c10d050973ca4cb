//! Notification Module
//!
//! User-facing status messages emitted by the resilient executor
//! ("reconnecting", "connection restored", "temporarily unavailable").
//! Notifications are advisory; nothing depends on them being delivered.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

// == Notification Kind ==
/// Visual style of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

// == Notification ==
/// A status message for the UI notification layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub kind: NotificationKind,
    /// How long the message should stay visible
    #[serde(rename = "durationMs", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl Notification {
    /// Creates a notification.
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        description: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            kind,
            duration,
        }
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

// == Sink Trait ==
/// Receiver of user-facing notifications.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

// == Tracing Sink ==
/// Default sink: writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, n: Notification) {
        match n.kind {
            NotificationKind::Info | NotificationKind::Success => {
                info!(title = %n.title, "{}", n.description)
            }
            NotificationKind::Warning => warn!(title = %n.title, "{}", n.description),
            NotificationKind::Error => error!(title = %n.title, "{}", n.description),
        }
    }
}

// == Memory Sink ==
/// Sink that records every notification, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemorySink {
    received: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.received
            .lock()
            .map(|received| received.clone())
            .unwrap_or_default()
    }

    /// Titles of everything received so far, in order.
    pub fn titles(&self) -> Vec<String> {
        self.notifications().into_iter().map(|n| n.title).collect()
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, notification: Notification) {
        if let Ok(mut received) = self.received.lock() {
            received.push(notification);
        }
    }
}
