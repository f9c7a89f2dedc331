//! Bounded notification log shared by monitors and observers.
//!
//! Monitors append progress and state changes; observers poll snapshots.
//! The log keeps the most recent `capacity` events and evicts the oldest
//! first. Ids are assigned under the same lock as insertion, so they are
//! strictly increasing and reflect true insertion order across all writers.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::metrics;

/// Events retained by default.
pub const DEFAULT_CAPACITY: usize = 50;

/// A single entry in the log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Monotonic id. Never reused, not even after eviction or `clear`.
    pub id: u64,
    pub message: String,
    pub level: Level,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock `HH:MM:SS` in local time, for display.
    pub formatted_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Success => "success",
            Level::Warning => "warning",
            Level::Error => "error",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug)]
struct Inner {
    events: VecDeque<Notification>,
    next_id: u64,
}

/// Thread-safe, bounded, append-only event buffer.
#[derive(Debug)]
pub struct NotificationLog {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that keeps at most `capacity` events (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                events: VecDeque::with_capacity(capacity + 1),
                next_id: 0,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event, evicting the oldest ones beyond capacity.
    pub fn append(&self, message: impl Into<String>, level: Level) -> Notification {
        let message = message.into();

        let notification = {
            let mut inner = self.lock();
            let timestamp = Utc::now();
            let formatted_time = timestamp.with_timezone(&Local).format("%H:%M:%S").to_string();
            let notification = Notification {
                id: inner.next_id,
                message,
                level,
                timestamp,
                formatted_time,
            };
            inner.next_id += 1;
            inner.events.push_back(notification.clone());
            while inner.events.len() > self.capacity {
                inner.events.pop_front();
            }
            notification
        };

        metrics::notifications_appended()
            .add(1, &[opentelemetry::KeyValue::new("level", level.as_str())]);
        tracing::debug!(id = notification.id, %level, text = %notification.message, "notification");
        notification
    }

    /// Copy of the current events, oldest first.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.lock().events.iter().cloned().collect()
    }

    /// Copy of the retained events with an id greater than `id`.
    pub fn since(&self, id: u64) -> Vec<Notification> {
        self.lock()
            .events
            .iter()
            .filter(|n| n.id > id)
            .cloned()
            .collect()
    }

    /// Drop every retained event. Ids continue from where they left off.
    pub fn clear(&self) {
        self.lock().events.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    // Every critical section leaves `Inner` consistent, so a poisoned lock
    // still guards valid data.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_at_least_one() {
        let log = NotificationLog::with_capacity(0);
        log.append("a", Level::Info);
        log.append("b", Level::Info);
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.snapshot()[0].message, "b");
    }

    #[test]
    fn formatted_time_is_clock_time() {
        let log = NotificationLog::new();
        let n = log.append("x", Level::Warning);
        assert_eq!(n.formatted_time.len(), 8);
        assert_eq!(n.formatted_time.matches(':').count(), 2);
    }
}
