//! Core data model.
//!
//! A monitoring task targets one course section, identified by its category
//! and resource id. It has a display name, a lifecycle status, and a running
//! tally of reservation attempts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Task Key
// ---------------------------------------------------------------------------

/// Identifies a monitorable target: (category, resource id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    /// Course category, e.g. "major_benbu".
    pub category: String,
    /// Section id within the category (the endpoint's `kcrwdm`).
    pub resource_id: String,
}

impl TaskKey {
    pub fn new(category: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            resource_id: resource_id.into(),
        }
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.category, self.resource_id)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a monitoring task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Worker is polling the endpoint.
    Running,
    /// Seat reserved. Terminal.
    Succeeded,
    /// Stopped on request. Terminal.
    Stopped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Task State
// ---------------------------------------------------------------------------

/// Registry entry for one active task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub key: TaskKey,

    /// Human-readable label, usually the course title.
    pub display_name: String,

    pub status: TaskStatus,

    /// Distinguishes successive registrations of the same key. A worker only
    /// ever touches the entry carrying its own run id.
    pub run_id: Uuid,

    /// Delay between attempts.
    #[serde(with = "duration_secs")]
    pub interval: Duration,

    /// Number of attempts made so far.
    pub attempts: u64,

    /// Outcome of the most recent attempt. None until the first one returns.
    pub last_outcome: Option<Outcome>,

    /// Message text that came with the most recent attempt.
    pub last_message: Option<String>,

    pub started_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
}

impl TaskState {
    /// A fresh Running entry with a new run id.
    pub fn new(key: TaskKey, display_name: impl Into<String>, interval: Duration) -> Self {
        let now = Utc::now();
        Self {
            key,
            display_name: display_name.into(),
            status: TaskStatus::Running,
            run_id: Uuid::new_v4(),
            interval,
            attempts: 0,
            last_outcome: None,
            last_message: None,
            started_at: now,
            last_checked_at: now,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Attempt results
// ---------------------------------------------------------------------------

/// What one call to the reservation endpoint produced, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawResult {
    /// The endpoint answered with a structured body.
    Reply {
        code: Option<i64>,
        message: Option<String>,
    },
    /// No usable response: network error, non-OK status, unreadable body.
    TransportFailure { reason: String },
}

impl RawResult {
    pub fn reply(code: Option<i64>, message: impl Into<String>) -> Self {
        RawResult::Reply {
            code,
            message: Some(message.into()),
        }
    }

    pub fn transport_failure(reason: impl Into<String>) -> Self {
        RawResult::TransportFailure {
            reason: reason.into(),
        }
    }
}

/// Classified outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Reservation completed.
    Success,
    /// Valid attempt, section at capacity.
    ResourceFull,
    /// Rejected for another reason (conflict, already enrolled, ...).
    OtherRejected,
    /// The network call itself failed.
    TransportFailure,
}

impl Outcome {
    /// Every outcome except `Success` is retried.
    pub fn is_transient(self) -> bool {
        !matches!(self, Outcome::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::ResourceFull => "resource_full",
            Outcome::OtherRejected => "other_rejected",
            Outcome::TransportFailure => "transport_failure",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status view
// ---------------------------------------------------------------------------

/// Display-safe projection of a task, as returned by `Engine::status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub category: String,
    pub resource_id: String,
    pub display_name: String,
    pub status: TaskStatus,
    pub attempts: u64,
    pub last_outcome: Option<Outcome>,
    pub started_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
}

impl From<&TaskState> for TaskView {
    fn from(state: &TaskState) -> Self {
        Self {
            category: state.key.category.clone(),
            resource_id: state.key.resource_id.clone(),
            display_name: state.display_name.clone(),
            status: state.status,
            attempts: state.attempts,
            last_outcome: state.last_outcome,
            started_at: state.started_at,
            last_checked_at: state.last_checked_at,
        }
    }
}
