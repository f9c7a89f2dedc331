//! Monitor span helpers.

use tracing::Span;
use uuid::Uuid;

use crate::model::{Outcome, TaskKey};

/// Span covering one monitor's whole lifetime.
///
/// `monitor.attempts` is declared empty and filled by [`record_attempt`].
pub fn start_monitor_span(key: &TaskKey, run_id: &Uuid) -> Span {
    tracing::info_span!(
        "monitor.run",
        "monitor.category" = %key.category,
        "monitor.resource_id" = %key.resource_id,
        "monitor.run_id" = %run_id,
        "monitor.attempts" = tracing::field::Empty,
    )
}

/// Record an attempt on the monitor span and emit a debug event for it.
pub fn record_attempt(span: &Span, attempt: u64, outcome: Outcome) {
    span.record("monitor.attempts", attempt);
    span.in_scope(|| {
        tracing::debug!(attempt, outcome = outcome.as_str(), "attempt");
    });
}
