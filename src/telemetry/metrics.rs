//! Metric instruments for seatwatch.
//!
//! Built from the globally-registered `MeterProvider`; without an OTLP
//! endpoint the global provider is a no-op and recording is free.

use opentelemetry::metrics::{Counter, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("seatwatch")
}

/// Counter: start requests.
/// Labels: `result` ("ok" | "duplicate").
pub fn monitors_started() -> Counter<u64> {
    meter()
        .u64_counter("seatwatch.monitor.started")
        .with_description("Number of monitor start requests")
        .build()
}

/// Counter: reservation attempts.
/// Labels: `outcome`.
pub fn attempts() -> Counter<u64> {
    meter()
        .u64_counter("seatwatch.attempts")
        .with_description("Number of reservation attempts by outcome")
        .build()
}

/// Counter: notifications appended to the log.
/// Labels: `level`.
pub fn notifications_appended() -> Counter<u64> {
    meter()
        .u64_counter("seatwatch.notifications")
        .with_description("Number of notifications appended")
        .build()
}
