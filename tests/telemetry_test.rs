//! Integration tests for telemetry initialization and span helpers.

use seatwatch::model::{Outcome, TaskKey};
use uuid::Uuid;

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process; an Err here
    // just means another test got there first.
    let config = seatwatch::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "seatwatch-test".to_string(),
        log_level: "debug".to_string(),
    };
    let _guard = seatwatch::telemetry::init_telemetry(config);
}

#[test]
fn monitor_span_records_attempts() {
    let key = TaskKey::new("major_benbu", "C123");
    let span = seatwatch::telemetry::monitor::start_monitor_span(&key, &Uuid::new_v4());
    seatwatch::telemetry::monitor::record_attempt(&span, 1, Outcome::ResourceFull);
    seatwatch::telemetry::monitor::record_attempt(&span, 2, Outcome::Success);
}

#[test]
fn metric_instruments_build_without_provider() {
    use opentelemetry::KeyValue;
    seatwatch::telemetry::metrics::attempts().add(1, &[KeyValue::new("outcome", "success")]);
    seatwatch::telemetry::metrics::monitors_started().add(1, &[KeyValue::new("result", "ok")]);
    seatwatch::telemetry::metrics::notifications_appended()
        .add(1, &[KeyValue::new("level", "info")]);
}
