//! Monitor worker: the per-task polling loop.
//!
//! A monitor attempts the reservation, classifies the reply, and either
//! finishes (success) or waits out the interval and tries again. It never
//! gives up on its own; only success or cancellation ends it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, info, warn};
use uuid::Uuid;

use crate::classify::{Classification, Classifier};
use crate::model::{Outcome, TaskKey, TaskStatus};
use crate::notification::{Level, NotificationLog};
use crate::registry::TaskRegistry;
use crate::reserve::{AttemptContext, Reserve};
use crate::telemetry::metrics;
use crate::telemetry::monitor::{record_attempt, start_monitor_span};

/// How a monitor ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// The reservation went through on attempt `attempts`.
    Succeeded { attempts: u64 },
    /// The task was removed from the registry before it succeeded.
    Stopped { attempts: u64 },
}

impl MonitorExit {
    pub fn attempts(self) -> u64 {
        match self {
            MonitorExit::Succeeded { attempts } | MonitorExit::Stopped { attempts } => attempts,
        }
    }

    pub fn status(self) -> TaskStatus {
        match self {
            MonitorExit::Succeeded { .. } => TaskStatus::Succeeded,
            MonitorExit::Stopped { .. } => TaskStatus::Stopped,
        }
    }
}

/// Everything one worker needs. Built by the engine, consumed by [`Monitor::run`].
pub(crate) struct Monitor {
    pub key: TaskKey,
    pub run_id: Uuid,
    pub interval: Duration,
    pub progress_every: u64,
    pub ctx: AttemptContext,
    pub cancel: CancellationToken,
    pub registry: Arc<TaskRegistry>,
    pub log: Arc<NotificationLog>,
    pub reserver: Arc<dyn Reserve>,
    pub classifier: Arc<Classifier>,
}

impl Monitor {
    /// Poll until success or cancellation.
    pub async fn run(self) -> MonitorExit {
        let span = start_monitor_span(&self.key, &self.run_id);
        let exit = self.poll(&span).instrument(span.clone()).await;
        span.in_scope(|| info!(?exit, "monitor finished"));
        exit
    }

    async fn poll(&self, span: &Span) -> MonitorExit {
        let mut attempts = 0;
        loop {
            if self.cancel.is_cancelled() {
                return MonitorExit::Stopped { attempts };
            }

            let now = Utc::now();
            let counted = self.registry.update(&self.key, self.run_id, |state| {
                state.attempts += 1;
                state.last_checked_at = now;
                attempts = state.attempts;
            });
            if !counted {
                return MonitorExit::Stopped { attempts };
            }

            let raw = self.reserver.attempt(&self.key, &self.ctx).await;
            let Classification { outcome, message } = self.classifier.classify(&raw);

            metrics::attempts().add(1, &[KeyValue::new("outcome", outcome.as_str())]);
            record_attempt(span, attempts, outcome);

            if outcome == Outcome::Success {
                self.succeed(attempts);
                return MonitorExit::Succeeded { attempts };
            }

            let recorded = self.registry.update(&self.key, self.run_id, |state| {
                state.last_outcome = Some(outcome);
                state.last_message = Some(message.clone());
            });
            if !recorded {
                // Stopped while the request was in flight.
                return MonitorExit::Stopped { attempts };
            }

            if attempts % self.progress_every == 0 {
                self.report_progress(attempts, outcome, &message);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return MonitorExit::Stopped { attempts };
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Single success transition: mark, remove, notify once.
    fn succeed(&self, attempts: u64) {
        self.registry.update(&self.key, self.run_id, |state| {
            state.status = TaskStatus::Succeeded;
            state.last_outcome = Some(Outcome::Success);
        });
        if self.registry.remove_run(&self.key, self.run_id).is_some() {
            info!(task = %self.key, attempts, "reservation succeeded");
        } else {
            // The seat is ours even though the task was stopped meanwhile.
            warn!(task = %self.key, attempts, "reservation succeeded after stop request");
        }
        self.log.append(
            format!(
                "Reserved {} after {attempts} attempt(s)",
                self.ctx.display_name
            ),
            Level::Success,
        );
    }

    fn report_progress(&self, attempts: u64, outcome: Outcome, message: &str) {
        let name = &self.ctx.display_name;
        match outcome {
            Outcome::ResourceFull => {
                self.log.append(
                    format!("Monitoring {name}: attempt {attempts}, section full"),
                    Level::Info,
                );
            }
            _ => {
                self.log.append(
                    format!("Monitoring {name}: attempt {attempts}, error: {message}"),
                    Level::Warning,
                );
            }
        }
    }
}
