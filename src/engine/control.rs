//! Engine facade: start, stop and observe monitors.
//!
//! The engine owns the registry, the notification log, and the join handles
//! of every worker it spawned. Callers never see a handle or a live map,
//! only copies.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use opentelemetry::KeyValue;
use secrecy::SecretString;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::monitor::{Monitor, MonitorExit};
use crate::classify::Classifier;
use crate::error::{Error, Result};
use crate::model::{TaskKey, TaskState, TaskView};
use crate::notification::{self, Level, Notification, NotificationLog};
use crate::registry::TaskRegistry;
use crate::reserve::{AttemptContext, Reserve};
use crate::telemetry::metrics;

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval used when a start request does not name one.
    pub default_interval: Duration,
    /// Emit a progress notification every this many failed attempts.
    pub progress_every: u64,
    /// Notifications retained by the log.
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(5),
            progress_every: 10,
            notification_capacity: notification::DEFAULT_CAPACITY,
        }
    }
}

/// A request to start monitoring one section.
#[derive(Debug)]
pub struct MonitorRequest {
    pub key: TaskKey,
    pub display_name: String,
    pub credentials: SecretString,
    pub interval: Option<Duration>,
}

impl MonitorRequest {
    pub fn new(
        key: TaskKey,
        display_name: impl Into<String>,
        credentials: impl Into<SecretString>,
    ) -> Self {
        Self {
            key,
            display_name: display_name.into(),
            credentials: credentials.into(),
            interval: None,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

type Workers = HashMap<TaskKey, Vec<JoinHandle<MonitorExit>>>;

/// The monitoring engine. The only thing outside callers touch.
pub struct Engine {
    registry: Arc<TaskRegistry>,
    log: Arc<NotificationLog>,
    reserver: Arc<dyn Reserve>,
    classifier: Arc<Classifier>,
    config: EngineConfig,
    workers: Arc<Mutex<Workers>>,
}

impl Clone for Engine {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            log: Arc::clone(&self.log),
            reserver: Arc::clone(&self.reserver),
            classifier: Arc::clone(&self.classifier),
            config: self.config.clone(),
            workers: Arc::clone(&self.workers),
        }
    }
}

impl Engine {
    pub fn new(reserver: Arc<dyn Reserve>, classifier: Classifier, config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(TaskRegistry::new()),
            log: Arc::new(NotificationLog::with_capacity(config.notification_capacity)),
            reserver,
            classifier: Arc::new(classifier),
            config,
            workers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a task and spawn its monitor.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateTask`] if the key is already being monitored.
    pub fn start(&self, request: MonitorRequest) -> Result<TaskKey> {
        let MonitorRequest {
            key,
            display_name,
            credentials,
            interval,
        } = request;
        let interval = interval.unwrap_or(self.config.default_interval);

        let state = TaskState::new(key.clone(), display_name.clone(), interval);
        let run_id = state.run_id;
        let cancel = CancellationToken::new();

        if !self.registry.try_register(state, cancel.clone()) {
            metrics::monitors_started().add(1, &[KeyValue::new("result", "duplicate")]);
            warn!(task = %key, "start rejected, already monitoring");
            self.log.append(
                format!("{display_name} is already being monitored"),
                Level::Warning,
            );
            return Err(Error::DuplicateTask(key));
        }

        metrics::monitors_started().add(1, &[KeyValue::new("result", "ok")]);
        info!(task = %key, %run_id, ?interval, "monitor started");
        self.log
            .append(format!("Started monitoring: {display_name}"), Level::Info);

        let monitor = Monitor {
            key: key.clone(),
            run_id,
            interval,
            progress_every: self.config.progress_every.max(1),
            ctx: AttemptContext {
                display_name,
                credentials,
            },
            cancel,
            registry: Arc::clone(&self.registry),
            log: Arc::clone(&self.log),
            reserver: Arc::clone(&self.reserver),
            classifier: Arc::clone(&self.classifier),
        };
        let handle = tokio::spawn(monitor.run());

        let mut workers = self.workers();
        workers.entry(key.clone()).or_default().push(handle);
        prune_finished(&mut workers);

        Ok(key)
    }

    /// Stop monitoring `key`.
    ///
    /// The worker notices at its next check or while sleeping. A request
    /// already in flight is allowed to finish.
    ///
    /// # Errors
    ///
    /// [`Error::TaskNotFound`] if nothing is registered under `key`. No
    /// notification is written in that case.
    pub fn stop(&self, key: &TaskKey) -> Result<()> {
        let state = self
            .registry
            .remove(key)
            .ok_or_else(|| Error::TaskNotFound(key.clone()))?;

        info!(task = %key, attempts = state.attempts, "monitor stopped");
        self.log.append(
            format!("Stopped monitoring: {}", state.display_name),
            Level::Info,
        );
        Ok(())
    }

    /// Display-safe view of every registered task, keyed by `category_id`.
    pub fn status(&self) -> BTreeMap<String, TaskView> {
        self.registry
            .snapshot_all()
            .iter()
            .map(|(key, state)| (key.to_string(), TaskView::from(state)))
            .collect()
    }

    /// Full state of one task, if registered.
    pub fn task(&self, key: &TaskKey) -> Option<TaskState> {
        self.registry.get(key)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.log.snapshot()
    }

    /// Retained notifications newer than `id`.
    pub fn notifications_since(&self, id: u64) -> Vec<Notification> {
        self.log.since(id)
    }

    pub fn clear_notifications(&self) {
        self.log.clear();
    }

    /// Wait for every monitor spawned for `key` to finish, returning how the
    /// most recent one ended.
    ///
    /// # Errors
    ///
    /// [`Error::TaskNotFound`] if no monitor for `key` is being tracked,
    /// including when its result was already collected by an earlier `wait`.
    pub async fn wait(&self, key: &TaskKey) -> Result<MonitorExit> {
        let handles = self.workers().remove(key).unwrap_or_default();

        let mut last = None;
        for handle in handles {
            let exit = handle
                .await
                .map_err(|e| Error::Other(format!("monitor for {key} panicked: {e}")))?;
            last = Some(exit);
        }
        last.ok_or_else(|| Error::TaskNotFound(key.clone()))
    }

    /// Stop every monitor and wait for all of them to finish.
    ///
    /// Tasks removed here get no stop notification.
    pub async fn shutdown(&self) {
        let removed = self.registry.remove_all();
        let workers: Vec<(TaskKey, Vec<JoinHandle<MonitorExit>>)> =
            self.workers().drain().collect();
        info!(
            tasks = removed.len(),
            workers = workers.iter().map(|(_, h)| h.len()).sum::<usize>(),
            "engine shutting down"
        );

        for (key, handles) in workers {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(task = %key, "monitor did not exit cleanly: {e}");
                }
            }
        }
    }

    fn workers(&self) -> MutexGuard<'_, Workers> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drop finished handles, keeping only the newest one per key so a later
/// `wait` can still report how that key's last run ended.
fn prune_finished(workers: &mut Workers) {
    for handles in workers.values_mut() {
        let newest = handles.len().saturating_sub(1);
        let mut index = 0;
        handles.retain(|handle| {
            let keep = index == newest || !handle.is_finished();
            index += 1;
            keep
        });
    }
    workers.retain(|_, handles| !handles.is_empty());
}
