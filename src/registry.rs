//! Task registry: the single source of truth for which tasks are active.
//!
//! Every operation is one short critical section. Nothing here is held
//! across an `.await`, and callers only ever receive copies of the state.
//! Removing an entry fires its cancellation token, so registry membership
//! and the worker's stop signal can never disagree.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::model::{TaskKey, TaskState};

struct Slot {
    state: TaskState,
    cancel: CancellationToken,
}

/// Thread-safe map from task key to task state.
#[derive(Default)]
pub struct TaskRegistry {
    slots: Mutex<HashMap<TaskKey, Slot>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `state` only if its key is absent. Returns false and leaves the
    /// registry untouched when the key is already taken.
    pub fn try_register(&self, state: TaskState, cancel: CancellationToken) -> bool {
        let mut slots = self.lock();
        if slots.contains_key(&state.key) {
            return false;
        }
        slots.insert(state.key.clone(), Slot { state, cancel });
        true
    }

    pub fn get(&self, key: &TaskKey) -> Option<TaskState> {
        self.lock().get(key).map(|slot| slot.state.clone())
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Apply `f` to the entry for `key` if it exists and belongs to `run_id`.
    ///
    /// Returns whether the mutation happened. A worker whose task was stopped,
    /// or replaced by a newer registration, gets `false` and must exit.
    pub fn update<F>(&self, key: &TaskKey, run_id: Uuid, f: F) -> bool
    where
        F: FnOnce(&mut TaskState),
    {
        match self.lock().get_mut(key) {
            Some(slot) if slot.state.run_id == run_id => {
                f(&mut slot.state);
                true
            }
            _ => false,
        }
    }

    /// Delete and return the entry for `key`, cancelling its worker.
    pub fn remove(&self, key: &TaskKey) -> Option<TaskState> {
        let slot = self.lock().remove(key)?;
        slot.cancel.cancel();
        Some(slot.state)
    }

    /// Delete and return the entry only if it still belongs to `run_id`.
    pub fn remove_run(&self, key: &TaskKey, run_id: Uuid) -> Option<TaskState> {
        let slot = {
            let mut slots = self.lock();
            if !matches!(slots.get(key), Some(slot) if slot.state.run_id == run_id) {
                return None;
            }
            slots.remove(key)?
        };
        slot.cancel.cancel();
        Some(slot.state)
    }

    /// Copy of every entry, ordered by key.
    pub fn snapshot_all(&self) -> BTreeMap<TaskKey, TaskState> {
        self.lock()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.state.clone()))
            .collect()
    }

    /// Delete every entry at once, cancelling all workers.
    pub fn remove_all(&self) -> Vec<TaskState> {
        let slots: Vec<Slot> = self.lock().drain().map(|(_, slot)| slot).collect();
        slots
            .into_iter()
            .map(|slot| {
                slot.cancel.cancel();
                slot.state
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
