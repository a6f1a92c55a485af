//! Registry of in-flight fetch tasks
//!
//! The scheduler registers a task when it launches it; the task unregisters
//! itself when it finishes. `cancel_all` flags every registered task without
//! waiting for it and without removing it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::task::{FetchTask, TaskId};

/// Thread-safe set of in-flight tasks keyed by task identity
///
/// # Example
///
/// ```
/// use photowall_scheduler::{FetchTask, TaskRegistry};
/// use std::sync::Arc;
///
/// let registry = TaskRegistry::new();
/// let task = Arc::new(FetchTask::new("https://img.example/a.jpg"));
/// registry.register(Arc::clone(&task));
///
/// assert_eq!(registry.cancel_all(), 1);
/// assert!(task.is_cancelled());
///
/// // cancel_all leaves removal to the task itself
/// assert_eq!(registry.len(), 1);
/// registry.unregister(task.id());
/// assert!(registry.is_empty());
/// ```
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, Arc<FetchTask>>>,
    idle: Condvar,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, Arc<FetchTask>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a task to the registry
    pub fn register(&self, task: Arc<FetchTask>) {
        self.lock().insert(task.id(), task);
    }

    /// Remove a task. Returns `true` if it was registered.
    pub fn unregister(&self, id: TaskId) -> bool {
        let mut tasks = self.lock();
        let removed = tasks.remove(&id).is_some();
        if tasks.is_empty() {
            self.idle.notify_all();
        }
        removed
    }

    /// Cancel a single task by identity
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.lock().get(&id) {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every registered task.
    ///
    /// Does not wait for the tasks to stop and does not remove them. Returns
    /// the number of tasks this call newly cancelled.
    pub fn cancel_all(&self) -> usize {
        self.lock().values().filter(|task| task.cancel()).count()
    }

    /// Whether a task for `key` is registered and has not been cancelled
    pub fn has_live_task(&self, key: &str) -> bool {
        self.lock()
            .values()
            .any(|task| task.key() == key && !task.is_cancelled())
    }

    /// Snapshot of registered tasks
    pub fn tasks(&self) -> Vec<Arc<FetchTask>> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Block until every task has unregistered or `timeout` elapses.
    ///
    /// Returns `true` if the registry drained in time.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut tasks = self.lock();
        while !tasks.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tasks = self
                .idle
                .wait_timeout(tasks, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("in_flight", &self.len())
            .finish()
    }
}
