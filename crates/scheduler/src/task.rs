//! Fetch tasks
//!
//! A fetch task retrieves and decodes the content for one key on its own
//! background thread. Its lifecycle is an observable state machine:
//!
//! ```text
//! Pending -> Running -> Publishing -> Completed
//!               |
//!               +-> Cancelled | Failed
//! ```
//!
//! Cancellation wins only while the task is `Pending` or `Running`. Once the
//! task has moved to `Publishing` its result is committed and `cancel`
//! reports `false`. Terminal states are final. Whatever the outcome, the task
//! removes itself from the [`TaskRegistry`] as its last action.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use photowall_cache::MemoryCache;

use crate::cancel::CancellationToken;
use crate::error::LoadError;
use crate::registry::TaskRegistry;
use crate::source::{ContentSink, Decoder, Transport};

/// Process-unique task identity
pub type TaskId = u64;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a fetch task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
    Pending = 0,
    Running = 1,
    /// Result committed; writing the cache and signalling the sink
    Publishing = 2,
    Completed = 3,
    Cancelled = 4,
    Failed = 5,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            2 => TaskState::Publishing,
            3 => TaskState::Completed,
            4 => TaskState::Cancelled,
            _ => TaskState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed
        )
    }
}

/// Shared task record, owned by the registry while the task is in flight.
pub struct FetchTask {
    id: TaskId,
    key: String,
    token: CancellationToken,
    state: AtomicU8,
    failure: Mutex<Option<LoadError>>,
}

impl FetchTask {
    /// Create a task in `Pending`
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            key: key.into(),
            token: CancellationToken::new(),
            state: AtomicU8::new(TaskState::Pending as u8),
            failure: Mutex::new(None),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Request cancellation. Idempotent, never blocks.
    ///
    /// Returns `true` only for the call that moved the task to `Cancelled`.
    /// A task that is already publishing or finished is left alone.
    pub fn cancel(&self) -> bool {
        let cancelled = self.transition(TaskState::Running, TaskState::Cancelled)
            || self.transition(TaskState::Pending, TaskState::Cancelled);
        if cancelled {
            self.token.cancel();
        }
        cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// Error recorded when the task ended in `Failed`
    pub fn failure(&self) -> Option<LoadError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Move from `from` to `to`; refuses to leave a terminal state.
    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Record `error` and move to `Failed`, unless a cancel got there first.
    fn fail(&self, error: LoadError) -> bool {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        let failed = self.transition(TaskState::Running, TaskState::Failed);
        if failed {
            *failure = Some(error);
        }
        failed
    }
}

impl fmt::Debug for FetchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchTask")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Everything a fetch task needs to run to completion.
pub struct FetchPipeline<V> {
    pub cache: Arc<MemoryCache<V>>,
    pub registry: Arc<TaskRegistry>,
    pub transport: Arc<dyn Transport>,
    pub decoder: Arc<dyn Decoder<V>>,
    pub sink: Arc<dyn ContentSink<V>>,
}

impl<V> Clone for FetchPipeline<V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            registry: Arc::clone(&self.registry),
            transport: Arc::clone(&self.transport),
            decoder: Arc::clone(&self.decoder),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<V> fmt::Debug for FetchPipeline<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchPipeline")
            .field("cache", &self.cache)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Handle to a launched task.
pub struct TaskHandle {
    task: Arc<FetchTask>,
    thread: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.task.id
    }

    pub fn key(&self) -> &str {
        &self.task.key
    }

    /// Shared task record; stays readable after `join` consumes the handle.
    pub fn task(&self) -> &Arc<FetchTask> {
        &self.task
    }

    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    pub fn cancel(&self) -> bool {
        self.task.cancel()
    }

    pub fn failure(&self) -> Option<LoadError> {
        self.task.failure()
    }

    /// Wait for the background thread and return the terminal state.
    pub fn join(mut self) -> TaskState {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("fetch thread for {} panicked", self.task.key);
                self.task.transition(TaskState::Running, TaskState::Failed);
                self.task.transition(TaskState::Publishing, TaskState::Failed);
            }
        }
        self.task.state()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task", &self.task)
            .field("joinable", &self.thread.is_some())
            .finish()
    }
}

/// Removes the task from the registry when dropped, so removal happens last
/// even if the fetch thread unwinds.
struct Unregister<'a> {
    registry: &'a TaskRegistry,
    id: TaskId,
}

impl Drop for Unregister<'_> {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

/// Launch a fetch task for `key`.
///
/// The task is created in `Pending`, registered, moved to `Running` and then
/// handed to a dedicated background thread.
pub fn launch<V>(key: impl Into<String>, pipeline: &FetchPipeline<V>) -> TaskHandle
where
    V: Send + Sync + 'static,
{
    let task = Arc::new(FetchTask::new(key));
    pipeline.registry.register(Arc::clone(&task));
    task.transition(TaskState::Pending, TaskState::Running);

    let worker_task = Arc::clone(&task);
    let worker_pipeline = pipeline.clone();
    let spawned = thread::Builder::new()
        .name(format!("photowall-fetch-{}", task.id))
        .spawn(move || run(&worker_task, &worker_pipeline));

    match spawned {
        Ok(thread) => {
            debug!("launched task {} for {}", task.id, task.key);
            TaskHandle {
                task,
                thread: Some(thread),
            }
        }
        Err(e) => {
            warn!("could not spawn fetch thread for {}: {e}", task.key);
            task.fail(LoadError::Fetch(crate::FetchError::Network(e.to_string())));
            pipeline.registry.unregister(task.id);
            TaskHandle { task, thread: None }
        }
    }
}

fn run<V>(task: &FetchTask, pipeline: &FetchPipeline<V>) {
    let _unregister = Unregister {
        registry: &pipeline.registry,
        id: task.id,
    };

    if task.state() != TaskState::Running {
        debug!("task {} for {} cancelled before fetching", task.id, task.key);
        return;
    }

    let result = pipeline
        .transport
        .fetch(&task.key)
        .map_err(LoadError::from)
        .and_then(|bytes| pipeline.decoder.decode(&bytes).map_err(LoadError::from));

    match result {
        Ok(content) => {
            // Point of no return: a cancel from here on loses the race.
            if !task.transition(TaskState::Running, TaskState::Publishing) {
                debug!("task {} for {} cancelled, discarding result", task.id, task.key);
                return;
            }
            let content = Arc::new(content);
            pipeline.cache.put_shared(&task.key, Arc::clone(&content));
            pipeline.sink.on_content_ready(&task.key, content);
            task.transition(TaskState::Publishing, TaskState::Completed);
        }
        Err(e) => {
            if task.fail(e.clone()) {
                warn!("failed to load {}: {e}", task.key);
            } else {
                debug!("task {} for {} cancelled, dropping error: {e}", task.id, task.key);
            }
        }
    }
}
