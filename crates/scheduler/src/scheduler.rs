//! Viewport-driven demand scheduler
//!
//! Consumes viewport events in arrival order. A settled viewport loads its
//! visible window: cache hits are handed to the presentation layer at once,
//! misses get a fetch task. A moving viewport cancels every in-flight task
//! and launches nothing until the view settles again.

use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::IndexError;
use crate::source::KeySequence;
use crate::task::{self, FetchPipeline, TaskHandle, TaskState};
use crate::viewport::{ScrollMode, ViewportEvent, ViewportState};

/// What one viewport event did
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Keys served straight from the cache
    pub hits: Vec<String>,

    /// Tasks launched for cache misses, in ascending index order
    pub launched: Vec<TaskHandle>,

    /// Misses skipped because a live task for the key is already in flight
    pub deduplicated: Vec<String>,

    /// Positions outside the key sequence
    pub index_errors: Vec<IndexError>,

    /// Tasks newly cancelled by this event
    pub cancelled: usize,
}

impl LoadReport {
    pub fn launched_keys(&self) -> Vec<&str> {
        self.launched.iter().map(TaskHandle::key).collect()
    }

    /// Whether this event neither served nor launched anything
    pub fn is_noop(&self) -> bool {
        self.hits.is_empty()
            && self.launched.is_empty()
            && self.deduplicated.is_empty()
            && self.index_errors.is_empty()
            && self.cancelled == 0
    }

    /// Wait for every launched task; returns `(key, terminal state)` pairs.
    pub fn join_all(self) -> Vec<(String, TaskState)> {
        self.launched
            .into_iter()
            .map(|handle| {
                let key = handle.key().to_owned();
                (key, handle.join())
            })
            .collect()
    }
}

/// Demand-loading policy over a fixed key sequence
///
/// # Example
///
/// ```
/// use photowall_cache::MemoryCache;
/// use photowall_scheduler::{
///     DemandScheduler, FetchError, FetchPipeline, TaskRegistry, ViewportEvent,
/// };
/// use std::sync::Arc;
///
/// let keys = vec!["a", "b", "c"];
/// let pipeline = FetchPipeline {
///     cache: Arc::new(MemoryCache::<Vec<u8>>::new(1024)),
///     registry: Arc::new(TaskRegistry::new()),
///     transport: Arc::new(|url: &str| -> Result<Vec<u8>, FetchError> {
///         Ok(url.as_bytes().to_vec())
///     }),
///     decoder: Arc::new(photowall_scheduler::RawBytes),
///     sink: Arc::new(|key: &str, _content: Arc<Vec<u8>>| println!("ready: {key}")),
/// };
///
/// let mut scheduler = DemandScheduler::new(Arc::new(keys), pipeline);
/// let report = scheduler.on_viewport_event(ViewportEvent::scrolling(0, 2));
/// assert_eq!(report.launched_keys(), vec!["a", "b"]); // first population
/// report.join_all();
/// ```
pub struct DemandScheduler<V> {
    keys: Arc<dyn KeySequence>,
    pipeline: FetchPipeline<V>,
    viewport: ViewportState,
    mode: ScrollMode,
    activated: bool,
}

impl<V> DemandScheduler<V>
where
    V: Send + Sync + 'static,
{
    pub fn new(keys: Arc<dyn KeySequence>, pipeline: FetchPipeline<V>) -> Self {
        Self {
            keys,
            pipeline,
            viewport: ViewportState::default(),
            mode: ScrollMode::Idle,
            activated: false,
        }
    }

    pub fn viewport(&self) -> ViewportState {
        self.viewport
    }

    pub fn mode(&self) -> ScrollMode {
        self.mode
    }

    pub fn pipeline(&self) -> &FetchPipeline<V> {
        &self.pipeline
    }

    /// Apply one viewport report.
    ///
    /// The first report with a non-empty window counts as a settle even
    /// without the settled flag, once per scheduler lifetime; the viewport
    /// source does not report a transition for the initial layout.
    pub fn on_viewport_event(&mut self, event: ViewportEvent) -> LoadReport {
        self.viewport = event.state();

        if !self.activated && !self.viewport.is_empty() {
            self.activated = true;
            self.mode = ScrollMode::Idle;
            debug!("first population of the viewport: {:?}", self.viewport);
            return self.load_window(self.viewport);
        }

        if event.settled {
            self.mode = ScrollMode::Idle;
            self.load_window(self.viewport)
        } else {
            self.mode = ScrollMode::Scrolling;
            let cancelled = self.pipeline.registry.cancel_all();
            if cancelled > 0 {
                info!("viewport moving, cancelled {cancelled} fetches");
            }
            LoadReport {
                cancelled,
                ..Default::default()
            }
        }
    }

    /// Load every position of `window` in ascending order
    pub fn load_window(&mut self, window: ViewportState) -> LoadReport {
        if window.is_empty() {
            return LoadReport::default();
        }
        self.load_indices(window.indices())
    }

    /// Load an explicit list of positions, in the order given.
    ///
    /// Out-of-range positions are recorded as [`IndexError`] and skipped; the
    /// remaining positions are still processed.
    pub fn load_indices<I>(&mut self, indices: I) -> LoadReport
    where
        I: IntoIterator<Item = usize>,
    {
        let mut report = LoadReport::default();
        let len = self.keys.len();

        for index in indices {
            let Some(key) = self.keys.key_at(index) else {
                let error = IndexError { index, len };
                warn!("skipping position: {error}");
                report.index_errors.push(error);
                continue;
            };

            if let Some(content) = self.pipeline.cache.get(key) {
                self.pipeline.sink.on_content_ready(key, content);
                report.hits.push(key.to_owned());
            } else if self.pipeline.registry.has_live_task(key) {
                debug!("{key} already in flight");
                report.deduplicated.push(key.to_owned());
            } else {
                report.launched.push(task::launch(key, &self.pipeline));
            }
        }

        info!(
            "viewport load: {} hits, {} launched, {} in flight, {} bad positions",
            report.hits.len(),
            report.launched.len(),
            report.deduplicated.len(),
            report.index_errors.len()
        );
        report
    }

    /// Cancel every in-flight task without waiting for it
    pub fn cancel_all(&self) -> usize {
        self.pipeline.registry.cancel_all()
    }

    /// Application teardown: cancel everything that is still in flight.
    pub fn on_teardown(&self) {
        let cancelled = self.cancel_all();
        info!("teardown cancelled {cancelled} fetches");
    }

    /// Process viewport events from `events` in order until the sender hangs
    /// up. Returns the report of every event.
    pub fn run(&mut self, events: Receiver<ViewportEvent>) -> Vec<LoadReport> {
        let mut reports = Vec::new();
        for event in events {
            reports.push(self.on_viewport_event(event));
        }
        debug!("viewport event stream closed after {} events", reports.len());
        reports
    }
}

impl<V> fmt::Debug for DemandScheduler<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemandScheduler")
            .field("keys", &self.keys.len())
            .field("viewport", &self.viewport)
            .field("mode", &self.mode)
            .field("activated", &self.activated)
            .finish_non_exhaustive()
    }
}
