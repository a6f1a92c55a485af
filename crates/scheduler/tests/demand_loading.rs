use photowall_cache::MemoryCache;
use photowall_scheduler::{
    ContentSink, DemandScheduler, FetchError, FetchPipeline, IndexError, RawBytes, ScrollMode,
    TaskRegistry, TaskState, Transport, ViewportEvent,
};
use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// Transport that can hold every fetch until the test opens the gate.
struct FakeTransport {
    open: Mutex<bool>,
    gate: Condvar,
    calls: Mutex<Vec<String>>,
    fail_once: Mutex<HashSet<String>>,
}

impl FakeTransport {
    fn open() -> Self {
        Self {
            open: Mutex::new(true),
            gate: Condvar::new(),
            calls: Mutex::new(Vec::new()),
            fail_once: Mutex::new(HashSet::new()),
        }
    }

    fn gated() -> Self {
        let transport = Self::open();
        *transport.open.lock().unwrap() = false;
        transport
    }

    fn fail_once(self, url: &str) -> Self {
        self.fail_once.lock().unwrap().insert(url.to_string());
        self
    }

    fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.gate.notify_all();
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.fail_once.lock().unwrap().remove(url) {
            return Err(FetchError::Network("connection reset".into()));
        }
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.gate.wait(open).unwrap();
        }
        Ok(format!("img:{url}").into_bytes())
    }
}

#[derive(Default)]
struct RecordingSink {
    ready: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn ready(&self) -> Vec<String> {
        self.ready.lock().unwrap().clone()
    }
}

impl ContentSink<Vec<u8>> for RecordingSink {
    fn on_content_ready(&self, key: &str, _content: Arc<Vec<u8>>) {
        self.ready.lock().unwrap().push(key.to_string());
    }
}

struct Harness {
    cache: Arc<MemoryCache<Vec<u8>>>,
    registry: Arc<TaskRegistry>,
    transport: Arc<FakeTransport>,
    sink: Arc<RecordingSink>,
    scheduler: DemandScheduler<Vec<u8>>,
}

fn harness(keys: &[&str], transport: FakeTransport) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let cache = Arc::new(MemoryCache::new(1024 * 1024));
    let registry = Arc::new(TaskRegistry::new());
    let transport = Arc::new(transport);
    let sink = Arc::new(RecordingSink::default());

    let pipeline = FetchPipeline {
        cache: Arc::clone(&cache),
        registry: Arc::clone(&registry),
        transport: Arc::clone(&transport) as Arc<dyn Transport>,
        decoder: Arc::new(RawBytes),
        sink: Arc::clone(&sink) as Arc<dyn ContentSink<Vec<u8>>>,
    };
    let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    let scheduler = DemandScheduler::new(Arc::new(keys), pipeline);

    Harness {
        cache,
        registry,
        transport,
        sink,
        scheduler,
    }
}

const KEYS: [&str; 4] = ["a", "b", "c", "d"];

#[test]
fn settle_serves_hits_and_launches_only_misses() {
    let mut h = harness(&KEYS, FakeTransport::gated());
    h.cache.put("a", b"cached".to_vec());

    let report = h.scheduler.on_viewport_event(ViewportEvent::settled(0, 3));

    // the hit is delivered before any fetch can finish
    assert_eq!(h.sink.ready(), vec!["a"]);
    assert_eq!(report.hits, vec!["a"]);
    assert_eq!(report.launched_keys(), vec!["b", "c"]);
    assert_eq!(h.registry.len(), 2);

    h.transport.release();
    let outcomes = report.join_all();
    assert!(outcomes.iter().all(|(_, state)| *state == TaskState::Completed));

    assert!(h.cache.contains("b"));
    assert!(h.cache.contains("c"));
    assert!(!h.cache.contains("d"));
    assert!(!h.transport.calls().contains(&"d".to_string()));
    assert!(h.registry.is_empty());

    let mut ready = h.sink.ready();
    ready.sort();
    assert_eq!(ready, vec!["a", "b", "c"]);
}

#[test]
fn fetched_content_is_not_replaced() {
    let mut h = harness(&KEYS, FakeTransport::open());

    let report = h.scheduler.on_viewport_event(ViewportEvent::settled(1, 1));
    assert_eq!(report.join_all(), vec![("b".to_string(), TaskState::Completed)]);

    assert!(!h.cache.put("b", b"other".to_vec()));
    assert_eq!(h.cache.get("b").unwrap().as_slice(), b"img:b");
}

#[test]
fn cancel_all_discards_completions() {
    let mut h = harness(&KEYS, FakeTransport::gated());

    let report = h.scheduler.on_viewport_event(ViewportEvent::settled(0, 3));
    assert_eq!(report.launched.len(), 3);

    assert_eq!(h.scheduler.cancel_all(), 3);
    // cancellation does not remove anything by itself
    assert_eq!(h.registry.len(), 3);

    h.transport.release();
    for (_, state) in report.join_all() {
        assert_eq!(state, TaskState::Cancelled);
    }

    assert!(h.cache.is_empty());
    assert!(h.sink.ready().is_empty());
    assert!(h.registry.is_empty());
}

#[test]
fn scroll_between_settles_cancels_first_batch() {
    let mut h = harness(&KEYS, FakeTransport::gated());

    let first = h.scheduler.on_viewport_event(ViewportEvent::settled(0, 2));
    assert_eq!(first.launched_keys(), vec!["a", "b"]);

    let scroll = h.scheduler.on_viewport_event(ViewportEvent::scrolling(1, 2));
    assert_eq!(scroll.cancelled, 2);
    assert!(scroll.launched.is_empty());
    assert_eq!(h.scheduler.mode(), ScrollMode::Scrolling);

    // cancelled tasks do not block relaunching the same keys
    let second = h.scheduler.on_viewport_event(ViewportEvent::settled(0, 2));
    assert_eq!(second.launched_keys(), vec!["a", "b"]);
    assert_eq!(h.scheduler.mode(), ScrollMode::Idle);

    h.transport.release();

    for (_, state) in first.join_all() {
        assert_eq!(state, TaskState::Cancelled);
    }
    for (_, state) in second.join_all() {
        assert_eq!(state, TaskState::Completed);
    }

    let mut ready = h.sink.ready();
    ready.sort();
    assert_eq!(ready, vec!["a", "b"]);
    assert_eq!(h.cache.stats().insertions, 2);
}

#[test]
fn scrolling_launches_nothing() {
    let mut h = harness(&KEYS, FakeTransport::open());

    h.scheduler
        .on_viewport_event(ViewportEvent::settled(0, 1))
        .join_all();

    let report = h.scheduler.on_viewport_event(ViewportEvent::scrolling(1, 3));
    assert!(report.launched.is_empty());
    assert!(report.hits.is_empty());
    assert_eq!(h.transport.calls(), vec!["a"]);
}

#[test]
fn first_population_loads_exactly_once() {
    let mut h = harness(&KEYS, FakeTransport::open());

    let empty = h.scheduler.on_viewport_event(ViewportEvent::scrolling(0, 0));
    assert!(empty.is_noop());
    assert!(h.transport.calls().is_empty());

    let first = h.scheduler.on_viewport_event(ViewportEvent::scrolling(0, 2));
    assert_eq!(first.launched_keys(), vec!["a", "b"]);
    first.join_all();

    // later unsettled reports are plain scroll movement
    let again = h.scheduler.on_viewport_event(ViewportEvent::scrolling(2, 2));
    assert!(again.launched.is_empty());
    assert_eq!(h.transport.calls().len(), 2);
}

#[test]
fn empty_settle_is_a_noop() {
    let mut h = harness(&KEYS, FakeTransport::open());

    let report = h.scheduler.on_viewport_event(ViewportEvent::settled(2, 0));
    assert!(report.is_noop());
    assert!(h.registry.is_empty());
}

#[test]
fn out_of_range_index_skips_only_that_position() {
    let mut h = harness(&KEYS, FakeTransport::open());

    let report = h.scheduler.load_indices([0, 1, 2, 3, 10]);

    assert_eq!(report.index_errors, vec![IndexError { index: 10, len: 4 }]);
    assert_eq!(report.launched_keys(), vec!["a", "b", "c", "d"]);
    report.join_all();
    assert_eq!(h.cache.len(), 4);
}

#[test]
fn window_past_the_end_reports_each_bad_position() {
    let mut h = harness(&KEYS, FakeTransport::open());

    let report = h.scheduler.on_viewport_event(ViewportEvent::settled(3, 3));
    let bad: Vec<usize> = report.index_errors.iter().map(|e| e.index).collect();
    assert_eq!(bad, vec![4, 5]);
    assert_eq!(report.launched_keys(), vec!["d"]);
    report.join_all();
}

#[test]
fn live_task_suppresses_relaunch() {
    let mut h = harness(&KEYS, FakeTransport::gated());

    let first = h.scheduler.on_viewport_event(ViewportEvent::settled(0, 2));
    let second = h.scheduler.on_viewport_event(ViewportEvent::settled(0, 3));

    assert_eq!(second.deduplicated, vec!["a", "b"]);
    assert_eq!(second.launched_keys(), vec!["c"]);

    h.transport.release();
    first.join_all();
    second.join_all();
    assert_eq!(h.transport.calls().len(), 3);
}

#[test]
fn failed_fetch_is_retried_on_next_settle() {
    let mut h = harness(&KEYS, FakeTransport::open().fail_once("b"));

    let report = h.scheduler.on_viewport_event(ViewportEvent::settled(0, 2));
    let outcomes = report.join_all();
    assert!(outcomes.contains(&("a".to_string(), TaskState::Completed)));
    assert!(outcomes.contains(&("b".to_string(), TaskState::Failed)));
    assert!(!h.cache.contains("b"));
    assert_eq!(h.sink.ready(), vec!["a"]);

    let retry = h.scheduler.on_viewport_event(ViewportEvent::settled(0, 2));
    assert_eq!(retry.hits, vec!["a"]);
    assert_eq!(retry.join_all(), vec![("b".to_string(), TaskState::Completed)]);
    assert!(h.cache.contains("b"));
}

#[test]
fn event_stream_is_processed_in_order() {
    let mut h = harness(&KEYS, FakeTransport::open());
    let (tx, rx) = mpsc::channel();

    let producer = thread::spawn(move || {
        tx.send(ViewportEvent::scrolling(0, 0)).unwrap();
        tx.send(ViewportEvent::scrolling(0, 2)).unwrap();
        tx.send(ViewportEvent::scrolling(1, 2)).unwrap();
        tx.send(ViewportEvent::settled(2, 2)).unwrap();
    });

    let reports = h.scheduler.run(rx);
    producer.join().unwrap();

    assert_eq!(reports.len(), 4);
    assert!(reports[0].is_noop());
    assert_eq!(reports[1].launched_keys(), vec!["a", "b"]);
    assert!(reports[2].launched.is_empty());
    assert_eq!(h.scheduler.viewport().first_visible, 2);

    for report in reports {
        report.join_all();
    }
    assert!(h.registry.wait_idle(Duration::from_secs(5)));
    assert!(h.cache.contains("c"));
    assert!(h.cache.contains("d"));
}

#[test]
fn teardown_cancels_in_flight_tasks() {
    let mut h = harness(&KEYS, FakeTransport::gated());

    let report = h.scheduler.on_viewport_event(ViewportEvent::settled(0, 4));
    h.scheduler.on_teardown();
    h.transport.release();

    assert!(h.registry.wait_idle(Duration::from_secs(5)));
    for (_, state) in report.join_all() {
        assert_eq!(state, TaskState::Cancelled);
    }
    assert!(h.cache.is_empty());
}
