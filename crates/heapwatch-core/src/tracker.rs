//! Memory tracker: polling loop, GC reaction path, and sample production.
//!
//! Architecture:
//! 1. `start()` spawns a poll task and a GC task on the current tokio runtime
//! 2. The poll task sleeps the initial delay, then fetches, commits and sleeps
//!    the poll interval, for as long as the tracker is connected
//! 3. The GC task commits one sample per GC notification
//! 4. Both tasks commit through one mutex, so isolate state, heap max and
//!    history only ever change together and in commit order
//! 5. `stop()` cancels both tasks and drops the connection; a result that is
//!    still in flight finds the connection gone at commit time and is discarded

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregate::IsolateHeaps;
use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::history::{HeapSample, SampleHistory, Samples};
use crate::notify::{ChangeListener, ChangeNotifier};
use crate::snapshot::parse_generations;
use crate::source::{GcEvent, GcEventStream, HeapDataSource, ProcessSnapshot};

/// Counters describing what a tracker has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    /// Poll cycles that committed a sample.
    pub polls: u64,
    /// Poll cycles whose fetch failed.
    pub poll_failures: u64,
    /// GC notifications that committed a sample.
    pub gc_events: u64,
    /// Raw generation records skipped because they did not parse.
    pub malformed_records: u64,
    /// Samples appended to the history.
    pub samples: u64,
}

/// Samples a process's heap through a [`HeapDataSource`].
///
/// Construct one per connection. Once stopped, a tracker cannot be restarted;
/// create a new one with a fresh connection instead.
pub struct MemoryTracker {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    id: Uuid,
    config: TrackerConfig,
    cancel: CancellationToken,
    changes: ChangeNotifier,
    state: Mutex<TrackerState>,
}

struct TrackerState {
    source: Option<Arc<dyn HeapDataSource>>,
    running: bool,
    isolates: IsolateHeaps,
    heap_max: i64,
    process_rss: i64,
    history: SampleHistory,
    stats: TrackerStats,
}

impl MemoryTracker {
    /// Create a stopped tracker with the default configuration.
    pub fn new(source: Arc<dyn HeapDataSource>) -> Self {
        Self::with_config(source, TrackerConfig::default())
    }

    /// Create a stopped tracker.
    pub fn with_config(source: Arc<dyn HeapDataSource>, config: TrackerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                config,
                cancel: CancellationToken::new(),
                changes: ChangeNotifier::new(),
                state: Mutex::new(TrackerState {
                    source: Some(source),
                    running: false,
                    isolates: IsolateHeaps::new(),
                    heap_max: 0,
                    process_rss: 0,
                    history: SampleHistory::new(),
                    stats: TrackerStats::default(),
                }),
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start polling and listening for GC events.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`Error::NotConnected`] on a tracker that was already stopped; a
    /// second call on a running tracker does nothing.
    pub fn start(&self) -> Result<()> {
        let source = {
            let mut state = self.inner.lock();
            let source = state.source.clone().ok_or(Error::NotConnected)?;
            if state.running {
                debug!("tracker {}: already running", self.inner.id);
                return Ok(());
            }
            state.running = true;
            source
        };

        info!(
            "tracker {}: starting on '{}' (first poll in {:?}, then every {:?})",
            self.inner.id,
            source.name(),
            self.inner.config.initial_delay,
            self.inner.config.poll_interval
        );

        let gc_events = source.subscribe_gc_events();
        let poll = tokio::spawn(poll_loop(Arc::clone(&self.inner)));
        let gc = tokio::spawn(gc_loop(Arc::clone(&self.inner), gc_events));
        lock_ignoring_poison(&self.tasks).extend([poll, gc]);
        Ok(())
    }

    /// Stop polling and drop the data-source connection. Idempotent.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
        let released = {
            let mut state = self.inner.lock();
            state.running = false;
            state.source.take().is_some()
        };
        for task in lock_ignoring_poison(&self.tasks).drain(..) {
            task.abort();
        }
        if released {
            info!(
                "tracker {}: stopped after {} samples",
                self.inner.id,
                self.sample_count()
            );
        }
    }

    /// Subscribe to change notifications; one arrives per appended sample.
    pub fn on_change(&self) -> ChangeListener {
        self.inner.changes.subscribe()
    }

    /// The most recent sample.
    pub fn latest(&self) -> Result<HeapSample> {
        self.inner.lock().history.latest().copied()
    }

    /// Every sample recorded so far, oldest first.
    pub fn all(&self) -> Samples {
        self.inner.lock().history.all()
    }

    /// Process heap ceiling from the most recent aggregation.
    pub fn heap_max(&self) -> i64 {
        self.inner.lock().heap_max
    }

    /// Whether the tracker still holds its data-source connection.
    pub fn has_connection(&self) -> bool {
        self.inner.lock().source.is_some()
    }

    /// Whether `start()` has been called and `stop()` has not.
    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// RSS reported by the most recent successful poll.
    pub fn process_rss(&self) -> i64 {
        self.inner.lock().process_rss
    }

    /// Used bytes of the most recent sample.
    pub fn used(&self) -> Result<i64> {
        self.latest().map(|s| s.used)
    }

    /// Capacity (including external) of the most recent sample.
    pub fn capacity(&self) -> Result<i64> {
        self.latest().map(|s| s.capacity)
    }

    /// External bytes of the most recent sample.
    pub fn external(&self) -> Result<i64> {
        self.latest().map(|s| s.external)
    }

    /// Copy of the per-isolate state the next aggregation would start from.
    pub fn isolate_heaps(&self) -> IsolateHeaps {
        self.inner.lock().isolates.clone()
    }

    /// Number of samples recorded.
    pub fn sample_count(&self) -> usize {
        self.inner.lock().history.len()
    }

    /// Counters for polls, failures, GC events and skipped records.
    pub fn stats(&self) -> TrackerStats {
        self.inner.lock().stats
    }

    /// Identifier used in this tracker's log lines.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The configuration the tracker was built with.
    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }
}

impl Drop for MemoryTracker {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl std::fmt::Debug for MemoryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTracker")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .field("has_connection", &self.has_connection())
            .field("samples", &self.sample_count())
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        lock_ignoring_poison(&self.state)
    }

    fn connection(&self) -> Option<Arc<dyn HeapDataSource>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.lock().source.clone()
    }

    /// Rebuild the isolate state from a fresh fetch and record a sample.
    fn commit_poll(&self, snapshot: ProcessSnapshot) {
        let ProcessSnapshot { rss, isolates } = snapshot;

        let mut malformed = 0u64;
        let mut parsed = Vec::with_capacity(isolates.len());
        for isolate in isolates {
            let (generations, errors) = parse_generations(&isolate.generations);
            for e in &errors {
                warn!(
                    "tracker {}: skipping generation of isolate '{}' in poll: {e}",
                    self.id, isolate.id
                );
            }
            malformed += errors.len() as u64;
            parsed.push((isolate.id, generations));
        }

        let sample = {
            let mut state = self.lock();
            if state.source.is_none() {
                debug!("tracker {}: discarding poll result after stop", self.id);
                return;
            }
            state.stats.malformed_records += malformed;
            state.isolates.replace_all(parsed);
            state.process_rss = rss;
            state.stats.polls += 1;
            state.record(false, unix_ms_now())
        };

        debug!("tracker {}: poll sample {sample:?}", self.id);
        self.changes.notify();
    }

    fn record_poll_failure(&self, err: &Error) {
        self.lock().stats.poll_failures += 1;
        warn!("tracker {}: poll skipped: {err}", self.id);
    }

    /// Replace the reporting isolate's state and record a sample.
    fn handle_gc_event(&self, event: GcEvent) {
        let GcEvent {
            isolate_id,
            generations,
        } = event;

        let (parsed, errors) = parse_generations(&generations);
        for e in &errors {
            warn!(
                "tracker {}: skipping generation of isolate '{isolate_id}' in GC event: {e}",
                self.id
            );
        }

        let sample = {
            let mut state = self.lock();
            if state.source.is_none() {
                return;
            }
            state.stats.malformed_records += errors.len() as u64;
            if parsed.is_empty() && !generations.is_empty() {
                // Nothing usable; keep the last known state for this isolate.
                return;
            }
            state.isolates.replace_isolate(isolate_id, parsed);
            state.stats.gc_events += 1;
            state.record(true, unix_ms_now())
        };

        debug!("tracker {}: GC sample {sample:?}", self.id);
        self.changes.notify();
    }
}

impl TrackerState {
    /// Aggregate the current isolate state and append the result.
    fn record(&mut self, is_gc: bool, now_ms: i64) -> HeapSample {
        let totals = self.isolates.aggregate();
        self.heap_max = totals.heap_max;

        let sample = HeapSample {
            timestamp: self.history.next_timestamp(now_ms),
            process_rss: self.process_rss,
            capacity: totals.capacity,
            used: totals.used,
            external: totals.external,
            is_gc,
        };
        self.history.append(sample);
        self.stats.samples += 1;
        sample
    }
}

async fn poll_loop(inner: Arc<Inner>) {
    tokio::select! {
        () = inner.cancel.cancelled() => return,
        () = tokio::time::sleep(inner.config.initial_delay) => {}
    }

    loop {
        let Some(source) = inner.connection() else {
            return;
        };

        let fetched = tokio::select! {
            () = inner.cancel.cancelled() => return,
            res = source.fetch_process_snapshot() => res,
        };

        match fetched {
            Ok(snapshot) => inner.commit_poll(snapshot),
            Err(e) => inner.record_poll_failure(&e),
        }

        tokio::select! {
            () = inner.cancel.cancelled() => return,
            () = tokio::time::sleep(inner.config.poll_interval) => {}
        }
    }
}

async fn gc_loop(inner: Arc<Inner>, mut events: GcEventStream) {
    loop {
        let event = tokio::select! {
            () = inner.cancel.cancelled() => return,
            event = events.next() => event,
        };

        match event {
            Some(event) => inner.handle_gc_event(event),
            None => {
                info!("tracker {}: GC event stream ended", inner.id);
                return;
            }
        }
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unix_ms_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::channel::mpsc;
    use serde_json::json;

    use super::*;
    use crate::source::RawIsolate;

    // -----------------------------------------------------------------------
    // Mock data source for testing
    // -----------------------------------------------------------------------

    /// Serves queued poll responses in order, then fails every further fetch.
    struct MockSource {
        responses: Mutex<VecDeque<Result<ProcessSnapshot>>>,
        gc_rx: Mutex<Option<mpsc::UnboundedReceiver<GcEvent>>>,
        fetches: AtomicUsize,
    }

    impl MockSource {
        fn new(responses: Vec<Result<ProcessSnapshot>>) -> (Arc<Self>, mpsc::UnboundedSender<GcEvent>) {
            let (tx, rx) = mpsc::unbounded();
            let source = Arc::new(Self {
                responses: Mutex::new(responses.into()),
                gc_rx: Mutex::new(Some(rx)),
                fetches: AtomicUsize::new(0),
            });
            (source, tx)
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HeapDataSource for MockSource {
        async fn fetch_process_snapshot(&self) -> Result<ProcessSnapshot> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::fetch("no more responses")))
        }

        fn subscribe_gc_events(&self) -> GcEventStream {
            match self.gc_rx.lock().unwrap().take() {
                Some(rx) => rx.boxed(),
                None => futures::stream::empty().boxed(),
            }
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn process(rss: i64, isolates: &[(&str, i64, i64, i64)]) -> ProcessSnapshot {
        ProcessSnapshot {
            rss,
            isolates: isolates
                .iter()
                .map(|&(id, used, capacity, external)| RawIsolate {
                    id: id.to_string(),
                    generations: vec![
                        json!({"used": used, "capacity": capacity, "external": external}),
                    ],
                })
                .collect(),
        }
    }

    fn gc(isolate: &str, used: i64, capacity: i64, external: i64) -> GcEvent {
        GcEvent {
            isolate_id: isolate.to_string(),
            generations: vec![json!({"used": used, "capacity": capacity, "external": external})],
        }
    }

    // -----------------------------------------------------------------------
    // Direct commit path
    // -----------------------------------------------------------------------

    #[test]
    fn test_new_tracker_is_connected_and_empty() {
        let (source, _gc) = MockSource::new(vec![]);
        let tracker = MemoryTracker::new(source);
        assert!(tracker.has_connection());
        assert!(!tracker.is_running());
        assert_eq!(tracker.sample_count(), 0);
        assert!(matches!(tracker.latest(), Err(Error::EmptyHistory)));
        assert!(matches!(tracker.used(), Err(Error::EmptyHistory)));
        assert!(matches!(tracker.capacity(), Err(Error::EmptyHistory)));
        assert!(matches!(tracker.external(), Err(Error::EmptyHistory)));
    }

    #[test]
    fn test_poll_then_gc_scenario() {
        let (source, _gc) = MockSource::new(vec![]);
        let tracker = MemoryTracker::new(source);

        tracker.inner.commit_poll(process(4096, &[("main", 100, 200, 10)]));
        let first = tracker.latest().unwrap();
        assert_eq!(
            (first.used, first.capacity, first.external, first.is_gc),
            (100, 210, 10, false)
        );
        assert_eq!(first.process_rss, 4096);
        assert_eq!(tracker.heap_max(), 210);

        tracker.inner.handle_gc_event(gc("main", 50, 150, 5));
        let second = tracker.latest().unwrap();
        assert_eq!(
            (second.used, second.capacity, second.external, second.is_gc),
            (50, 155, 5, true)
        );
        assert_eq!(second.process_rss, 4096);
        assert_eq!(tracker.heap_max(), 155);
        assert!(second.timestamp >= first.timestamp);
    }

    #[test]
    fn test_gc_event_only_touches_reporting_isolate() {
        let (source, _gc) = MockSource::new(vec![]);
        let tracker = MemoryTracker::new(source);
        tracker
            .inner
            .commit_poll(process(0, &[("A", 10, 20, 0), ("B", 5, 15, 0)]));
        let sample = tracker.latest().unwrap();
        assert_eq!((sample.used, sample.capacity, sample.external), (15, 35, 0));

        let before = tracker.isolate_heaps();
        tracker.inner.handle_gc_event(gc("A", 1, 20, 0));
        let after = tracker.isolate_heaps();

        assert_eq!(before.get("B"), after.get("B"));
        assert_ne!(before.get("A"), after.get("A"));
        assert_eq!(tracker.latest().unwrap().used, 6);
    }

    #[test]
    fn test_poll_replaces_all_isolates() {
        let (source, _gc) = MockSource::new(vec![]);
        let tracker = MemoryTracker::new(source);
        tracker.inner.commit_poll(process(0, &[("gone", 1, 1, 1)]));
        tracker.inner.commit_poll(process(0, &[("kept", 2, 4, 0)]));
        let heaps = tracker.isolate_heaps();
        assert!(heaps.get("gone").is_none());
        assert_eq!(heaps.len(), 1);
        assert_eq!(tracker.heap_max(), 4);
    }

    #[test]
    fn test_malformed_generation_skipped_rest_aggregated() {
        let (source, _gc) = MockSource::new(vec![]);
        let tracker = MemoryTracker::new(source);
        tracker.inner.handle_gc_event(GcEvent {
            isolate_id: "main".to_string(),
            generations: vec![
                json!({"used": 10, "capacity": 20, "external": 2}),
                json!({"used": "bogus"}),
            ],
        });
        let sample = tracker.latest().unwrap();
        assert_eq!((sample.used, sample.capacity, sample.external), (10, 22, 2));
        assert_eq!(tracker.stats().malformed_records, 1);
        assert_eq!(tracker.stats().gc_events, 1);
    }

    #[test]
    fn test_fully_malformed_gc_event_keeps_previous_state() {
        let (source, _gc) = MockSource::new(vec![]);
        let tracker = MemoryTracker::new(source);
        tracker.inner.commit_poll(process(0, &[("main", 10, 20, 0)]));
        tracker.inner.handle_gc_event(GcEvent {
            isolate_id: "main".to_string(),
            generations: vec![json!(null)],
        });
        assert_eq!(tracker.sample_count(), 1);
        assert_eq!(tracker.heap_max(), 20);
        assert_eq!(tracker.stats().malformed_records, 1);
    }

    #[test]
    fn test_results_after_stop_are_discarded() {
        let (source, _gc) = MockSource::new(vec![]);
        let tracker = MemoryTracker::new(source);
        tracker.stop();
        tracker.inner.commit_poll(process(0, &[("main", 1, 2, 0)]));
        tracker.inner.handle_gc_event(gc("main", 1, 2, 0));
        assert_eq!(tracker.sample_count(), 0);
        assert_eq!(tracker.heap_max(), 0);
    }

    #[test]
    fn test_discarded_results_leave_stats_untouched() {
        let (source, _gc) = MockSource::new(vec![]);
        let tracker = MemoryTracker::new(source);
        tracker.stop();
        tracker.inner.commit_poll(ProcessSnapshot {
            rss: 0,
            isolates: vec![RawIsolate {
                id: "main".to_string(),
                generations: vec![json!({"used": "bogus"})],
            }],
        });
        tracker.inner.handle_gc_event(GcEvent {
            isolate_id: "main".to_string(),
            generations: vec![json!(null)],
        });
        assert_eq!(tracker.stats(), TrackerStats::default());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (source, _gc) = MockSource::new(vec![]);
        let tracker = MemoryTracker::new(source);
        tracker.stop();
        tracker.stop();
        assert!(!tracker.has_connection());
        assert!(matches!(tracker.start(), Err(Error::NotConnected)));
    }

    // -----------------------------------------------------------------------
    // Timer-driven behaviour
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_after_initial_delay() {
        let (source, _gc) = MockSource::new(vec![Ok(process(1, &[("main", 1, 2, 0)]))]);
        let tracker = MemoryTracker::with_config(source.clone(), TrackerConfig::default());
        let mut changes = tracker.on_change();
        let started = tokio::time::Instant::now();

        tracker.start().unwrap();
        assert!(tracker.is_running());
        assert!(changes.changed().await);

        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(tracker.sample_count(), 1);
        assert_eq!(source.fetches(), 1);
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_repeat_at_interval() {
        let responses = (0..3)
            .map(|i| Ok(process(i, &[("main", i, 10, 0)])))
            .collect();
        let (source, _gc) = MockSource::new(responses);
        let tracker = MemoryTracker::with_config(source, TrackerConfig::default());
        let mut changes = tracker.on_change();

        tracker.start().unwrap();
        let started = tokio::time::Instant::now();
        for _ in 0..3 {
            assert!(changes.changed().await);
        }

        assert!(started.elapsed() >= Duration::from_millis(500 + 2 * 200));
        let rss: Vec<i64> = tracker.all().iter().map(|s| s.process_rss).collect();
        assert_eq!(rss, vec![0, 1, 2]);
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_does_not_double_polling() {
        let responses = (0..100).map(|_| Ok(process(1, &[("main", 1, 2, 0)]))).collect();
        let (source, _gc) = MockSource::new(responses);
        let tracker = MemoryTracker::with_config(source.clone(), TrackerConfig::default());

        tracker.start().unwrap();
        tracker.start().unwrap();
        // Polls at 500, 700 and 900 ms.
        tokio::time::sleep(Duration::from_millis(950)).await;

        assert_eq!(source.fetches(), 3);
        assert_eq!(tracker.sample_count(), 3);
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_listener_sees_every_sample() {
        let responses = (0..5).map(|i| Ok(process(i, &[("main", 1, 2, 0)]))).collect();
        let (source, gc_tx) = MockSource::new(responses);
        let tracker = MemoryTracker::with_config(source, TrackerConfig::default());
        let mut idle = tracker.on_change();

        tracker.start().unwrap();
        for _ in 0..3 {
            gc_tx.unbounded_send(gc("main", 0, 2, 0)).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        tracker.stop();

        let mut wakeups = 0;
        while idle.try_changed() {
            wakeups += 1;
        }
        assert_eq!(tracker.sample_count(), 8);
        assert_eq!(wakeups, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_does_not_stop_polling() {
        let (source, _gc) = MockSource::new(vec![
            Err(Error::fetch("socket closed")),
            Ok(process(7, &[("main", 3, 6, 0)])),
        ]);
        let tracker = MemoryTracker::with_config(source.clone(), TrackerConfig::default());
        let mut changes = tracker.on_change();

        tracker.start().unwrap();
        assert!(changes.changed().await);

        assert_eq!(source.fetches(), 2);
        assert_eq!(tracker.sample_count(), 1);
        let stats = tracker.stats();
        assert_eq!(stats.poll_failures, 1);
        assert_eq!(stats.polls, 1);
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gc_events_flow_through_subscription() {
        let (source, gc_tx) = MockSource::new(vec![Ok(process(1, &[("main", 100, 200, 10)]))]);
        let tracker = MemoryTracker::with_config(source, TrackerConfig::default());
        let mut changes = tracker.on_change();

        tracker.start().unwrap();
        assert!(changes.changed().await);
        gc_tx.unbounded_send(gc("main", 50, 150, 5)).unwrap();
        assert!(changes.changed().await);

        let latest = tracker.latest().unwrap();
        assert!(latest.is_gc);
        assert_eq!(latest.capacity, 155);
        assert_eq!(tracker.heap_max(), 155);
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_samples_after_stop() {
        let responses = (0..100).map(|_| Ok(process(1, &[("main", 1, 2, 0)]))).collect();
        let (source, gc_tx) = MockSource::new(responses);
        let tracker = MemoryTracker::with_config(source.clone(), TrackerConfig::default());
        let mut changes = tracker.on_change();

        tracker.start().unwrap();
        assert!(changes.changed().await);
        tracker.stop();
        let count = tracker.sample_count();
        let fetches = source.fetches();

        let _ = gc_tx.unbounded_send(gc("main", 0, 1, 0));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(tracker.sample_count(), count);
        assert_eq!(source.fetches(), fetches);
        assert!(!tracker.is_running());
        assert!(!tracker.has_connection());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamps_non_decreasing() {
        let responses = (0..5)
            .map(|i| Ok(process(i, &[("a", i, 10, 1), ("b", 1, 4, 0)])))
            .collect();
        let (source, gc_tx) = MockSource::new(responses);
        let tracker = MemoryTracker::with_config(source, TrackerConfig::default());
        let mut changes = tracker.on_change();

        tracker.start().unwrap();
        for i in 0..5 {
            gc_tx.unbounded_send(gc("b", i, 4, 0)).unwrap();
            assert!(changes.changed().await);
            assert!(changes.changed().await);
        }

        let all = tracker.all();
        assert_eq!(all.len(), 10);
        assert!(all.as_slice().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        tracker.stop();
    }
}
