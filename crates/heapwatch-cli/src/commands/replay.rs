//! `heapwatch replay`: feed a recorded trace through a tracker.
//!
//! A trace is a JSON file holding the responses successive polls should get
//! and GC events stamped with their offset from the start of the replay:
//!
//! ```json
//! {
//!   "polls": [{ "rss": 1048576, "isolates": [{ "id": "A", "generations": [...] }] }],
//!   "gcEvents": [{ "atMs": 900, "event": { "isolateId": "A", "generations": [...] } }]
//! }
//! ```
//!
//! Once the recorded polls run out every further poll fails, which the
//! tracker logs and retries like any other fetch failure.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use heapwatch_core::{Error, GcEvent, GcEventStream, HeapDataSource, ProcessSnapshot, Result};
use serde::{Deserialize, Serialize};

use super::WatchOptions;

/// A GC event scheduled relative to the start of the replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedGcEvent {
    pub at_ms: u64,
    pub event: GcEvent,
}

/// Recorded poll responses and GC events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Trace {
    pub polls: Vec<ProcessSnapshot>,
    pub gc_events: Vec<TimedGcEvent>,
}

/// Run the replay command.
pub fn run(trace: &str, opts: WatchOptions) {
    let trace = match load_trace(Path::new(trace)) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    log::info!(
        "replaying {} polls and {} GC events",
        trace.polls.len(),
        trace.gc_events.len()
    );

    super::watch(Arc::new(TraceSource::new(trace)), &opts);
}

/// Read and parse a trace file.
pub fn load_trace(path: &Path) -> std::result::Result<Trace, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read trace {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid trace {}: {e}", path.display()))
}

/// Serves a [`Trace`] as a heap data source.
pub struct TraceSource {
    polls: Mutex<VecDeque<ProcessSnapshot>>,
    gc_events: Mutex<Option<Vec<TimedGcEvent>>>,
}

impl TraceSource {
    pub fn new(trace: Trace) -> Self {
        let mut gc_events = trace.gc_events;
        gc_events.sort_by_key(|e| e.at_ms);
        Self {
            polls: Mutex::new(trace.polls.into()),
            gc_events: Mutex::new(Some(gc_events)),
        }
    }
}

#[async_trait]
impl HeapDataSource for TraceSource {
    async fn fetch_process_snapshot(&self) -> Result<ProcessSnapshot> {
        self.polls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| Error::fetch("trace exhausted"))
    }

    /// The recorded events are handed out once; later subscribers get an
    /// empty stream.
    fn subscribe_gc_events(&self) -> GcEventStream {
        let events = self
            .gc_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();
        let start = tokio::time::Instant::now();
        futures::stream::iter(events)
            .then(move |timed| async move {
                tokio::time::sleep_until(start + Duration::from_millis(timed.at_ms)).await;
                timed.event
            })
            .boxed()
    }

    fn name(&self) -> &str {
        "trace"
    }
}
