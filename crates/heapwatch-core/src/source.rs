//! Abstract heap data source.
//!
//! Every observed runtime is reached through the [`HeapDataSource`] trait: a
//! request/response fetch of the whole process, plus an unbounded stream of
//! GC notifications. The transport behind it (websocket, pipe, in-process
//! simulation) is the implementor's business.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::snapshot::RawHeapRecord;

/// Raw heap statistics for one isolate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIsolate {
    /// Identifier, unique among live isolates.
    pub id: String,
    /// One raw record per generation.
    pub generations: Vec<RawHeapRecord>,
}

/// Everything a poll fetches in one round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    /// Resident set size of the process in bytes.
    pub rss: i64,
    /// Every live isolate.
    pub isolates: Vec<RawIsolate>,
}

/// A GC notification for a single isolate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcEvent {
    /// The isolate that collected.
    pub isolate_id: String,
    /// Its generations after the collection.
    pub generations: Vec<RawHeapRecord>,
}

/// Stream of GC notifications, consumed until the tracker stops.
pub type GcEventStream = BoxStream<'static, GcEvent>;

/// Trait that every heap data source must implement.
#[async_trait]
pub trait HeapDataSource: Send + Sync {
    /// Fetch RSS and the heap statistics of every isolate.
    ///
    /// Connectivity problems are reported as
    /// [`Error::DataSourceFetch`](crate::Error::DataSourceFetch).
    async fn fetch_process_snapshot(&self) -> Result<ProcessSnapshot>;

    /// Subscribe to GC notifications.
    fn subscribe_gc_events(&self) -> GcEventStream;

    /// Short label for log lines.
    fn name(&self) -> &str {
        "heap-source"
    }
}
