//! # heapwatch-core
//!
//! **Heap telemetry for garbage-collected runtimes.**
//!
//! `heapwatch-core` samples the heap of a running process through an abstract
//! [`HeapDataSource`], aggregates the per-isolate statistics into
//! process-wide totals, and keeps an append-only history of samples that
//! observers are notified about.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use heapwatch_core::{HeapDataSource, MemoryTracker};
//!
//! # async fn run(source: Arc<dyn HeapDataSource>) -> heapwatch_core::Result<()> {
//! let tracker = MemoryTracker::new(source);
//! let mut changes = tracker.on_change();
//! tracker.start()?;
//!
//! while changes.changed().await {
//!     let sample = tracker.latest()?;
//!     println!("{} / {} bytes", sample.used, sample.capacity);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Data source → Parser → Isolate state → Aggregator → History → Change signal
//!
//! Two paths feed the history:
//! - **Poll**: every poll interval the whole process is fetched and the isolate
//!   state is rebuilt from scratch.
//! - **GC event**: the reporting isolate's entry is replaced and everything
//!   else is kept as last seen.
//!
//! Reported capacity includes external memory (`Σ capacity + Σ external`).

pub mod aggregate;
pub mod config;
pub mod error;
pub mod history;
pub mod notify;
pub mod snapshot;
pub mod source;
pub mod tracker;

pub use aggregate::{HeapTotals, IsolateHeaps};
pub use config::TrackerConfig;
pub use error::{Error, Result};
pub use history::{HeapSample, SampleHistory, Samples};
pub use notify::{ChangeListener, ChangeNotifier};
pub use snapshot::{HeapSpaceSnapshot, RawHeapRecord, parse_generations};
pub use source::{GcEvent, GcEventStream, HeapDataSource, ProcessSnapshot, RawIsolate};
pub use tracker::{MemoryTracker, TrackerStats};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
