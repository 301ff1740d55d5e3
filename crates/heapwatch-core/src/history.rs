//! Append-only sample history.
//!
//! The history is a copy-on-write vector: [`SampleHistory::all`] hands out a
//! cheap [`Samples`] view that shares storage with the history, and a later
//! append only copies the storage if such a view is still alive. Views never
//! see samples appended after they were taken.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One aggregated memory sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapSample {
    /// Milliseconds since the Unix epoch; non-decreasing across a history.
    pub timestamp: i64,
    /// Resident set size of the observed process.
    pub process_rss: i64,
    /// Σ capacity + Σ external across all isolates.
    pub capacity: i64,
    /// Σ used across all isolates.
    pub used: i64,
    /// Σ external across all isolates.
    pub external: i64,
    /// Whether the sample was produced by a GC notification rather than a poll.
    #[serde(rename = "isGC")]
    pub is_gc: bool,
}

/// Append-only, time-ordered sequence of [`HeapSample`]s.
#[derive(Debug, Clone, Default)]
pub struct SampleHistory {
    samples: Arc<Vec<HeapSample>>,
}

impl SampleHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample to the end.
    pub fn append(&mut self, sample: HeapSample) {
        Arc::make_mut(&mut self.samples).push(sample);
    }

    /// The most recently appended sample.
    pub fn latest(&self) -> Result<&HeapSample> {
        self.samples.last().ok_or(Error::EmptyHistory)
    }

    /// A view of every sample appended so far, oldest first.
    pub fn all(&self) -> Samples {
        Samples {
            samples: Arc::clone(&self.samples),
        }
    }

    /// Number of samples recorded.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample has been recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamp to stamp the next sample with, given the current wall clock.
    ///
    /// Clamped so the history stays non-decreasing even if the clock steps
    /// backwards.
    pub fn next_timestamp(&self, now_ms: i64) -> i64 {
        match self.samples.last() {
            Some(prev) if prev.timestamp >= now_ms => prev.timestamp,
            _ => now_ms,
        }
    }
}

/// A read-only view of a [`SampleHistory`] taken at one instant.
///
/// Iterate it as often as needed; each pass yields the same samples.
#[derive(Debug, Clone)]
pub struct Samples {
    samples: Arc<Vec<HeapSample>>,
}

impl Samples {
    /// Iterate the samples, oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, HeapSample> {
        self.samples.iter()
    }

    /// Number of samples in the view.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The view as a slice.
    pub fn as_slice(&self) -> &[HeapSample] {
        &self.samples
    }
}

impl<'a> IntoIterator for &'a Samples {
    type Item = &'a HeapSample;
    type IntoIter = std::slice::Iter<'a, HeapSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: i64, used: i64) -> HeapSample {
        HeapSample {
            timestamp,
            process_rss: 0,
            capacity: used * 2,
            used,
            external: 0,
            is_gc: false,
        }
    }

    // -----------------------------------------------------------------------
    // latest / append
    // -----------------------------------------------------------------------

    #[test]
    fn test_latest_on_empty_history() {
        let history = SampleHistory::new();
        assert!(matches!(history.latest(), Err(Error::EmptyHistory)));
    }

    #[test]
    fn test_latest_after_one_append() {
        let mut history = SampleHistory::new();
        let s = sample(1_000, 42);
        history.append(s);
        assert_eq!(history.latest().unwrap(), &s);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut history = SampleHistory::new();
        for i in 0..5 {
            history.append(sample(i, i));
        }
        let used: Vec<i64> = history.all().iter().map(|s| s.used).collect();
        assert_eq!(used, vec![0, 1, 2, 3, 4]);
        assert_eq!(history.latest().unwrap().used, 4);
    }

    // -----------------------------------------------------------------------
    // Snapshot views
    // -----------------------------------------------------------------------

    #[test]
    fn test_view_does_not_see_later_appends() {
        let mut history = SampleHistory::new();
        history.append(sample(1, 1));
        let view = history.all();
        history.append(sample(2, 2));
        history.append(sample(3, 3));
        assert_eq!(view.len(), 1);
        assert_eq!(history.len(), 3);
        assert_eq!(history.all().len(), 3);
    }

    #[test]
    fn test_view_is_restartable() {
        let mut history = SampleHistory::new();
        history.append(sample(1, 10));
        history.append(sample(2, 20));
        let view = history.all();
        let first: Vec<_> = view.iter().copied().collect();
        let second: Vec<_> = (&view).into_iter().copied().collect();
        assert_eq!(first, second);
        assert_eq!(view.as_slice(), first.as_slice());
    }

    // -----------------------------------------------------------------------
    // Timestamps
    // -----------------------------------------------------------------------

    #[test]
    fn test_next_timestamp_empty_uses_clock() {
        assert_eq!(SampleHistory::new().next_timestamp(500), 500);
    }

    #[test]
    fn test_next_timestamp_clamps_backwards_clock() {
        let mut history = SampleHistory::new();
        history.append(sample(1_000, 1));
        assert_eq!(history.next_timestamp(900), 1_000);
        assert_eq!(history.next_timestamp(1_000), 1_000);
        assert_eq!(history.next_timestamp(1_001), 1_001);
    }

    #[test]
    fn test_sample_serializes_camel_case() {
        let json = serde_json::to_value(sample(7, 3)).unwrap();
        assert_eq!(json["processRss"], 0);
        assert_eq!(json["isGC"], false);
        assert_eq!(json["timestamp"], 7);
    }
}
