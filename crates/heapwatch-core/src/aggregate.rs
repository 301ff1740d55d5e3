//! Cross-isolate aggregation.
//!
//! Architecture:
//! 1. A poll replaces the whole [`IsolateHeaps`] map with freshly parsed data
//! 2. A GC event replaces the entry of the one isolate that collected
//! 3. [`IsolateHeaps::aggregate`] folds whatever is currently known into
//!    process-wide [`HeapTotals`]
//!
//! External memory is folded into the reported capacity:
//! `capacity = Σ capacity + Σ external`.

use std::collections::BTreeMap;

use crate::snapshot::HeapSpaceSnapshot;

/// Process-wide totals computed from the current isolate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapTotals {
    /// Σ used over every generation of every isolate.
    pub used: i64,
    /// Σ capacity plus Σ external.
    pub capacity: i64,
    /// Σ external over every generation of every isolate.
    pub external: i64,
    /// Σ (capacity + external) per isolate; the process heap ceiling.
    pub heap_max: i64,
}

/// Last known heap state per isolate, keyed by isolate id.
///
/// Each entry holds one snapshot per generation in the order the data source
/// reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsolateHeaps {
    isolates: BTreeMap<String, Vec<HeapSpaceSnapshot>>,
}

impl IsolateHeaps {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every entry with `isolates`. Isolates absent from the new set
    /// are forgotten.
    pub fn replace_all<I>(&mut self, isolates: I)
    where
        I: IntoIterator<Item = (String, Vec<HeapSpaceSnapshot>)>,
    {
        self.isolates = isolates.into_iter().collect();
    }

    /// Replace the entry for a single isolate, leaving all others untouched.
    pub fn replace_isolate(&mut self, id: impl Into<String>, generations: Vec<HeapSpaceSnapshot>) {
        self.isolates.insert(id.into(), generations);
    }

    /// Generations currently recorded for `id`.
    pub fn get(&self, id: &str) -> Option<&[HeapSpaceSnapshot]> {
        self.isolates.get(id).map(Vec::as_slice)
    }

    /// Number of isolates with a recorded state.
    pub fn len(&self) -> usize {
        self.isolates.len()
    }

    /// Whether no isolate has been recorded.
    pub fn is_empty(&self) -> bool {
        self.isolates.is_empty()
    }

    /// Iterate isolates in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[HeapSpaceSnapshot])> {
        self.isolates
            .iter()
            .map(|(id, gens)| (id.as_str(), gens.as_slice()))
    }

    /// Fold the current state into process-wide totals.
    ///
    /// Pure: calling it twice on unchanged state yields identical totals.
    /// Every sum clamps at `i64::MAX` instead of wrapping.
    pub fn aggregate(&self) -> HeapTotals {
        let mut used = 0i64;
        let mut raw_capacity = 0i64;
        let mut external = 0i64;
        let mut heap_max = 0i64;

        for generations in self.isolates.values() {
            let mut isolate_capacity = 0i64;
            let mut isolate_external = 0i64;
            for snap in generations {
                used = used.saturating_add(snap.used);
                isolate_capacity = isolate_capacity.saturating_add(snap.capacity);
                isolate_external = isolate_external.saturating_add(snap.external);
            }
            raw_capacity = raw_capacity.saturating_add(isolate_capacity);
            external = external.saturating_add(isolate_external);
            heap_max = heap_max.saturating_add(isolate_capacity.saturating_add(isolate_external));
        }

        HeapTotals {
            used,
            capacity: raw_capacity.saturating_add(external),
            external,
            heap_max,
        }
    }
}
