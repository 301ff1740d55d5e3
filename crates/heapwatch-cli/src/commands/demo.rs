//! `heapwatch demo`: watch a simulated process.
//!
//! Each simulated isolate has a new and an old generation. Every poll lets
//! the isolates allocate a little; every GC event scavenges one isolate,
//! promoting part of its new generation into the old one.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use heapwatch_core::{GcEvent, GcEventStream, HeapDataSource, ProcessSnapshot, RawIsolate, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use super::WatchOptions;

const MIB: i64 = 1024 * 1024;
/// Memory the simulated process holds outside any isolate heap.
const BASELINE_RSS: i64 = 48 * MIB;

/// Run the demo command.
pub fn run(isolates: usize, gc_every: Duration, seed: Option<u64>, opts: WatchOptions) {
    if isolates == 0 {
        eprintln!("Error: --isolates must be at least 1");
        std::process::exit(1);
    }
    let seed = seed.unwrap_or_else(rand::random);
    log::info!("simulating {isolates} isolates (seed {seed})");

    let source = SimulatedProcess::new(isolates, gc_every, seed);
    super::watch(Arc::new(source), &opts);
}

#[derive(Debug, Clone, Copy)]
struct Space {
    used: i64,
    capacity: i64,
    external: i64,
}

impl Space {
    fn allocate(&mut self, bytes: i64, external: i64) {
        self.used += bytes;
        self.external += external;
        while self.used > self.capacity {
            self.capacity *= 2;
        }
    }

    fn to_record(self, name: &str) -> serde_json::Value {
        json!({
            "type": "HeapSpace",
            "name": name,
            "used": self.used,
            "capacity": self.capacity,
            "external": self.external,
        })
    }
}

#[derive(Debug)]
struct SimIsolate {
    id: String,
    new_space: Space,
    old_space: Space,
}

impl SimIsolate {
    fn new(index: usize) -> Self {
        Self {
            id: format!("isolates/{}", 1000 + index),
            new_space: Space {
                used: 0,
                capacity: 2 * MIB,
                external: 0,
            },
            old_space: Space {
                used: 4 * MIB,
                capacity: 8 * MIB,
                external: 0,
            },
        }
    }

    fn generations(&self) -> Vec<serde_json::Value> {
        vec![
            self.new_space.to_record("new"),
            self.old_space.to_record("old"),
        ]
    }

    /// Empty the new generation, promoting `survival` of it to old.
    fn scavenge(&mut self, survival: f64) {
        let promoted = (self.new_space.used as f64 * survival) as i64;
        let promoted_external = (self.new_space.external as f64 * survival) as i64;
        self.old_space.allocate(promoted, promoted_external);
        self.new_space.used = 0;
        self.new_space.external = 0;
    }
}

#[derive(Debug)]
struct SimState {
    rng: StdRng,
    isolates: Vec<SimIsolate>,
}

impl SimState {
    fn tick(&mut self) {
        for isolate in &mut self.isolates {
            let bytes = self.rng.random_range(0..256 * 1024);
            let external = if self.rng.random_bool(0.2) {
                self.rng.random_range(0..64 * 1024)
            } else {
                0
            };
            isolate.new_space.allocate(bytes, external);
        }
    }

    fn collect_random(&mut self) -> GcEvent {
        let idx = self.rng.random_range(0..self.isolates.len());
        let survival = self.rng.random_range(0.05..0.3);
        let isolate = &mut self.isolates[idx];
        isolate.scavenge(survival);
        GcEvent {
            isolate_id: isolate.id.clone(),
            generations: isolate.generations(),
        }
    }

    fn snapshot(&self) -> ProcessSnapshot {
        let heap: i64 = self
            .isolates
            .iter()
            .map(|i| {
                i.new_space.capacity
                    + i.old_space.capacity
                    + i.new_space.external
                    + i.old_space.external
            })
            .sum();
        ProcessSnapshot {
            rss: BASELINE_RSS + heap,
            isolates: self
                .isolates
                .iter()
                .map(|i| RawIsolate {
                    id: i.id.clone(),
                    generations: i.generations(),
                })
                .collect(),
        }
    }
}

/// In-process stand-in for a runtime with several isolates.
pub struct SimulatedProcess {
    state: Arc<Mutex<SimState>>,
    gc_every: Duration,
}

impl SimulatedProcess {
    pub fn new(isolates: usize, gc_every: Duration, seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                rng: StdRng::seed_from_u64(seed),
                isolates: (0..isolates).map(SimIsolate::new).collect(),
            })),
            gc_every,
        }
    }
}

#[async_trait]
impl HeapDataSource for SimulatedProcess {
    async fn fetch_process_snapshot(&self) -> Result<ProcessSnapshot> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tick();
        Ok(state.snapshot())
    }

    fn subscribe_gc_events(&self) -> GcEventStream {
        let state = Arc::clone(&self.state);
        let mean = self.gc_every;
        futures::stream::unfold(state, move |state| async move {
            let jitter = {
                let mut s = state.lock().unwrap_or_else(PoisonError::into_inner);
                s.rng.random_range(0.5..1.5)
            };
            tokio::time::sleep(mean.mul_f64(jitter)).await;
            let event = state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .collect_random();
            Some((event, state))
        })
        .boxed()
    }

    fn name(&self) -> &str {
        "simulated-process"
    }
}
