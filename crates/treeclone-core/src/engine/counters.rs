//! Job tallies shared by the coordinator, workers and the status reporter.
//!
//! Every update is a single atomic add; no lock is taken. Because one outcome
//! touches several counters in separate steps, the relation
//! `completed == succeeded + errored + skipped` only holds once a phase barrier
//! has been passed, not while units are in flight.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Result of one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Skipped,
    Succeeded,
    Failed,
}

#[derive(Debug, Default)]
pub struct Counters {
    scheduled: AtomicU64,
    completed: AtomicU64,
    succeeded: AtomicU64,
    errored: AtomicI64,
    skipped: AtomicU64,
    probe_failures: AtomicU64,
    recovered: AtomicU64,
}

/// Point-in-time copy of [`Counters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub scheduled: u64,
    pub completed: u64,
    pub succeeded: u64,
    pub errored: i64,
    pub skipped: u64,
    /// Metadata probes or local hashes that failed and were treated as "changed".
    pub probe_failures: u64,
    /// Retries that resolved an error counted in the initial pass.
    pub recovered: u64,
}

impl CounterSnapshot {
    /// `completed == succeeded + errored + skipped`.
    pub fn is_balanced(&self) -> bool {
        let sum = self.succeeded as i128 + self.errored as i128 + self.skipped as i128;
        self.completed as i128 == sum
    }
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Entry skipped on the coordinating thread: scheduled and completed in one go.
    pub fn record_immediate_skip(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Completion of an initial-pass unit.
    pub fn record_outcome(&self, outcome: Outcome) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Outcome::Succeeded => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Failed => {
                self.errored.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Completion of a retry unit. A resolved retry takes its earlier error back.
    pub fn record_retry_outcome(&self, outcome: Outcome) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Outcome::Succeeded => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                self.resolve_error();
            }
            Outcome::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                self.resolve_error();
            }
            Outcome::Failed => {
                self.errored.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn resolve_error(&self) {
        self.errored.fetch_sub(1, Ordering::Relaxed);
        self.recovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_failure(&self) {
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
        }
    }
}
