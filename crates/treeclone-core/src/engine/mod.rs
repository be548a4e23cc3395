//! Clone engine.
//!
//! Mirrors every manifest entry from a source root URL into a destination
//! directory in two phases: an initial pass over the whole manifest, then a
//! single retry pass over the entries that failed, guarded by a failure budget:
//!
//! manifest → change detection → fetch + store (worker pool) → counters →
//! retry queue → budget gate → retry pass → counters.

mod budget;
mod context;
mod counters;
mod detect;
mod executor;
mod job;
mod retry_queue;
mod status;

pub use budget::{BudgetGate, BudgetVerdict};
pub use counters::{CounterSnapshot, Counters, Outcome};
pub use detect::{ChangeDetector, Decision, DetectError, Detection, Toggles};
pub use executor::{Executor, InlineExecutor, PhaseBarrier, Task, WorkerPool};
pub use job::{CloneJob, JobParts, JobSummary};
pub use retry_queue::RetryQueue;
pub use status::{StatusReporter, StatusSnapshot};

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use crate::config::CloneConfig;
use crate::manifest::ManifestError;
use crate::storage::StoreError;
use crate::transport::FetchError;

/// Per-invocation job parameters.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// URL prefix the manifest paths are relative to.
    pub source: String,
    /// Local directory the manifest paths are relative to.
    pub dest: PathBuf,
    /// Worker pool size.
    pub concurrency: usize,
    /// Budget gate ceiling, in percent of scheduled entries.
    pub max_retry_percent: f64,
    pub toggles: Toggles,
    pub status_interval: Duration,
}

impl JobSettings {
    pub fn new(source: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self::from_config(&CloneConfig::default(), source, dest)
    }

    pub fn from_config(cfg: &CloneConfig, source: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            concurrency: cfg.concurrency.max(1),
            max_retry_percent: cfg.max_retry_percent,
            toggles: Toggles {
                skip_existing: cfg.skip_existing,
                force_updates: cfg.force_updates,
            },
            status_interval: cfg.status_interval(),
        }
    }
}

/// Job lifecycle. A job runs at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum JobPhase {
    Idle = 0,
    InitialPass = 1,
    BudgetCheck = 2,
    RetryPass = 3,
    Done = 4,
    Aborted = 5,
}

impl JobPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => JobPhase::Idle,
            1 => JobPhase::InitialPass,
            2 => JobPhase::BudgetCheck,
            3 => JobPhase::RetryPass,
            4 => JobPhase::Done,
            _ => JobPhase::Aborted,
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobPhase::Idle => "idle",
            JobPhase::InitialPass => "initial pass",
            JobPhase::BudgetCheck => "budget check",
            JobPhase::RetryPass => "retry pass",
            JobPhase::Done => "done",
            JobPhase::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Phase shared with the status reporter.
#[derive(Debug)]
pub(crate) struct PhaseCell(AtomicU8);

impl PhaseCell {
    fn new() -> Self {
        Self(AtomicU8::new(JobPhase::Idle as u8))
    }

    pub(crate) fn get(&self) -> JobPhase {
        JobPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, phase: JobPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }

    /// Idle → InitialPass exactly once.
    fn start(&self) -> bool {
        self.0
            .compare_exchange(
                JobPhase::Idle as u8,
                JobPhase::InitialPass as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Terminal job errors. Per-entry failures never show up here; they are in the counters.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    #[error("could not read manifest: {0}")]
    Manifest(#[from] ManifestError),
    #[error(
        "E_EXCESSIVE_ERRORS: {ratio:.1}% of scheduled entries failed ({failed} of {scheduled}), above the {ceiling}% retry budget"
    )]
    BudgetExceeded {
        ratio: f64,
        ceiling: f64,
        failed: usize,
        scheduled: u64,
    },
    #[error("invalid source root '{source_root}': {reason}")]
    InvalidSource { source_root: String, reason: String },
    #[error("job has already been run")]
    AlreadyRun,
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[source] std::io::Error),
}

/// Why a single entry failed. Logged and counted, never returned to the job's caller.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot build remote URL for '{rel_path}': {reason}")]
    Url { rel_path: String, reason: String },
    #[error("path '{0}' escapes the destination root")]
    UnsafePath(String),
    #[error("worker panicked while processing '{0}'")]
    Panicked(String),
}
