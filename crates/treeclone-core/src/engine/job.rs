//! Clone job: the two-phase dispatcher.
//!
//! `Idle → InitialPass → BudgetCheck → { RetryPass → Done | Aborted }`
//!
//! The coordinating thread reads the manifest, decides fetch vs skip for each
//! entry and hands fetches to the executor. Each phase ends with a barrier over
//! every unit it submitted, so the budget gate and the retry pass only ever see
//! settled counters and a settled retry queue.

use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use super::budget::{BudgetGate, BudgetVerdict};
use super::context::JobContext;
use super::counters::{CounterSnapshot, Outcome};
use super::detect::Decision;
use super::executor::{Executor, PhaseBarrier, WorkerPool};
use super::status::{StatusReporter, StatusSnapshot};
use super::{CloneError, JobPhase, JobSettings, PhaseCell};
use crate::checksum::Fingerprinter;
use crate::config::CloneConfig;
use crate::manifest::{Entry, ManifestError, ManifestReader, ManifestRow};
use crate::storage::{FsStore, LocalStore};
use crate::transport::{CurlTransport, Transport};

/// Collaborators a job runs against. [`CloneJob::from_config`] wires the real
/// ones; tests pass stubs.
pub struct JobParts {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn LocalStore>,
    pub fingerprinter: Arc<dyn Fingerprinter>,
    pub executor: Arc<dyn Executor>,
}

/// Result of a job that was not aborted.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub counters: CounterSnapshot,
    /// Number of entries given a second attempt.
    pub retried: usize,
    pub elapsed_secs: f64,
}

pub struct CloneJob {
    settings: JobSettings,
    ctx: Arc<JobContext>,
    executor: Arc<dyn Executor>,
    gate: BudgetGate,
    phase: Arc<PhaseCell>,
    started: Arc<OnceLock<Instant>>,
    status_tx: Option<tokio::sync::mpsc::Sender<StatusSnapshot>>,
}

impl CloneJob {
    /// Job backed by libcurl, the real filesystem and a worker pool of
    /// `cfg.concurrency` threads.
    pub fn from_config(
        cfg: &CloneConfig,
        source: impl Into<String>,
        dest: impl AsRef<Path>,
    ) -> Result<Self, CloneError> {
        let settings = JobSettings::from_config(cfg, source, dest.as_ref());
        let pool = WorkerPool::new(settings.concurrency).map_err(CloneError::WorkerPool)?;
        let parts = JobParts {
            transport: Arc::new(CurlTransport::new(&cfg.transport)),
            store: Arc::new(FsStore),
            fingerprinter: Arc::new(cfg.hash_algorithm),
            executor: Arc::new(pool),
        };
        Self::with_parts(settings, parts)
    }

    pub fn with_parts(settings: JobSettings, parts: JobParts) -> Result<Self, CloneError> {
        let ctx = JobContext::new(&settings, parts.transport, parts.store, parts.fingerprinter)?;
        Ok(Self {
            gate: BudgetGate::new(settings.max_retry_percent),
            settings,
            ctx: Arc::new(ctx),
            executor: parts.executor,
            phase: Arc::new(PhaseCell::new()),
            started: Arc::new(OnceLock::new()),
            status_tx: None,
        })
    }

    /// Also push periodic snapshots to `tx` (the CLI progress printer).
    pub fn with_status_sink(mut self, tx: tokio::sync::mpsc::Sender<StatusSnapshot>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub fn phase(&self) -> JobPhase {
        self.phase.get()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.ctx.counters.snapshot()
    }

    /// Paths still waiting for a retry (non-empty only after a budget abort).
    pub fn pending_retries(&self) -> Vec<String> {
        self.ctx.retries.snapshot()
    }

    pub fn status(&self) -> StatusSnapshot {
        snapshot(&self.ctx, self.executor.as_ref(), &self.phase, &self.started)
    }

    /// Open `path` and run the job over its rows.
    pub fn run_manifest(&self, path: &Path) -> Result<JobSummary, CloneError> {
        let abs = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let reader = ManifestReader::open(&abs).map_err(|e| {
            tracing::error!("failed to read {}, because {}", abs.display(), e);
            e
        })?;
        tracing::info!("cloning {} into {}", abs.display(), self.settings.dest.display());
        self.run(reader)
    }

    /// Run both phases over `rows`. A job runs at most once.
    pub fn run<I>(&self, rows: I) -> Result<JobSummary, CloneError>
    where
        I: IntoIterator<Item = Result<ManifestRow, ManifestError>>,
    {
        if !self.phase.start() {
            return Err(CloneError::AlreadyRun);
        }
        let started = *self.started.get_or_init(Instant::now);
        let reporter = self.spawn_reporter();

        let result = self.run_phases(rows);
        self.phase.set(if result.is_ok() {
            JobPhase::Done
        } else {
            JobPhase::Aborted
        });

        if let Some(r) = reporter {
            r.stop();
        }
        self.status().log();

        result.map(|retried| JobSummary {
            counters: self.counters(),
            retried,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    fn spawn_reporter(&self) -> Option<StatusReporter> {
        let ctx = Arc::clone(&self.ctx);
        let executor = Arc::clone(&self.executor);
        let phase = Arc::clone(&self.phase);
        let started = Arc::clone(&self.started);
        let spawned = StatusReporter::spawn(
            self.settings.status_interval,
            move || snapshot(&ctx, executor.as_ref(), &phase, &started),
            self.status_tx.clone(),
        );
        match spawned {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::warn!("status reporter not started: {}", e);
                None
            }
        }
    }

    /// Returns the number of entries retried.
    fn run_phases<I>(&self, rows: I) -> Result<usize, CloneError>
    where
        I: IntoIterator<Item = Result<ManifestRow, ManifestError>>,
    {
        self.initial_pass(rows)?;

        self.phase.set(JobPhase::BudgetCheck);
        let scheduled = self.ctx.counters.scheduled();
        let queued = self.ctx.retries.len();
        match self.gate.check(scheduled, queued) {
            BudgetVerdict::Exceeded { ratio } => {
                tracing::warn!(
                    "E_EXCESSIVE_ERRORS: {:.2}% of scheduled entries failed, above the {}% budget; not retrying",
                    ratio,
                    self.gate.max_retry_percent()
                );
                return Err(CloneError::BudgetExceeded {
                    ratio,
                    ceiling: self.gate.max_retry_percent(),
                    failed: queued,
                    scheduled,
                });
            }
            BudgetVerdict::Proceed { ratio } => {
                tracing::debug!("initial pass failure ratio {:.2}% within budget", ratio);
            }
        }

        self.phase.set(JobPhase::RetryPass);
        Ok(self.retry_pass())
    }

    /// Dispatch every manifest entry and wait for all submitted units.
    /// A manifest read error stops dispatch but still waits for what was submitted.
    fn initial_pass<I>(&self, rows: I) -> Result<(), CloneError>
    where
        I: IntoIterator<Item = Result<ManifestRow, ManifestError>>,
    {
        let ctx = &self.ctx;
        let mut barrier = PhaseBarrier::new();
        let mut failure = None;

        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    tracing::error!("failed to read manifest row: {}", e);
                    failure = Some(e);
                    break;
                }
            };
            let Some(entry) = Entry::from_row(&row) else {
                continue;
            };
            let Some(local) = ctx.local_path(&entry.rel_path) else {
                tracing::warn!("ignoring {}: path escapes the destination root", entry.rel_path);
                continue;
            };
            let remote = match ctx.remote_url(&entry.rel_path) {
                Ok(u) => u,
                Err(e) => {
                    tracing::warn!("ignoring {}: {}", entry.rel_path, e);
                    continue;
                }
            };

            let local_exists = ctx.store().exists(&local);
            let detection = ctx.detector.decide(&entry, &local, &remote, local_exists);
            if let Some(e) = &detection.error {
                ctx.counters.record_probe_failure();
                tracing::warn!("assuming {} changed: {}", local.display(), e);
            }
            if detection.decision == Decision::Skip {
                ctx.counters.record_immediate_skip();
                continue;
            }

            ctx.counters.schedule();
            // Existing copies were already compared above; only a copy that
            // appears in the meantime needs another look.
            let ensure_changes = !local_exists;
            let unit_ctx = Arc::clone(ctx);
            let rel_path = entry.rel_path;
            barrier.submit(self.executor.as_ref(), move || {
                let outcome = unit_ctx.run_unit(&rel_path, ensure_changes);
                if outcome == Outcome::Failed {
                    unit_ctx.retries.push(rel_path);
                }
                unit_ctx.counters.record_outcome(outcome);
            });
        }

        let submitted = barrier.submitted();
        barrier.join_all();
        tracing::info!(
            "initial pass finished: {} units of work, {} queued for retry",
            submitted,
            ctx.retries.len()
        );

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Drain the retry queue once. Retries never requeue, so this cannot recurse.
    fn retry_pass(&self) -> usize {
        let ctx = &self.ctx;
        let to_retry = ctx.retries.len();
        if to_retry == 0 {
            return 0;
        }
        tracing::info!("retrying {} failed entries", to_retry);

        let mut barrier = PhaseBarrier::new();
        while let Some(rel_path) = ctx.retries.pop() {
            ctx.counters.schedule();
            let unit_ctx = Arc::clone(ctx);
            barrier.submit(self.executor.as_ref(), move || {
                let outcome = unit_ctx.run_unit(&rel_path, true);
                unit_ctx.counters.record_retry_outcome(outcome);
            });
        }
        let retried = barrier.submitted();
        barrier.join_all();
        retried
    }
}

fn snapshot(
    ctx: &JobContext,
    executor: &dyn Executor,
    phase: &PhaseCell,
    started: &OnceLock<Instant>,
) -> StatusSnapshot {
    StatusSnapshot {
        counters: ctx.counters.snapshot(),
        queued_retries: ctx.retries.len(),
        active_workers: executor.active(),
        phase: phase.get(),
        elapsed_secs: started
            .get()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0),
    }
}
