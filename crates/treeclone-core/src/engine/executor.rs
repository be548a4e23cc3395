//! Worker pool abstraction.
//!
//! The dispatcher only needs "run this closure somewhere" plus a way to wait
//! for everything it submitted in a phase. [`WorkerPool`] runs closures on a
//! fixed set of OS threads; [`InlineExecutor`] runs them on the caller's
//! thread, which keeps dispatch and accounting tests deterministic.

use crossbeam::channel::{self, Sender};
use crossbeam::sync::WaitGroup;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A unit of work handed to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    /// Hand `task` to the executor. Blocks only while no worker is free.
    fn submit(&self, task: Task);

    /// Running-task counter, maintained by [`PhaseBarrier`] around each task.
    fn busy(&self) -> &Arc<AtomicUsize>;

    /// Number of tasks currently running.
    fn active(&self) -> usize {
        self.busy().load(Ordering::Acquire)
    }
}

/// Counts one running task for as long as it is alive.
struct Busy(Arc<AtomicUsize>);

impl Busy {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for Busy {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Completion barrier for one phase. Each submitted task carries a share of the
/// barrier and releases it when it returns or unwinds, after it has stopped
/// counting as busy, so `active()` is zero once `join_all` returns.
pub struct PhaseBarrier {
    wg: WaitGroup,
    submitted: usize,
}

impl Default for PhaseBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseBarrier {
    pub fn new() -> Self {
        Self {
            wg: WaitGroup::new(),
            submitted: 0,
        }
    }

    /// Submit `task` to `executor` as part of this phase.
    pub fn submit<F>(&mut self, executor: &dyn Executor, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let share = self.wg.clone();
        let busy = Arc::clone(executor.busy());
        self.submitted += 1;
        executor.submit(Box::new(move || {
            // Locals drop in reverse order: busy is released before the share.
            let _share = share;
            let _busy = Busy::enter(busy);
            task();
        }));
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Block until every task submitted through this barrier has finished.
    pub fn join_all(self) {
        self.wg.wait();
    }
}

/// Runs a task, containing a panic so the calling thread survives it.
fn run_contained(task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!("worker task panicked: {}", msg);
    }
}

/// Fixed-size pool of worker threads fed through a rendezvous channel, so a
/// submit returns as soon as some worker has taken the task.
pub struct WorkerPool {
    tx: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    busy: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(size: usize) -> io::Result<Self> {
        let size = size.max(1);
        let (tx, rx) = channel::bounded::<Task>(0);

        let mut workers = Vec::with_capacity(size);
        for idx in 0..size {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("treeclone-worker-{idx}"))
                .spawn(move || {
                    for task in rx.iter() {
                        run_contained(task);
                    }
                })?;
            workers.push(handle);
        }

        tracing::debug!(workers = size, "worker pool started");
        Ok(Self {
            tx: Some(tx),
            workers,
            busy: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl Executor for WorkerPool {
    fn submit(&self, task: Task) {
        let Some(tx) = self.tx.as_ref() else {
            run_contained(task);
            return;
        };
        if let Err(channel::SendError(task)) = tx.send(task) {
            // Every worker is gone; run here so the phase barrier still completes.
            tracing::error!("worker pool disconnected, running task inline");
            run_contained(task);
        }
    }

    fn busy(&self) -> &Arc<AtomicUsize> {
        &self.busy
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Disconnect so workers leave their receive loop, then wait for them.
        drop(self.tx.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        tracing::debug!("worker pool stopped");
    }
}

/// Runs every task synchronously inside `submit`.
#[derive(Debug, Default)]
pub struct InlineExecutor {
    busy: Arc<AtomicUsize>,
}

impl InlineExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for InlineExecutor {
    fn submit(&self, task: Task) {
        run_contained(task);
    }

    fn busy(&self) -> &Arc<AtomicUsize> {
        &self.busy
    }
}
