//! Periodic status snapshots while a job runs.
//!
//! Purely observational: the reporter only reads atomics, so it never blocks
//! a worker. Snapshots are logged and, when a sink is given, pushed to it
//! with `try_send` (a slow consumer just misses ticks).

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use serde::Serialize;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::counters::CounterSnapshot;
use super::JobPhase;

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub counters: CounterSnapshot,
    /// Paths currently waiting in the retry queue.
    pub queued_retries: usize,
    /// Units of work currently running on the pool.
    pub active_workers: usize,
    pub phase: JobPhase,
    pub elapsed_secs: f64,
}

impl StatusSnapshot {
    pub fn log(&self) {
        let c = &self.counters;
        tracing::info!(
            "scheduled: {} completed: {} success: {} error: {} skipped: {} to retry: {} workers: {} phase: {} time: {:.1}s",
            c.scheduled,
            c.completed,
            c.succeeded,
            c.errored,
            c.skipped,
            self.queued_retries,
            self.active_workers,
            self.phase,
            self.elapsed_secs
        );
    }
}

/// Background timer thread. Stops when dropped.
pub struct StatusReporter {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StatusReporter {
    /// Start emitting `snapshot()` every `interval`.
    pub fn spawn<F>(
        interval: Duration,
        snapshot: F,
        sink: Option<tokio::sync::mpsc::Sender<StatusSnapshot>>,
    ) -> io::Result<Self>
    where
        F: Fn() -> StatusSnapshot + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("treeclone-status".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let snap = snapshot();
                        snap.log();
                        if let Some(ref tx) = sink {
                            let _ = tx.try_send(snap);
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the timer and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatusReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
