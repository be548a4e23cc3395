//! Stack of relative paths that failed in the initial pass.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// LIFO of failed paths. Workers push concurrently; the coordinator pops during
/// the retry pass. The length is mirrored in an atomic so status reads never
/// contend with workers for the lock.
#[derive(Debug, Default)]
pub struct RetryQueue {
    paths: Mutex<Vec<String>>,
    len: AtomicUsize,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        // A panicking pusher cannot leave the Vec half-updated.
        self.paths.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, rel_path: impl Into<String>) {
        let mut paths = self.lock();
        paths.push(rel_path.into());
        self.len.store(paths.len(), Ordering::Release);
    }

    pub fn pop(&self) -> Option<String> {
        let mut paths = self.lock();
        let p = paths.pop();
        self.len.store(paths.len(), Ordering::Release);
        p
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the queued paths, most recent last.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().clone()
    }
}
