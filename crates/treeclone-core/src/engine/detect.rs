//! Change detection: fetch or skip an entry that may already exist locally.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::checksum::Fingerprinter;
use crate::manifest::Entry;
use crate::transport::{FetchError, Method, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Fetch,
    Skip,
}

/// User toggles for entries that already exist locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Toggles {
    /// Never look at existing entries again.
    pub skip_existing: bool,
    /// Always re-fetch existing entries. Wins over `skip_existing`.
    pub force_updates: bool,
}

/// Why a fingerprint comparison could not be made. The comparison still
/// reports "changed" so the entry is fetched.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("metadata probe failed: {0}")]
    Probe(#[from] FetchError),
    #[error("failed to hash {path}: {cause:#}")]
    LocalHash { path: String, cause: anyhow::Error },
}

/// A decision plus the error that forced it, if any.
#[derive(Debug)]
pub struct Detection {
    pub decision: Decision,
    pub error: Option<DetectError>,
}

impl Detection {
    fn plain(decision: Decision) -> Self {
        Self {
            decision,
            error: None,
        }
    }
}

pub struct ChangeDetector {
    transport: Arc<dyn Transport>,
    fingerprinter: Arc<dyn Fingerprinter>,
    toggles: Toggles,
}

impl ChangeDetector {
    pub fn new(
        transport: Arc<dyn Transport>,
        fingerprinter: Arc<dyn Fingerprinter>,
        toggles: Toggles,
    ) -> Self {
        Self {
            transport,
            fingerprinter,
            toggles,
        }
    }

    /// Decide whether `entry` must be fetched from `remote` into `local`.
    ///
    /// Without a local copy the answer is always Fetch and nothing is probed.
    pub fn decide(&self, entry: &Entry, local: &Path, remote: &str, local_exists: bool) -> Detection {
        if !local_exists {
            return Detection::plain(Decision::Fetch);
        }
        if self.toggles.force_updates {
            tracing::debug!("{} exists, re-fetching (force updates)", local.display());
            return Detection::plain(Decision::Fetch);
        }
        if self.toggles.skip_existing {
            tracing::debug!("{} exists, skipping (skip existing)", local.display());
            return Detection::plain(Decision::Skip);
        }

        let t1 = Instant::now();
        let compared = match entry.file_hash.as_deref() {
            Some(hash) => {
                tracing::debug!("comparing manifest hash ({}) for {}", hash, local.display());
                self.has_hash_changed(hash, remote)
            }
            None => self.has_changed(local, remote),
        };
        let (changed, error) = match compared {
            Ok(changed) => (changed, None),
            Err(e) => (true, Some(e)),
        };
        tracing::debug!(
            "time to determine whether {} has changed ({}): {:?}",
            local.display(),
            changed,
            t1.elapsed()
        );

        if !changed {
            tracing::info!("{} unchanged", local.display());
        }
        Detection {
            decision: if changed { Decision::Fetch } else { Decision::Skip },
            error,
        }
    }

    /// Hash the local copy and compare it with the remote validator.
    /// An error means the comparison could not be made; callers treat it as changed.
    pub fn has_changed(&self, local: &Path, remote: &str) -> Result<bool, DetectError> {
        let local_hash =
            self.fingerprinter
                .fingerprint(local)
                .map_err(|cause| DetectError::LocalHash {
                    path: local.display().to_string(),
                    cause,
                })?;
        self.has_hash_changed(&local_hash, remote)
    }

    /// Compare a known fingerprint with the remote ETag from a HEAD probe.
    /// ETags are opaque, so only an exact match counts as unchanged.
    pub fn has_hash_changed(&self, local_hash: &str, remote: &str) -> Result<bool, DetectError> {
        let rsp = self.transport.fetch(Method::Head, remote)?;
        let remote_hash = rsp.etag.unwrap_or_default();
        Ok(local_hash != remote_hash)
    }
}
