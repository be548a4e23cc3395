//! State shared by the coordinator and every unit of work, and the unit itself.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use url::Url;

use super::counters::{Counters, Outcome};
use super::detect::ChangeDetector;
use super::retry_queue::RetryQueue;
use super::{CloneError, EntryError, JobSettings};
use crate::checksum::Fingerprinter;
use crate::storage::LocalStore;
use crate::transport::{Method, Transport};

pub(crate) struct JobContext {
    source_root: Url,
    dest_root: PathBuf,
    transport: Arc<dyn Transport>,
    store: Arc<dyn LocalStore>,
    pub(crate) detector: ChangeDetector,
    pub(crate) counters: Counters,
    pub(crate) retries: RetryQueue,
}

impl JobContext {
    pub(crate) fn new(
        settings: &JobSettings,
        transport: Arc<dyn Transport>,
        store: Arc<dyn LocalStore>,
        fingerprinter: Arc<dyn Fingerprinter>,
    ) -> Result<Self, CloneError> {
        let source_root = parse_source_root(&settings.source)?;
        let detector = ChangeDetector::new(Arc::clone(&transport), fingerprinter, settings.toggles);
        Ok(Self {
            source_root,
            dest_root: settings.dest.clone(),
            transport,
            store,
            detector,
            counters: Counters::new(),
            retries: RetryQueue::new(),
        })
    }

    pub(crate) fn store(&self) -> &dyn LocalStore {
        self.store.as_ref()
    }

    /// Source root with the relative path appended as percent-encoded segments.
    pub(crate) fn remote_url(&self, rel_path: &str) -> Result<String, EntryError> {
        let mut url = self.source_root.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| EntryError::Url {
                rel_path: rel_path.to_string(),
                reason: "source root cannot take path segments".to_string(),
            })?;
            segments.pop_if_empty();
            segments.extend(rel_path.split('/').filter(|s| !s.is_empty() && *s != "."));
        }
        Ok(url.into())
    }

    /// Destination path for `rel_path`. None if the path is absolute or climbs out of the root.
    pub(crate) fn local_path(&self, rel_path: &str) -> Option<PathBuf> {
        let rel = Path::new(rel_path.trim_start_matches('/'));
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe || rel.as_os_str().is_empty() {
            return None;
        }
        Some(self.dest_root.join(rel))
    }

    /// Fetch + store for one path, with change detection first when `ensure_changes` is set
    /// and a local copy exists. Never panics; failures become [`Outcome::Failed`].
    pub(crate) fn run_unit(&self, rel_path: &str, ensure_changes: bool) -> Outcome {
        let t1 = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.clone_path(rel_path, ensure_changes)
        }))
        .unwrap_or_else(|_| Err(EntryError::Panicked(rel_path.to_string())));
        tracing::debug!("time to process {}: {:?}", rel_path, t1.elapsed());

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("failed to clone {}: {}", rel_path, e);
                Outcome::Failed
            }
        }
    }

    fn clone_path(&self, rel_path: &str, ensure_changes: bool) -> Result<Outcome, EntryError> {
        let local = self
            .local_path(rel_path)
            .ok_or_else(|| EntryError::UnsafePath(rel_path.to_string()))?;
        let remote = self.remote_url(rel_path)?;

        if ensure_changes && self.store.exists(&local) {
            match self.detector.has_changed(&local, &remote) {
                Ok(false) => {
                    tracing::debug!("{} unchanged since dispatch, skipping", local.display());
                    return Ok(Outcome::Skipped);
                }
                Ok(true) => {}
                Err(e) => {
                    self.counters.record_probe_failure();
                    tracing::warn!("assuming {} changed: {}", local.display(), e);
                }
            }
        }

        self.process(&remote, &local)?;
        Ok(Outcome::Succeeded)
    }

    /// GET `remote` and write the body to `local`. The write is part of the unit:
    /// a store failure fails the entry even though the fetch succeeded.
    fn process(&self, remote: &str, local: &Path) -> Result<(), EntryError> {
        tracing::debug!("fetch {} into {}", remote, local.display());

        if let Some(parent) = local.parent() {
            if !self.store.exists(parent) {
                tracing::info!("create {}", parent.display());
                self.store.create_dir_all(parent)?;
            }
        }

        let t1 = Instant::now();
        let rsp = self.transport.fetch(Method::Get, remote)?;
        tracing::debug!("time to fetch {}: {:?}", remote, t1.elapsed());

        self.store.write_file(local, &rsp.body)?;
        tracing::debug!("wrote {} to disk ({} bytes)", local.display(), rsp.body.len());
        Ok(())
    }
}

fn parse_source_root(source: &str) -> Result<Url, CloneError> {
    let invalid = |reason: String| CloneError::InvalidSource {
        source_root: source.to_string(),
        reason,
    };
    let url = Url::parse(source).map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("URL cannot be used as a base for relative paths".to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::HashAlgorithm;
    use crate::storage::FsStore;
    use crate::transport::CurlTransport;

    fn ctx(source: &str) -> JobContext {
        let settings = JobSettings::new(source, "/dest");
        JobContext::new(
            &settings,
            Arc::new(CurlTransport::default()),
            Arc::new(FsStore),
            Arc::new(HashAlgorithm::Md5),
        )
        .unwrap()
    }

    #[test]
    fn remote_url_joins_with_or_without_trailing_slash() {
        assert_eq!(
            ctx("https://data.example.org/").remote_url("101/736/545/101736545.geojson").unwrap(),
            "https://data.example.org/101/736/545/101736545.geojson"
        );
        assert_eq!(
            ctx("https://data.example.org/base").remote_url("/a/b.json").unwrap(),
            "https://data.example.org/base/a/b.json"
        );
    }

    #[test]
    fn remote_url_percent_encodes_segments() {
        assert_eq!(
            ctx("http://h/").remote_url("dir/a b#c.json").unwrap(),
            "http://h/dir/a%20b%23c.json"
        );
    }

    #[test]
    fn local_path_rejects_escapes() {
        let c = ctx("http://h/");
        assert_eq!(c.local_path("a/b.json"), Some(PathBuf::from("/dest/a/b.json")));
        assert_eq!(c.local_path("/a/b.json"), Some(PathBuf::from("/dest/a/b.json")));
        assert_eq!(c.local_path("../etc/passwd"), None);
        assert_eq!(c.local_path("a/../../b"), None);
        assert_eq!(c.local_path("/"), None);
    }

    #[test]
    fn invalid_source_root_is_rejected() {
        let settings = JobSettings::new("not a url", "/dest");
        let err = JobContext::new(
            &settings,
            Arc::new(CurlTransport::default()),
            Arc::new(FsStore),
            Arc::new(HashAlgorithm::Md5),
        )
        .err()
        .expect("should fail");
        assert!(matches!(err, CloneError::InvalidSource { .. }));

        let settings = JobSettings::new("mailto:someone@example.org", "/dest");
        assert!(JobContext::new(
            &settings,
            Arc::new(CurlTransport::default()),
            Arc::new(FsStore),
            Arc::new(HashAlgorithm::Md5),
        )
        .is_err());
    }
}
