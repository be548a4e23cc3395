//! Integration test: clone a manifest from a local HTTP origin with the real
//! curl transport, filesystem store and worker pool.

mod common;

use common::origin_server::{self, md5_hex};
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use treeclone_core::config::CloneConfig;
use treeclone_core::engine::{CloneError, CloneJob, JobSummary};

fn files(n: usize) -> Vec<(String, Vec<u8>)> {
    (0..n)
        .map(|i| {
            let path = format!("{}/{:03}/{i}.geojson", 101 + i % 2, i);
            let body = format!("{{\"type\":\"Feature\",\"id\":{i}}}").repeat(i + 1);
            (path, body.into_bytes())
        })
        .collect()
}

fn write_manifest(dir: &Path, files: &[(String, Vec<u8>)], with_hash: bool) -> PathBuf {
    let mut csv = String::from("id,path,file_hash\n");
    for (i, (path, body)) in files.iter().enumerate() {
        let hash = if with_hash { md5_hex(body) } else { String::new() };
        csv.push_str(&format!("{i},{path},{hash}\n"));
    }
    let manifest = dir.join("meta.csv");
    std::fs::write(&manifest, csv).unwrap();
    manifest
}

fn config() -> CloneConfig {
    CloneConfig {
        concurrency: 4,
        status_interval_ms: 50,
        ..CloneConfig::default()
    }
}

async fn clone(base: &str, manifest: &Path, dest: &Path) -> Result<JobSummary, CloneError> {
    let job = CloneJob::from_config(&config(), base, dest)?;
    let manifest = manifest.to_path_buf();
    tokio::task::spawn_blocking(move || job.run_manifest(&manifest))
        .await
        .expect("clone task panicked")
}

#[tokio::test]
async fn clones_every_entry_and_second_run_only_probes() {
    let files = files(12);
    let origin = origin_server::start(&files);
    let work = tempdir().unwrap();
    let dest = tempdir().unwrap();
    let manifest = write_manifest(work.path(), &files, false);

    let first = clone(origin.base(), &manifest, dest.path()).await.unwrap();
    assert_eq!(first.counters.succeeded, 12);
    assert_eq!(first.counters.errored, 0);
    assert_eq!(origin.gets(), 12);
    for (path, body) in &files {
        assert_eq!(&std::fs::read(dest.path().join(path)).unwrap(), body);
    }

    let second = clone(origin.base(), &manifest, dest.path()).await.unwrap();
    assert_eq!(second.counters.skipped, 12);
    assert_eq!(second.counters.succeeded, 0);
    assert_eq!(origin.gets(), 12, "unchanged files must not be fetched again");
    assert_eq!(origin.heads(), 12);
}

#[tokio::test]
async fn manifest_hash_matches_etag() {
    let files = files(4);
    let origin = origin_server::start(&files);
    let work = tempdir().unwrap();
    let dest = tempdir().unwrap();
    let manifest = write_manifest(work.path(), &files, true);

    clone(origin.base(), &manifest, dest.path()).await.unwrap();
    let again = clone(origin.base(), &manifest, dest.path()).await.unwrap();

    assert_eq!(again.counters.skipped, 4);
    assert_eq!(origin.gets(), 4);
}

#[tokio::test]
async fn transient_server_errors_are_recovered_by_the_retry_pass() {
    let files = files(8);
    let flaky = files[5].0.clone();
    let origin = origin_server::start_failing(&files, &[flaky.as_str()], 1);
    let work = tempdir().unwrap();
    let dest = tempdir().unwrap();
    let manifest = write_manifest(work.path(), &files, false);

    let summary = clone(origin.base(), &manifest, dest.path()).await.unwrap();

    assert_eq!(summary.retried, 1);
    assert_eq!(summary.counters.succeeded, 8);
    assert_eq!(summary.counters.errored, 0);
    assert_eq!(summary.counters.scheduled, 9);
    assert!(dest.path().join(&flaky).is_file());
}

#[tokio::test]
async fn missing_files_over_budget_abort_the_job() {
    let files = files(4);
    let origin = origin_server::start(&files[..2]);
    let work = tempdir().unwrap();
    let dest = tempdir().unwrap();
    let manifest = write_manifest(work.path(), &files, false);

    let err = clone(origin.base(), &manifest, dest.path()).await.unwrap_err();

    assert!(matches!(err, CloneError::BudgetExceeded { failed: 2, scheduled: 4, .. }));
    assert!(err.to_string().starts_with("E_EXCESSIVE_ERRORS"));
    assert_eq!(origin.gets(), 4);
}

#[tokio::test]
async fn missing_manifest_is_an_error() {
    let dest = tempdir().unwrap();
    let err = clone("http://127.0.0.1:9/", Path::new("/nonexistent/meta.csv"), dest.path())
        .await
        .unwrap_err();
    assert!(matches!(err, CloneError::Manifest(_)));
}
