//! `treeclone clone` – run one clone job per manifest.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use treeclone_core::config::CloneConfig;
use treeclone_core::engine::{CloneJob, JobSummary, StatusSnapshot};

#[derive(Debug, Clone, Args)]
pub struct CloneArgs {
    /// Manifest CSV files. Each needs a `path` column; `file_hash` is optional.
    #[arg(required = true, value_name = "MANIFEST")]
    pub manifests: Vec<PathBuf>,

    /// Remote root URL the manifest paths are relative to.
    #[arg(long, value_name = "URL")]
    pub source: String,

    /// Local directory to clone into.
    #[arg(long, value_name = "DIR")]
    pub dest: PathBuf,

    /// Number of concurrent workers (overrides `concurrency` in the config).
    #[arg(long, value_name = "N")]
    pub procs: Option<usize>,

    /// Leave entries that already exist locally alone.
    #[arg(long)]
    pub skip_existing: bool,

    /// Re-fetch entries that already exist locally without comparing.
    #[arg(long)]
    pub force_updates: bool,

    /// Abort before retrying when more than this percentage of entries failed.
    #[arg(long, value_name = "PERCENT")]
    pub max_retry_percent: Option<f64>,

    /// Print one JSON summary line per manifest instead of text.
    #[arg(long)]
    pub json: bool,
}

impl CloneArgs {
    /// Apply command-line overrides on top of the config file values.
    pub fn apply(&self, cfg: &mut CloneConfig) {
        if let Some(n) = self.procs {
            cfg.concurrency = n;
        }
        if let Some(p) = self.max_retry_percent {
            cfg.max_retry_percent = p;
        }
        cfg.skip_existing |= self.skip_existing;
        cfg.force_updates |= self.force_updates;
    }
}

pub async fn run_clone(mut cfg: CloneConfig, args: CloneArgs) -> Result<()> {
    args.apply(&mut cfg);
    cfg.validate()?;

    let (status_tx, mut status_rx) = tokio::sync::mpsc::channel::<StatusSnapshot>(16);
    let progress_handle = tokio::spawn(async move {
        while let Some(s) = status_rx.recv().await {
            let c = &s.counters;
            eprintln!(
                "  [{}] scheduled {}  done {}  ok {}  errors {}  skipped {}  to retry {}  workers {}  {:.0}s",
                s.phase,
                c.scheduled,
                c.completed,
                c.succeeded,
                c.errored,
                c.skipped,
                s.queued_retries,
                s.active_workers,
                s.elapsed_secs
            );
        }
    });

    let total = args.manifests.len();
    let mut failed = 0usize;
    for manifest in &args.manifests {
        let result = clone_one(&cfg, &args, manifest, status_tx.clone()).await;
        report(manifest, &result, args.json)?;
        if result.is_err() {
            failed += 1;
        }
    }
    drop(status_tx);
    let _ = progress_handle.await;

    if failed > 0 {
        anyhow::bail!("{} of {} manifest(s) failed", failed, total);
    }
    Ok(())
}

async fn clone_one(
    cfg: &CloneConfig,
    args: &CloneArgs,
    manifest: &Path,
    status_tx: tokio::sync::mpsc::Sender<StatusSnapshot>,
) -> Result<JobSummary> {
    let job = CloneJob::from_config(cfg, args.source.as_str(), &args.dest)?.with_status_sink(status_tx);
    let path = manifest.to_path_buf();
    let summary = tokio::task::spawn_blocking(move || job.run_manifest(&path))
        .await
        .context("clone job did not finish")??;
    Ok(summary)
}

fn report(manifest: &Path, result: &Result<JobSummary>, json: bool) -> Result<()> {
    if json {
        let line = match result {
            Ok(summary) => serde_json::json!({
                "manifest": manifest.display().to_string(),
                "ok": true,
                "summary": summary,
            }),
            Err(err) => serde_json::json!({
                "manifest": manifest.display().to_string(),
                "ok": false,
                "error": format!("{:#}", err),
            }),
        };
        println!("{}", serde_json::to_string(&line)?);
        return Ok(());
    }

    match result {
        Ok(summary) => {
            let c = &summary.counters;
            println!(
                "{}: {} cloned, {} unchanged, {} errors ({} retried, {} recovered) in {:.1}s",
                manifest.display(),
                c.succeeded,
                c.skipped,
                c.errored,
                summary.retried,
                c.recovered,
                summary.elapsed_secs
            );
        }
        Err(err) => {
            tracing::error!("clone of {} failed: {:#}", manifest.display(), err);
            println!("{}: failed: {:#}", manifest.display(), err);
        }
    }
    Ok(())
}
