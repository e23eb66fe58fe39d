use anyhow::Result;
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::storm::audit;
use crate::storm::config::load_config;
use crate::storm::file_store::FileRecordStore;
use crate::storm::ingest::{IngestOptions, ingest_tree};
use crate::storm::paths::resolve_paths;

#[derive(Debug, Clone, Default)]
pub struct IngestCommandOptions {
    pub root: Option<PathBuf>,
}

pub fn run(opts: &IngestCommandOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("ingest");

    let root = opts.root.clone().unwrap_or_else(|| paths.data_dir.clone());
    report.detail(format!("root={}", root.display()));
    report.detail(format!("store_dir={}", paths.store_dir.display()));

    if !root.is_dir() {
        let message = format!("snapshot root not found: {}", root.display());
        audit::append_event(&paths, "ingest", "failed", &message)?;
        report.issue(message);
        return Ok(report);
    }

    let store = FileRecordStore::open(&paths.store_dir)?;
    let ingest_opts = IngestOptions {
        root,
        info_subdir: cfg.ingest.info_subdir.clone(),
        workers: cfg.ingest.workers,
    };
    let outcome = ingest_tree(&store, &ingest_opts, &|| false)?;

    report.detail(format!("snapshots_seen={}", outcome.snapshots_seen));
    report.detail(format!("snapshots_skipped={}", outcome.snapshots_skipped));
    report.detail(format!("files_seen={}", outcome.files_seen));
    report.detail(format!("inserted={}", outcome.inserted));
    report.detail(format!("replaced={}", outcome.replaced));
    report.detail(format!("unchanged={}", outcome.unchanged));
    report.detail(format!("failed={}", outcome.failed));
    for issue in &outcome.issues {
        report.detail(format!(
            "skipped path={} kind={} message={}",
            issue.path, issue.kind, issue.message
        ));
    }

    let status = if outcome.degraded() { "degraded" } else { "ok" };
    audit::append_event(
        &paths,
        "ingest",
        status,
        &format!(
            "inserted={} replaced={} unchanged={} failed={}",
            outcome.inserted, outcome.replaced, outcome.unchanged, outcome.failed
        ),
    )?;

    Ok(report)
}
