use anyhow::Result;

use crate::commands::CommandReport;
use crate::storm::config::load_config;
use crate::storm::paths::resolve_paths;
use crate::storm::watcher;

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub once: bool,
    pub daemon: bool,
}

pub fn run(opts: &WatchOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");

    if opts.once && opts.daemon {
        report.issue("invalid flags: use only one of --once or --daemon");
        return Ok(report);
    }

    let paths = resolve_paths()?;
    let cfg = load_config()?;

    if opts.daemon {
        let summary = watcher::run_daemon(&paths, &cfg)?;
        report.detail("storm watcher daemon stopped");
        report.detail(format!("cycles={}", summary.cycles));
        report.detail(format!("failed_cycles={}", summary.failed_cycles));
        report.detail(format!("stopped_by_request={}", summary.stopped_by_request));
        return Ok(report);
    }

    let cycle = watcher::run_once(&paths, &cfg)?;
    report.detail("storm watcher cycle completed");
    report.detail(format!("state_file={}", cycle.state_file));
    report.detail(format!("run_epoch_secs={}", cycle.run_epoch_secs));
    report.detail(format!("poll_interval_secs={}", cycle.poll_interval_secs));
    report.detail(format!("ingest.inserted={}", cycle.ingest.inserted));
    report.detail(format!("ingest.replaced={}", cycle.ingest.replaced));
    report.detail(format!("ingest.unchanged={}", cycle.ingest.unchanged));
    report.detail(format!("ingest.failed={}", cycle.ingest.failed));
    for issue in &cycle.ingest.issues {
        report.detail(format!(
            "ingest.skipped path={} kind={}",
            issue.path, issue.kind
        ));
    }

    Ok(report)
}
