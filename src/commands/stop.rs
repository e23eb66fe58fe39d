use anyhow::Result;
use std::thread;
use std::time::{Duration, Instant};

use crate::commands::CommandReport;
use crate::storm::paths::resolve_paths;
use crate::storm::watcher;

const STOP_TIMEOUT: Duration = Duration::from_secs(8);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("stop");
    let lock_path = watcher::daemon_lock_path(&paths);
    report.detail(format!("daemon_lock={}", lock_path.display()));

    if !watcher::daemon_running(&paths)? {
        report.detail("storm watcher daemon already stopped (lock not held)");
        return Ok(report);
    }

    match watcher::read_lock_pid(&lock_path) {
        Ok(pid) => report.detail(format!("daemon_pid={pid}")),
        Err(err) => report.detail(format!("daemon pid unavailable: {err:#}")),
    }

    let stop_file = watcher::request_stop(&paths)?;
    report.detail(format!("stop_request={}", stop_file.display()));

    let deadline = Instant::now() + STOP_TIMEOUT;
    while Instant::now() < deadline {
        if !watcher::daemon_running(&paths)? {
            report.detail("stopped storm watcher daemon");
            return Ok(report);
        }
        thread::sleep(STOP_POLL_INTERVAL);
    }

    report.issue(format!(
        "timed out waiting for watcher daemon to stop after {}s (a cycle may still be ingesting)",
        STOP_TIMEOUT.as_secs()
    ));
    Ok(report)
}
