use crate::storm::audit;
use crate::storm::config::StormConfig;
use crate::storm::file_store::FileRecordStore;
use crate::storm::ingest::{IngestOptions, IngestOutcome, ingest_tree};
use crate::storm::paths::StormPaths;
use crate::storm::state::{load, save};
use crate::storm::store::RecordStore;
use crate::storm::util::now_epoch_secs;
use crate::storm::warn::{self, WarnEvent};
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub const DAEMON_LOCK_FILE: &str = "stormtrack-watch.lock";
pub const STOP_FILE: &str = "stormtrack-watch.stop";
const SLEEP_SLICE: Duration = Duration::from_millis(200);
const LOCK_ATTEMPTS: u32 = 5;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct WatchCycleOutcome {
    pub state_file: String,
    pub run_epoch_secs: u64,
    pub poll_interval_secs: u64,
    pub ingest: IngestOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct DaemonSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub stopped_by_request: bool,
}

pub fn daemon_lock_path(paths: &StormPaths) -> PathBuf {
    paths.logs_dir.join(DAEMON_LOCK_FILE)
}

pub fn stop_file_path(paths: &StormPaths) -> PathBuf {
    paths.logs_dir.join(STOP_FILE)
}

pub fn stop_requested(paths: &StormPaths) -> bool {
    stop_file_path(paths).exists()
}

fn clear_stop_request(paths: &StormPaths) -> Result<()> {
    let path = stop_file_path(paths);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}

/// One ingest pass over the data dir, followed by a state save and an audit line.
pub fn run_cycle(
    paths: &StormPaths,
    cfg: &StormConfig,
    store: &dyn RecordStore,
    should_stop: &(dyn Fn() -> bool + Sync),
) -> Result<WatchCycleOutcome> {
    let opts = IngestOptions {
        root: paths.data_dir.clone(),
        info_subdir: cfg.ingest.info_subdir.clone(),
        workers: cfg.ingest.workers,
    };
    let started = now_epoch_secs()?;
    let ingest = match ingest_tree(store, &opts, should_stop) {
        Ok(outcome) => outcome,
        Err(err) => {
            audit::append_event(paths, "watch", "failed", &format!("{err:#}"))?;
            return Err(err);
        }
    };

    let mut state = load(paths)?;
    state.record_run(started, &ingest);
    let file = save(paths, &state)?;

    let status = if ingest.interrupted {
        "interrupted"
    } else if ingest.degraded() {
        "degraded"
    } else {
        "ok"
    };
    audit::append_event(
        paths,
        "watch",
        status,
        &format!(
            "inserted={} replaced={} unchanged={} failed={} snapshots={}",
            ingest.inserted, ingest.replaced, ingest.unchanged, ingest.failed, ingest.snapshots_seen
        ),
    )?;

    Ok(WatchCycleOutcome {
        state_file: file.display().to_string(),
        run_epoch_secs: started,
        poll_interval_secs: cfg.watcher.poll_interval_secs,
        ingest,
    })
}

pub fn run_once(paths: &StormPaths, cfg: &StormConfig) -> Result<WatchCycleOutcome> {
    let store = FileRecordStore::open(&paths.store_dir)?;
    run_cycle(paths, cfg, &store, &|| false)
}

/// Exclusive hold on the daemon lock file. On drop the pid is cleared and the
/// lock released; the file itself stays so every holder locks the same inode.
pub struct DaemonLock {
    file: File,
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
    }
}

/// Returns `None` when another process already holds the lock. Short retries
/// ride out `daemon_running` checks, which hold a shared lock for an instant.
pub fn acquire_daemon_lock(paths: &StormPaths) -> Result<Option<DaemonLock>> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let path = daemon_lock_path(paths);
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut attempt = 1;
    while FileExt::try_lock_exclusive(&file).is_err() {
        if attempt == LOCK_ATTEMPTS {
            return Ok(None);
        }
        attempt += 1;
        thread::sleep(LOCK_RETRY_DELAY);
    }

    file.set_len(0)
        .with_context(|| format!("failed to truncate {}", path.display()))?;
    writeln!(file, "{}", std::process::id())
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to sync {}", path.display()))?;

    Ok(Some(DaemonLock { file }))
}

/// True while some process holds the daemon lock.
pub fn daemon_running(paths: &StormPaths) -> Result<bool> {
    let path = daemon_lock_path(paths);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to open {}", path.display()));
        }
    };
    if FileExt::try_lock_shared(&file).is_err() {
        return Ok(true);
    }
    let _ = FileExt::unlock(&file);
    Ok(false)
}

pub fn read_lock_pid(path: &Path) -> Result<u32> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let pid_str = raw
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(str::trim)
        .context("daemon lock file is empty")?;
    pid_str
        .parse::<u32>()
        .with_context(|| format!("invalid daemon pid in lock file: {pid_str}"))
}

/// Sleep for `total`, waking every slice to look for a stop request.
/// Returns false when the sleep was cut short.
fn sleep_unless_stopped(paths: &StormPaths, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if stop_requested(paths) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

pub fn run_daemon(paths: &StormPaths, cfg: &StormConfig) -> Result<DaemonSummary> {
    let Some(_lock) = acquire_daemon_lock(paths)? else {
        anyhow::bail!(
            "watcher daemon already running (lock held on {})",
            daemon_lock_path(paths).display()
        );
    };
    clear_stop_request(paths)?;
    let store = FileRecordStore::open(&paths.store_dir)?;
    let should_stop = || stop_requested(paths);
    let poll = Duration::from_secs(cfg.watcher.poll_interval_secs);
    tracing::info!(pid = std::process::id(), poll_secs = poll.as_secs(), "watcher daemon started");

    let mut summary = DaemonSummary::default();
    loop {
        if stop_requested(paths) {
            summary.stopped_by_request = true;
            break;
        }
        match run_cycle(paths, cfg, &store, &should_stop) {
            Ok(cycle) => {
                summary.cycles += 1;
                tracing::info!(
                    inserted = cycle.ingest.inserted,
                    replaced = cycle.ingest.replaced,
                    unchanged = cycle.ingest.unchanged,
                    failed = cycle.ingest.failed,
                    "watch cycle completed"
                );
            }
            Err(err) => {
                summary.failed_cycles += 1;
                warn::emit(WarnEvent {
                    code: "WATCH_CYCLE_FAILED",
                    stage: "watch",
                    action: "retry-next-cycle",
                    target: &paths.data_dir.display().to_string(),
                    reason: "ingest-failed",
                    err: &format!("{err:#}"),
                });
            }
        }
        if !sleep_unless_stopped(paths, poll) {
            summary.stopped_by_request = true;
            break;
        }
    }

    clear_stop_request(paths)?;
    audit::append_event(
        paths,
        "watch",
        "stopped",
        &format!("cycles={} failed_cycles={}", summary.cycles, summary.failed_cycles),
    )?;
    tracing::info!(cycles = summary.cycles, "watcher daemon stopped");
    Ok(summary)
}

/// Ask a running daemon to exit; the daemon removes the file on shutdown.
pub fn request_stop(paths: &StormPaths) -> Result<PathBuf> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let path = stop_file_path(paths);
    fs::write(&path, format!("{}\n", now_epoch_secs()?))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
