use crate::error::StormError;
use crate::storm::record::{EventRecord, parse_snapshot_id, parse_source_document};
use crate::storm::store::{RecordStore, UpsertOutcome};
use crate::storm::util::sha256_hex;
use crate::storm::warn::{self, WarnEvent};
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub root: PathBuf,
    pub info_subdir: String,
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestIssue {
    pub path: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestOutcome {
    pub snapshots_seen: usize,
    pub snapshots_skipped: usize,
    pub files_seen: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub interrupted: bool,
    pub issues: Vec<IngestIssue>,
}

impl IngestOutcome {
    fn merge(&mut self, other: IngestOutcome) {
        self.snapshots_seen += other.snapshots_seen;
        self.snapshots_skipped += other.snapshots_skipped;
        self.files_seen += other.files_seen;
        self.inserted += other.inserted;
        self.replaced += other.replaced;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
        self.interrupted |= other.interrupted;
        self.issues.extend(other.issues);
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Replaced => self.replaced += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    fn issue(&mut self, stage: &str, path: &Path, kind: &str, message: String) {
        let target = path.display().to_string();
        warn::emit(WarnEvent {
            code: "INGEST_ITEM_SKIPPED",
            stage,
            action: "skip",
            target: &target,
            reason: kind,
            err: &message,
        });
        self.issues.push(IngestIssue {
            path: target,
            kind: kind.to_string(),
            message,
        });
    }

    pub fn degraded(&self) -> bool {
        self.failed > 0 || self.snapshots_skipped > 0
    }
}

/// Sorted directory entries, plus the entries that could not be read.
#[derive(Debug, Default)]
struct Listing {
    paths: Vec<PathBuf>,
    unreadable: Vec<std::io::Error>,
}

fn collect_entries<I>(entries: I, keep: impl Fn(&Path) -> bool) -> Listing
where
    I: IntoIterator<Item = std::io::Result<PathBuf>>,
{
    let mut listing = Listing::default();
    for entry in entries {
        match entry {
            Ok(path) if keep(&path) => listing.paths.push(path),
            Ok(_) => {}
            Err(err) => listing.unreadable.push(err),
        }
    }
    listing.paths.sort();
    listing
}

fn list_dir(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Listing> {
    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    Ok(collect_entries(
        entries.map(|entry| entry.map(|e| e.path())),
        keep,
    ))
}

fn is_json_file(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json")
}

enum FileFailure {
    Item(StormError),
    Store(anyhow::Error),
}

fn ingest_file(
    store: &dyn RecordStore,
    path: &Path,
    snapshot_id: &str,
    snapshot_timestamp: NaiveDateTime,
) -> Result<UpsertOutcome, FileFailure> {
    let context = path.display().to_string();
    let bytes = fs::read(path).map_err(|err| FileFailure::Item(StormError::parse(&context, err)))?;
    let raw = std::str::from_utf8(&bytes)
        .map_err(|err| FileFailure::Item(StormError::parse(&context, err)))?;

    let document = parse_source_document(raw, &context).map_err(FileFailure::Item)?;
    let record = EventRecord::from_source(
        document,
        snapshot_id,
        snapshot_timestamp,
        Some(sha256_hex(&bytes)),
        &context,
    )
    .map_err(FileFailure::Item)?;

    store.upsert(&record).map_err(FileFailure::Store)
}

/// Ingest every event file of one snapshot directory.
pub fn ingest_snapshot(
    store: &dyn RecordStore,
    snapshot_dir: &Path,
    info_subdir: &str,
    should_stop: &(dyn Fn() -> bool + Sync),
) -> IngestOutcome {
    let mut out = IngestOutcome {
        snapshots_seen: 1,
        ..IngestOutcome::default()
    };

    let Some(snapshot_id) = snapshot_dir.file_name().and_then(|n| n.to_str()) else {
        out.snapshots_skipped += 1;
        out.issue(
            "snapshot",
            snapshot_dir,
            "parse",
            "snapshot folder name is not valid UTF-8".to_string(),
        );
        return out;
    };

    let snapshot_timestamp = match parse_snapshot_id(snapshot_id) {
        Ok(ts) => ts,
        Err(err) => {
            out.snapshots_skipped += 1;
            out.issue("snapshot", snapshot_dir, err.kind(), err.to_string());
            return out;
        }
    };

    let info_dir = snapshot_dir.join(info_subdir);
    if !info_dir.is_dir() {
        out.snapshots_skipped += 1;
        out.issue(
            "snapshot",
            snapshot_dir,
            "missing-info-dir",
            format!("no `{info_subdir}` directory in snapshot"),
        );
        return out;
    }

    let listing = match list_dir(&info_dir, is_json_file) {
        Ok(listing) => listing,
        Err(err) => {
            out.snapshots_skipped += 1;
            out.issue("snapshot", &info_dir, "io", format!("{err:#}"));
            return out;
        }
    };
    for err in listing.unreadable {
        out.failed += 1;
        out.issue("file", &info_dir, "io", format!("unreadable entry: {err}"));
    }
    let files = listing.paths;

    for file in files {
        if should_stop() {
            out.interrupted = true;
            break;
        }
        out.files_seen += 1;

        match ingest_file(store, &file, snapshot_id, snapshot_timestamp) {
            Ok(outcome) => {
                tracing::debug!(file = %file.display(), ?outcome, "event record upserted");
                out.record(outcome);
            }
            Err(FileFailure::Item(err)) => {
                out.failed += 1;
                out.issue("file", &file, err.kind(), err.to_string());
            }
            Err(FileFailure::Store(err)) => {
                out.failed += 1;
                out.issue("file", &file, "store", format!("{err:#}"));
            }
        }
    }

    tracing::info!(
        snapshot = snapshot_id,
        files = out.files_seen,
        inserted = out.inserted,
        replaced = out.replaced,
        unchanged = out.unchanged,
        failed = out.failed,
        "snapshot ingested"
    );
    out
}

fn ingest_dirs(
    store: &dyn RecordStore,
    dirs: &[PathBuf],
    info_subdir: &str,
    should_stop: &(dyn Fn() -> bool + Sync),
) -> IngestOutcome {
    let mut out = IngestOutcome::default();
    for dir in dirs {
        if should_stop() {
            out.interrupted = true;
            break;
        }
        let snapshot = ingest_snapshot(store, dir, info_subdir, should_stop);
        let interrupted = snapshot.interrupted;
        out.merge(snapshot);
        if interrupted {
            break;
        }
    }
    out
}

/// Walk `opts.root` and upsert every snapshot's event files.
///
/// Per-directory, per-entry, and per-file failures are collected in the
/// outcome; only an unreadable root fails the whole pass. Re-running over an unchanged tree
/// reports every record as `unchanged`. `should_stop` is polled between files
/// and between directories.
pub fn ingest_tree(
    store: &dyn RecordStore,
    opts: &IngestOptions,
    should_stop: &(dyn Fn() -> bool + Sync),
) -> Result<IngestOutcome> {
    let listing = list_dir(&opts.root, Path::is_dir)?;
    let mut out = IngestOutcome::default();
    for err in listing.unreadable {
        out.snapshots_skipped += 1;
        out.issue("snapshot", &opts.root, "io", format!("unreadable entry: {err}"));
    }

    let dirs = listing.paths;
    let workers = opts.workers.max(1).min(dirs.len().max(1));
    if workers == 1 {
        out.merge(ingest_dirs(store, &dirs, &opts.info_subdir, should_stop));
        return Ok(out);
    }

    let chunk_size = dirs.len().div_ceil(workers);
    let results = std::thread::scope(|scope| {
        let handles = dirs
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || ingest_dirs(store, chunk, &opts.info_subdir, should_stop))
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| anyhow!("ingest worker panicked")))
            .collect::<Result<Vec<_>>>()
    })?;

    for part in results {
        out.merge(part);
    }
    Ok(out)
}
