use crate::storm::ingest::IngestOutcome;
use crate::storm::paths::StormPaths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestState {
    pub schema_version: u32,
    pub runs: u64,
    pub last_run_epoch_secs: u64,
    pub last_interrupted: bool,
    pub last_inserted: usize,
    pub last_replaced: usize,
    pub last_unchanged: usize,
    pub last_failed: usize,
    pub last_snapshots_seen: usize,
}

impl Default for IngestState {
    fn default() -> Self {
        Self {
            schema_version: 1,
            runs: 0,
            last_run_epoch_secs: 0,
            last_interrupted: false,
            last_inserted: 0,
            last_replaced: 0,
            last_unchanged: 0,
            last_failed: 0,
            last_snapshots_seen: 0,
        }
    }
}

impl IngestState {
    pub fn record_run(&mut self, at_epoch_secs: u64, outcome: &IngestOutcome) {
        self.runs += 1;
        self.last_run_epoch_secs = at_epoch_secs;
        self.last_interrupted = outcome.interrupted;
        self.last_inserted = outcome.inserted;
        self.last_replaced = outcome.replaced;
        self.last_unchanged = outcome.unchanged;
        self.last_failed = outcome.failed;
        self.last_snapshots_seen = outcome.snapshots_seen;
    }
}

pub fn state_file_path(paths: &StormPaths) -> PathBuf {
    paths.storm_home.join("state").join("ingest_state.json")
}

pub fn load(paths: &StormPaths) -> Result<IngestState> {
    let file = state_file_path(paths);
    if !file.exists() {
        return Ok(IngestState::default());
    }

    let raw =
        fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", file.display()))
}

pub fn save(paths: &StormPaths, state: &IngestState) -> Result<PathBuf> {
    let file = state_file_path(paths);
    crate::storm::util::write_json_atomic(&file, state)?;
    Ok(file)
}
