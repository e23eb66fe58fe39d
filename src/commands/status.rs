use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::storm::config::load_config;
use crate::storm::file_store::FileRecordStore;
use crate::storm::paths::resolve_paths;
use crate::storm::state;
use crate::storm::store::RecordStore;
use crate::storm::watcher;

/// Every `STORM_*` variable the binary reads, with the module that reads it.
pub const STORM_ENV_VARS: &[(&str, &str)] = &[
    ("STORM_CONFIG_PATH", "config"),
    ("STORM_DATA_DIR", "paths"),
    ("STORM_FORECAST_KEYWORD", "config"),
    ("STORM_HOME", "paths"),
    ("STORM_HORIZON_HOURS", "config"),
    ("STORM_IMAGES_URL_PREFIX", "config"),
    ("STORM_INFO_SUBDIR", "config"),
    ("STORM_INGEST_WORKERS", "config"),
    ("STORM_LEGACY_KEY_SPLIT", "config"),
    ("STORM_LOG", "logging"),
    ("STORM_LOGS_DIR", "paths"),
    ("STORM_LOG_FORMAT", "config"),
    ("STORM_MAPS_SUBDIR", "config"),
    ("STORM_MODEL_KEYWORD", "config"),
    ("STORM_POLL_INTERVAL_SECS", "config"),
    ("STORM_PREDICTIONS_DIR", "paths"),
    ("STORM_PROJECTION_WINDOW", "config"),
    ("STORM_STORE_DIR", "paths"),
];

fn is_known(key: &str) -> bool {
    STORM_ENV_VARS.iter().any(|(known, _)| *known == key)
}

/// `STORM_*` variables that are set but never read by this binary.
pub fn unknown_storm_vars<I>(vars: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut unknown = vars
        .into_iter()
        .filter(|key| key.starts_with("STORM_"))
        .filter(|key| !is_known(key))
        .collect::<Vec<_>>();
    unknown.sort();
    unknown
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("storm_home={}", paths.storm_home.display()));
    report.detail(format!("data_dir={}", paths.data_dir.display()));
    report.detail(format!("store_dir={}", paths.store_dir.display()));
    report.detail(format!("predictions_dir={}", paths.predictions_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));

    match load_config() {
        Ok(cfg) => {
            report.detail(format!("ingest.info_subdir={}", cfg.ingest.info_subdir));
            report.detail(format!("ingest.maps_subdir={}", cfg.ingest.maps_subdir));
            report.detail(format!("ingest.workers={}", cfg.ingest.workers));
            report.detail(format!(
                "projection.default_horizon_hours={}",
                cfg.projection.default_horizon_hours
            ));
            report.detail(format!("projection.window={}", cfg.projection.window));
            report.detail(format!(
                "watcher.poll_interval_secs={}",
                cfg.watcher.poll_interval_secs
            ));
        }
        Err(err) => report.issue(format!("invalid config: {err:#}")),
    }

    if !paths.data_dir.is_dir() {
        report.issue(format!(
            "missing snapshot root ({}); set STORM_DATA_DIR",
            paths.data_dir.display()
        ));
    }

    if paths.store_dir.is_dir() {
        let store = FileRecordStore::open(&paths.store_dir)?;
        report.detail(format!("store.records={}", store.count()?));
    } else {
        report.detail("store.records=0");
    }

    let ingest_state = state::load(&paths)?;
    report.detail(format!("state.runs={}", ingest_state.runs));
    report.detail(format!(
        "state.last_run_epoch_secs={}",
        ingest_state.last_run_epoch_secs
    ));
    report.detail(format!(
        "watcher.daemon_running={}",
        watcher::daemon_running(&paths)?
    ));

    for (key, reader) in STORM_ENV_VARS {
        if env::var_os(key).is_some() {
            report.detail(format!("env.{key} read_by={reader}"));
        }
    }
    for key in unknown_storm_vars(env::vars().map(|(k, _)| k)) {
        report.issue(format!("unknown environment variable {key} (typo?)"));
    }

    Ok(report)
}
