use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StormPaths {
    pub storm_home: PathBuf,
    pub data_dir: PathBuf,
    pub store_dir: PathBuf,
    pub predictions_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl StormPaths {
    /// Layout rooted at a single directory; used by tests and `--root`-style callers.
    pub fn under(root: &Path) -> Self {
        Self {
            storm_home: root.to_path_buf(),
            data_dir: root.join("data"),
            store_dir: root.join("store"),
            predictions_dir: root.join("predictions"),
            logs_dir: root.join("logs"),
        }
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<StormPaths> {
    let storm_home = match env::var("STORM_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join("stormtrack"),
    };

    let data_dir = env_or_default_path("STORM_DATA_DIR", storm_home.join("data"));
    let store_dir = env_or_default_path("STORM_STORE_DIR", storm_home.join("store"));
    let predictions_dir =
        env_or_default_path("STORM_PREDICTIONS_DIR", storm_home.join("predictions"));
    let logs_dir = env_or_default_path("STORM_LOGS_DIR", storm_home.join("logs"));

    Ok(StormPaths {
        storm_home,
        data_dir,
        store_dir,
        predictions_dir,
        logs_dir,
    })
}
