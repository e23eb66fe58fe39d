use crate::storm::projector::MAX_HORIZON_HOURS;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub info_subdir: String,
    pub maps_subdir: String,
    pub workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            info_subdir: "info_generated".to_string(),
            maps_subdir: "maps_generated".to_string(),
            workers: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    pub url_prefix: String,
    pub model_keyword: String,
    pub forecast_keyword: String,
    pub legacy_key_split: bool,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            url_prefix: "/api/maps".to_string(),
            model_keyword: "models".to_string(),
            forecast_keyword: "forecast".to_string(),
            legacy_key_split: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub default_horizon_hours: u32,
    pub window: usize,
    pub artifact_url_prefix: String,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            default_horizon_hours: 48,
            window: crate::storm::projector::DEFAULT_WINDOW,
            artifact_url_prefix: "/api/predictions/artifact".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub poll_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10_800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StormConfig {
    pub ingest: IngestConfig,
    pub images: ImagesConfig,
    pub projection: ProjectionConfig,
    pub watcher: WatcherConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialStormConfig {
    ingest: Option<IngestConfig>,
    images: Option<ImagesConfig>,
    projection: Option<ProjectionConfig>,
    watcher: Option<WatcherConfig>,
    log: Option<LogConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u32(var: &str, fallback: u32) -> u32 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u32>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn is_plain_dir_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && !trimmed.contains('/') && !trimmed.contains('\\') && trimmed != ".."
}

pub fn validate(cfg: &StormConfig) -> Result<()> {
    if !is_plain_dir_name(&cfg.ingest.info_subdir) {
        return Err(anyhow!(
            "invalid ingest info_subdir: must be a single directory name"
        ));
    }
    if !is_plain_dir_name(&cfg.ingest.maps_subdir) {
        return Err(anyhow!(
            "invalid ingest maps_subdir: must be a single directory name"
        ));
    }
    if cfg.ingest.workers == 0 {
        return Err(anyhow!("invalid ingest workers: must be >= 1"));
    }
    if cfg.images.model_keyword.trim().is_empty() || cfg.images.forecast_keyword.trim().is_empty()
    {
        return Err(anyhow!("invalid image keywords: cannot be empty"));
    }
    if cfg.projection.window < 2 {
        return Err(anyhow!("invalid projection window: must be >= 2 points"));
    }
    if cfg.projection.default_horizon_hours == 0
        || cfg.projection.default_horizon_hours > MAX_HORIZON_HOURS
    {
        return Err(anyhow!(
            "invalid projection horizon: must be between 1 and {MAX_HORIZON_HOURS} hours"
        ));
    }
    if cfg.watcher.poll_interval_secs == 0 {
        return Err(anyhow!(
            "invalid watcher poll interval: must be >= 1 second"
        ));
    }
    if cfg.log.format != "pretty" && cfg.log.format != "json" {
        return Err(anyhow!("invalid log format: use `pretty` or `json`"));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("STORM_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".stormtrack").join("stormtrack.toml"))
}

fn merge_toml(base: &mut StormConfig, raw: &str) -> Result<()> {
    let parsed: PartialStormConfig = toml::from_str(raw)?;
    if let Some(ingest) = parsed.ingest {
        base.ingest = ingest;
    }
    if let Some(images) = parsed.images {
        base.images = images;
    }
    if let Some(projection) = parsed.projection {
        base.projection = projection;
    }
    if let Some(watcher) = parsed.watcher {
        base.watcher = watcher;
    }
    if let Some(log) = parsed.log {
        base.log = log;
    }
    Ok(())
}

fn merge_file_config(base: &mut StormConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    merge_toml(base, &raw)
        .map_err(|err| anyhow!("failed to parse storm config {}: {err}", path.display()))
}

pub fn load_config() -> Result<StormConfig> {
    let mut cfg = StormConfig::default();
    merge_file_config(&mut cfg)?;

    cfg.ingest.info_subdir = env_or_string("STORM_INFO_SUBDIR", &cfg.ingest.info_subdir);
    cfg.ingest.maps_subdir = env_or_string("STORM_MAPS_SUBDIR", &cfg.ingest.maps_subdir);
    cfg.ingest.workers = env_or_usize("STORM_INGEST_WORKERS", cfg.ingest.workers);
    cfg.images.url_prefix = env_or_string("STORM_IMAGES_URL_PREFIX", &cfg.images.url_prefix);
    cfg.images.model_keyword = env_or_string("STORM_MODEL_KEYWORD", &cfg.images.model_keyword);
    cfg.images.forecast_keyword =
        env_or_string("STORM_FORECAST_KEYWORD", &cfg.images.forecast_keyword);
    cfg.images.legacy_key_split =
        env_or_bool("STORM_LEGACY_KEY_SPLIT", cfg.images.legacy_key_split);
    cfg.projection.default_horizon_hours = env_or_u32(
        "STORM_HORIZON_HOURS",
        cfg.projection.default_horizon_hours,
    );
    cfg.projection.window = env_or_usize("STORM_PROJECTION_WINDOW", cfg.projection.window);
    cfg.watcher.poll_interval_secs =
        env_or_u64("STORM_POLL_INTERVAL_SECS", cfg.watcher.poll_interval_secs);
    cfg.log.format = env_or_string("STORM_LOG_FORMAT", &cfg.log.format);

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = StormConfig::default();
        validate(&cfg).expect("defaults validate");
        assert_eq!(cfg.projection.window, 6);
        assert_eq!(cfg.projection.default_horizon_hours, 48);
    }

    #[test]
    fn toml_sections_replace_defaults_individually() {
        let mut cfg = StormConfig::default();
        merge_toml(
            &mut cfg,
            r#"
[ingest]
info_subdir = "info_generada"
maps_subdir = "mapas_generados"

[images]
model_keyword = "modelos"
"#,
        )
        .expect("merge");

        assert_eq!(cfg.ingest.info_subdir, "info_generada");
        assert_eq!(cfg.ingest.workers, 1);
        assert_eq!(cfg.images.model_keyword, "modelos");
        assert_eq!(cfg.images.forecast_keyword, "forecast");
        assert_eq!(cfg.watcher.poll_interval_secs, 10_800);
    }

    #[test]
    fn validate_rejects_nested_subdir_and_short_window() {
        let mut cfg = StormConfig::default();
        cfg.ingest.info_subdir = "a/b".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = StormConfig::default();
        cfg.projection.window = 1;
        assert!(validate(&cfg).is_err());

        let mut cfg = StormConfig::default();
        cfg.log.format = "xml".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = StormConfig::default();
        cfg.projection.default_horizon_hours = MAX_HORIZON_HOURS + 1;
        assert!(validate(&cfg).is_err());
    }
}
