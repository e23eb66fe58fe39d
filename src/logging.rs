use crate::storm::config::LogConfig;
use std::env;
use tracing_subscriber::EnvFilter;

/// Filter directive: `STORM_LOG`, then `RUST_LOG`, then the configured level.
pub fn filter_directive(config: &LogConfig) -> String {
    for var in ["STORM_LOG", "RUST_LOG"] {
        if let Ok(value) = env::var(var)
            && !value.trim().is_empty()
        {
            return value.trim().to_string();
        }
    }
    config.level.clone()
}

/// Install the global subscriber. Output goes to stderr; stdout carries
/// command results only. A second call is a no-op.
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_new(filter_directive(config))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("logging already initialised");
    }
}
