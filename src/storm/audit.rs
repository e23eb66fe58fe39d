use crate::storm::paths::StormPaths;
use crate::storm::util::{append_json_line, now_epoch_secs};
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub phase: String,
    pub status: String,
    pub message: String,
}

pub fn append_event(paths: &StormPaths, phase: &str, status: &str, message: &str) -> Result<()> {
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        phase: phase.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };
    append_json_line(&paths.logs_dir.join("audit.log"), &event)
}
