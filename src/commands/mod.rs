pub mod events;
pub mod ingest;
pub mod predict;
pub mod status;
pub mod stop;
pub mod watch;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            data: None,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    /// Payload printed on stdout as-is in human mode.
    pub fn set_data<T: Serialize>(&mut self, value: &T) -> anyhow::Result<()> {
        self.data = Some(serde_json::to_value(value)?);
        Ok(())
    }
}
