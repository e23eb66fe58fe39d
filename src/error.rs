use thiserror::Error;

/// Failure taxonomy shared by ingestion, queries, and projection.
///
/// Ingestion turns `Parse` and `MissingKey` into per-item issues and keeps
/// going; projection surfaces `InsufficientHistory` and `NotFound` to the
/// caller unchanged.
#[derive(Debug, Error)]
pub enum StormError {
    #[error("parse error in {context}: {message}")]
    Parse { context: String, message: String },
    #[error("{context} has no usable `{field}` field")]
    MissingKey {
        context: String,
        field: &'static str,
    },
    #[error("insufficient history: need at least 2 track points, got {points}")]
    InsufficientHistory { points: usize },
    #[error("horizon of {requested} hours exceeds the {max}-hour limit")]
    HorizonOutOfRange { requested: u32, max: u32 },
    #[error("not found: {0}")]
    NotFound(String),
}

impl StormError {
    pub fn parse(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::MissingKey { .. } => "missing-key",
            Self::InsufficientHistory { .. } => "insufficient-history",
            Self::HorizonOutOfRange { .. } => "horizon-out-of-range",
            Self::NotFound(_) => "not-found",
        }
    }
}
