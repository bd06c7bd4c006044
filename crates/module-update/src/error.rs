//! Error types for module-update

use uuid::Uuid;

use crate::status::UpdateStatus;

/// Result type for module-update operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while checking for or applying updates
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Resolver(#[from] module_resolver::Error),

    #[error(transparent)]
    Fs(#[from] module_fs::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("No release found for module {0}")]
    ReleaseNotFound(String),

    #[error("Invalid release payload: {0}")]
    InvalidRelease(String),

    #[error("Release host returned {status} for {url}")]
    ReleaseHost { url: String, status: u16 },

    #[error("{step} failed: {message}")]
    Step { step: &'static str, message: String },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: UpdateStatus, to: UpdateStatus },

    #[error("Update history record not found: {0}")]
    HistoryNotFound(Uuid),

    #[error("Job {name} is already running (unique key {key})")]
    JobAlreadyRunning { name: String, key: String },

    #[error("Job {name} timed out after {seconds}s")]
    JobTimedOut { name: String, seconds: u64 },
}

impl Error {
    pub fn step(step: &'static str, message: impl Into<String>) -> Self {
        Self::Step {
            step,
            message: message.into(),
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Only network and I/O faults qualify; parse errors and business
    /// failures will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Io(_) => true,
            Self::ReleaseHost { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
