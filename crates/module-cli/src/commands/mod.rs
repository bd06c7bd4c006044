//! Command implementations for module-cli

pub mod check;
pub mod platform;
pub mod update;

pub use check::run_check_updates;
pub use platform::{run_core_check_updates, run_core_version};
pub use update::{UpdateOptions, run_update};

/// How a command ended, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Failed, rolled back or cancelled.
    Failure,
}

impl Outcome {
    pub fn from_success(success: bool) -> Self {
        if success { Self::Success } else { Self::Failure }
    }
}
