//! The side-effecting work behind each pipeline state.
//!
//! [`UpdateOrchestrator`](crate::UpdateOrchestrator) owns the state machine;
//! an [`UpdateSteps`] implementation performs the work. Any `Err` returned
//! from a step is an ordinary update failure, not a fault.

mod filesystem;
mod shell;

pub use filesystem::FilesystemSteps;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use module_resolver::SemanticVersion;

use crate::Result;
use crate::release::ReleaseInfo;

/// Identifies the module update a step is working on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub module: String,
    pub from_version: SemanticVersion,
    pub to_version: SemanticVersion,
    /// Installed module directory.
    pub module_path: PathBuf,
}

#[async_trait]
pub trait UpdateSteps: Send + Sync {
    /// Fetch the release archive; returns its local path.
    async fn download(&self, ctx: &StepContext, release: &ReleaseInfo) -> Result<PathBuf>;

    async fn verify(&self, ctx: &StepContext, release: &ReleaseInfo, archive: &Path)
    -> Result<()>;

    /// Snapshot the installed module; returns the backup location.
    async fn backup(&self, ctx: &StepContext) -> Result<PathBuf>;

    async fn apply(&self, ctx: &StepContext, archive: &Path) -> Result<()>;

    /// Run pending migrations; returns how many ran.
    async fn migrate(&self, ctx: &StepContext) -> Result<usize>;

    async fn seed(&self, ctx: &StepContext) -> Result<()>;

    async fn health_check(&self, ctx: &StepContext) -> Result<()>;

    async fn restore(&self, ctx: &StepContext, backup: &Path) -> Result<()>;

    /// Migrations present in the installed module but not yet run.
    async fn pending_migrations(&self, ctx: &StepContext) -> Result<usize>;

    /// Remove staged artifacts. Called after every attempt.
    async fn cleanup(&self, ctx: &StepContext, archive: Option<&Path>) -> Result<()>;
}
