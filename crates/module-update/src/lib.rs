//! Update orchestration for platform modules.
//!
//! - [`UpdateChecker`] asks a [`ReleaseChecker`] for newer releases and caches
//!   the answer
//! - [`UpdateOrchestrator`] drives one module through the [`UpdateStatus`]
//!   state machine, recording every transition in a [`HistoryStore`]
//! - [`BatchCoordinator`] updates many modules in dependency order
//! - [`JobQueue`] runs the work as jobs with a uniqueness key, timeout and
//!   retry policy

pub mod backup;
pub mod batch;
pub mod checker;
pub mod config;
pub mod error;
pub mod history;
pub mod jobs;
pub mod orchestrator;
pub mod release;
pub mod status;
pub mod steps;

use std::sync::Arc;

use module_resolver::ModuleRegistry;
use tokio::sync::RwLock;

/// The process-wide registry, constructed once and injected where needed.
pub type SharedRegistry = Arc<RwLock<ModuleRegistry>>;

pub fn shared_registry(registry: ModuleRegistry) -> SharedRegistry {
    Arc::new(RwLock::new(registry))
}

pub use backup::{BackupManager, BackupMetadata, ModuleBackup};
pub use batch::{BatchCoordinator, BatchReport};
pub use checker::{AvailableUpdate, UpdateChecker};
pub use config::ManagerConfig;
pub use error::{Error, Result};
pub use history::{
    FileHistoryStore, HistoryStore, MemoryHistoryStore, UpdateHistoryRecord, UpdateLogEntry,
    reap_abandoned,
};
pub use jobs::{
    BackoffPolicy, BatchUpdateJob, CheckUpdatesJob, Job, JobQueue, JobSpec, KeyGuard,
    UpdateModuleJob,
};
pub use orchestrator::{UpdateOrchestrator, UpdatePreview, UpdateResult};
pub use release::{GithubReleaseChecker, ReleaseChecker, ReleaseInfo};
pub use status::UpdateStatus;
pub use steps::{FilesystemSteps, StepContext, UpdateSteps};
