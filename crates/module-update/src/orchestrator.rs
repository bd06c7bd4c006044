//! Drives one module through the update state machine.
//!
//! ```text
//! Pending → Downloading → Verifying → BackingUp → Applying → Migrating
//!         → Seeding → HealthChecking → Completed
//! ```
//!
//! Any non-terminal state may fail. Once a backup exists (Applying onwards)
//! a failure restores it and ends in `RolledBack`; if the restore itself
//! fails the record ends in `Failed`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use module_resolver::{Environment, ModuleRecord, SemanticVersion};
use serde::Serialize;
use uuid::Uuid;

use crate::SharedRegistry;
use crate::checker::UpdateChecker;
use crate::error::{Error, Result};
use crate::history::{HistoryStore, UpdateHistoryRecord, UpdateLogEntry};
use crate::release::ReleaseInfo;
use crate::status::UpdateStatus;
use crate::steps::{StepContext, UpdateSteps};

/// What an update would do, computed without side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatePreview {
    pub module_name: String,
    pub from_version: SemanticVersion,
    pub to_version: SemanticVersion,
    pub is_major_update: bool,
    pub is_compatible: bool,
    pub unmet_requirements: Vec<String>,
    pub pending_migrations: usize,
    pub release_notes: String,
}

/// Outcome of [`UpdateOrchestrator::update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateResult {
    pub module_name: String,
    pub status: UpdateStatus,
    /// `None` only when the module is not installed.
    pub from_version: Option<SemanticVersion>,
    pub to_version: Option<SemanticVersion>,
    pub error_message: Option<String>,
    pub rolled_back: bool,
    pub history_id: Option<Uuid>,
}

impl UpdateResult {
    /// A failure decided before any history record was written.
    fn rejected(
        module_name: &str,
        from_version: Option<SemanticVersion>,
        to_version: Option<SemanticVersion>,
        message: String,
    ) -> Self {
        tracing::warn!(module = module_name, "{message}");
        Self {
            module_name: module_name.to_string(),
            status: UpdateStatus::Failed,
            from_version,
            to_version,
            error_message: Some(message),
            rolled_back: false,
            history_id: None,
        }
    }

    fn from_record(record: &UpdateHistoryRecord) -> Self {
        Self {
            module_name: record.module_name.clone(),
            status: record.status,
            from_version: Some(record.from_version),
            to_version: Some(record.to_version),
            error_message: record.error_message.clone(),
            rolled_back: record.status == UpdateStatus::RolledBack,
            history_id: Some(record.id),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == UpdateStatus::Completed
    }
}

/// Why the pipeline stopped early.
enum Interrupt {
    /// A step failed; recorded on the history record.
    Step(Error),
    /// The history store or state machine itself failed; propagated.
    Fault(Error),
}

/// Runs updates against an injected registry, release source, step
/// implementation and history store.
pub struct UpdateOrchestrator {
    registry: SharedRegistry,
    checker: Arc<UpdateChecker>,
    steps: Arc<dyn UpdateSteps>,
    history: Arc<dyn HistoryStore>,
    environment: Environment,
    modules_dir: PathBuf,
    force: bool,
}

impl UpdateOrchestrator {
    pub fn new(
        registry: SharedRegistry,
        checker: Arc<UpdateChecker>,
        steps: Arc<dyn UpdateSteps>,
        history: Arc<dyn HistoryStore>,
        environment: Environment,
    ) -> Self {
        Self {
            registry,
            checker,
            steps,
            history,
            environment,
            modules_dir: PathBuf::from("modules"),
            force: false,
        }
    }

    /// Directory used for modules discovered without a path.
    pub fn with_modules_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.modules_dir = dir.into();
        self
    }

    /// Skip the newer-version and requirement checks.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Describe the update of `name` without changing anything.
    pub async fn preview(&self, name: &str) -> Result<UpdatePreview> {
        let (record, env) = self.snapshot(name).await;
        let record = record.ok_or_else(|| Error::ModuleNotFound(name.to_string()))?;
        let release = self
            .checker
            .release_for(name)
            .await?
            .ok_or_else(|| Error::ReleaseNotFound(name.to_string()))?;

        let unmet = record.requirements.unsatisfied(&env);
        let ctx = self.context(&record, &release);
        let pending_migrations = self.steps.pending_migrations(&ctx).await?;

        Ok(UpdatePreview {
            module_name: name.to_string(),
            from_version: record.version,
            to_version: release.version,
            is_major_update: release.is_major_upgrade_from(&record.version),
            is_compatible: unmet.is_empty(),
            unmet_requirements: unmet,
            pending_migrations,
            release_notes: release.notes,
        })
    }

    /// Run the full pipeline for `name` to a terminal state.
    ///
    /// Business failures are reported in the returned [`UpdateResult`]. `Err`
    /// means the history store or the state machine itself failed.
    pub async fn update(&self, name: &str) -> Result<UpdateResult> {
        let (record, env) = self.snapshot(name).await;
        let Some(record) = record else {
            return Ok(UpdateResult::rejected(
                name,
                None,
                None,
                format!("Module not found: {name}"),
            ));
        };

        let release = match self.checker.release_for(name).await {
            Ok(Some(release)) => release,
            Ok(None) => {
                return Ok(UpdateResult::rejected(
                    name,
                    Some(record.version),
                    None,
                    format!("No release available for module {name}"),
                ));
            }
            Err(e) => {
                return Ok(UpdateResult::rejected(
                    name,
                    Some(record.version),
                    None,
                    format!("Release lookup for module {name} failed: {e}"),
                ));
            }
        };

        if !self.force && !release.is_newer_than(&record.version) {
            return Ok(UpdateResult::rejected(
                name,
                Some(record.version),
                Some(release.version),
                format!(
                    "Module {name} is up to date ({} installed, {} released)",
                    record.version, release.version
                ),
            ));
        }

        self.run(record, release, &env).await
    }

    async fn run(
        &self,
        module: ModuleRecord,
        release: ReleaseInfo,
        env: &Environment,
    ) -> Result<UpdateResult> {
        let mut record =
            UpdateHistoryRecord::new(module.name.as_str(), module.version, release.version);
        self.history.create(&record)?;
        self.history.append_log(
            record.id,
            UpdateLogEntry::new(UpdateStatus::Pending.step(), UpdateStatus::Pending)
                .with_message(format!("Updating {} to {}", module.version, release.version))
                .with_context(serde_json::json!({ "tag": release.tag, "force": self.force })),
        )?;
        tracing::info!(
            module = %module.name,
            from = %module.version,
            to = %release.version,
            id = %record.id,
            "Starting update"
        );

        let unmet = module.requirements.unsatisfied(env);
        if !unmet.is_empty() {
            if self.force {
                tracing::warn!(module = %module.name, ?unmet, "Ignoring unmet requirements");
            } else {
                record.error_message = Some(format!("Unmet requirements: {}", unmet.join("; ")));
                self.transition(&mut record, UpdateStatus::Failed, None, None)?;
                return Ok(UpdateResult::from_record(&record));
            }
        }

        let ctx = self.context(&module, &release);
        let mut archive = None;
        let outcome = self
            .pipeline(&mut record, &ctx, &release, &mut archive)
            .await;

        let result = match outcome {
            Ok(()) => self.complete(&mut record, &ctx).await,
            Err(Interrupt::Step(e)) => self.fail(&mut record, &ctx, e).await,
            Err(Interrupt::Fault(e)) => Err(e),
        };

        if let Err(e) = self.steps.cleanup(&ctx, archive.as_deref()).await {
            tracing::warn!(module = %ctx.module, error = %e, "Cleanup failed");
        }

        result?;
        tracing::info!(module = %ctx.module, status = %record.status, "Update finished");
        Ok(UpdateResult::from_record(&record))
    }

    async fn pipeline(
        &self,
        record: &mut UpdateHistoryRecord,
        ctx: &StepContext,
        release: &ReleaseInfo,
        archive: &mut Option<PathBuf>,
    ) -> std::result::Result<(), Interrupt> {
        self.advance(record, UpdateStatus::Downloading, Some(&release.download_url))?;
        let downloaded = self
            .steps
            .download(ctx, release)
            .await
            .map_err(Interrupt::Step)?;
        let archive_path: &Path = archive.insert(downloaded);

        self.advance(record, UpdateStatus::Verifying, None)?;
        self.steps
            .verify(ctx, release, archive_path)
            .await
            .map_err(Interrupt::Step)?;

        self.advance(record, UpdateStatus::BackingUp, None)?;
        let backup = self.steps.backup(ctx).await.map_err(Interrupt::Step)?;
        record.backup_path = Some(backup);
        self.history.update(record).map_err(Interrupt::Fault)?;

        self.advance(record, UpdateStatus::Applying, None)?;
        self.steps
            .apply(ctx, archive_path)
            .await
            .map_err(Interrupt::Step)?;

        self.advance(record, UpdateStatus::Migrating, None)?;
        let migrated = self.steps.migrate(ctx).await.map_err(Interrupt::Step)?;
        self.history
            .append_log(
                record.id,
                UpdateLogEntry::new(UpdateStatus::Migrating.step(), UpdateStatus::Migrating)
                    .with_message(format!("Ran {migrated} migration(s)"))
                    .with_context(serde_json::json!({ "migrations": migrated })),
            )
            .map_err(Interrupt::Fault)?;

        self.advance(record, UpdateStatus::Seeding, None)?;
        self.steps.seed(ctx).await.map_err(Interrupt::Step)?;

        self.advance(record, UpdateStatus::HealthChecking, None)?;
        self.steps.health_check(ctx).await.map_err(Interrupt::Step)?;

        Ok(())
    }

    fn advance(
        &self,
        record: &mut UpdateHistoryRecord,
        to: UpdateStatus,
        detail: Option<&str>,
    ) -> std::result::Result<(), Interrupt> {
        let message = match detail {
            Some(detail) if !detail.is_empty() => format!("Entering {to}: {detail}"),
            _ => format!("Entering {to}"),
        };
        tracing::info!(module = %record.module_name, step = to.step(), "{message}");
        self.transition(record, to, Some(&message), None)
            .map_err(Interrupt::Fault)
    }

    async fn complete(&self, record: &mut UpdateHistoryRecord, ctx: &StepContext) -> Result<()> {
        self.transition(record, UpdateStatus::Completed, Some("Update completed"), None)?;
        self.registry
            .write()
            .await
            .set_version(&ctx.module, ctx.to_version)?;
        if let Err(e) = self.checker.forget(&ctx.module) {
            tracing::warn!(module = %ctx.module, error = %e, "Could not update the update cache");
        }
        Ok(())
    }

    /// Record a step failure, then roll back if a backup exists.
    async fn fail(
        &self,
        record: &mut UpdateHistoryRecord,
        ctx: &StepContext,
        error: Error,
    ) -> Result<()> {
        let failed_in = record.status;
        let message = error.to_string();
        tracing::warn!(module = %ctx.module, step = failed_in.step(), error = %message, "Update step failed");

        record.error_message = Some(message.clone());
        self.history.update(record)?;
        self.history.append_log(
            record.id,
            UpdateLogEntry::new(failed_in.step(), failed_in).with_message(message),
        )?;

        let backup = record.backup_path.clone();
        match backup {
            Some(backup) if failed_in.can_roll_back() => {
                match self.steps.restore(ctx, &backup).await {
                    Ok(()) => self.transition(
                        record,
                        UpdateStatus::RolledBack,
                        Some("Restored previous version from backup"),
                        Some(serde_json::json!({ "backup_path": backup })),
                    ),
                    Err(e) => {
                        tracing::warn!(module = %ctx.module, error = %e, "Rollback failed");
                        self.history.append_log(
                            record.id,
                            UpdateLogEntry::new(UpdateStatus::RolledBack.step(), failed_in)
                                .with_message(format!("Rollback failed: {e}")),
                        )?;
                        self.transition(record, UpdateStatus::Failed, None, None)
                    }
                }
            }
            _ => self.transition(record, UpdateStatus::Failed, None, None),
        }
    }

    /// Apply a status change, persist it and append exactly one log entry.
    fn transition(
        &self,
        record: &mut UpdateHistoryRecord,
        to: UpdateStatus,
        message: Option<&str>,
        context: Option<serde_json::Value>,
    ) -> Result<()> {
        let from = record.status;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { from, to });
        }
        tracing::debug!(module = %record.module_name, %from, %to, "Transition");

        record.status = to;
        if to.is_terminal() && record.completed_at.is_none() {
            record.completed_at = Some(Utc::now());
        }
        self.history.update(record)?;

        let mut entry = UpdateLogEntry::new(to.step(), to);
        if let Some(message) = message.map(str::to_string).or_else(|| {
            to.is_terminal()
                .then(|| record.error_message.clone())
                .flatten()
        }) {
            entry = entry.with_message(message);
        }
        if let Some(context) = context {
            entry = entry.with_context(context);
        }
        self.history.append_log(record.id, entry)
    }

    /// Clone the module record and build the environment it is checked in.
    async fn snapshot(&self, name: &str) -> (Option<ModuleRecord>, Environment) {
        let registry = self.registry.read().await;
        let env = self
            .environment
            .clone()
            .with_modules(registry.enabled_names());
        (registry.get(name).cloned(), env)
    }

    fn context(&self, record: &ModuleRecord, release: &ReleaseInfo) -> StepContext {
        StepContext {
            module: record.name.to_string(),
            from_version: record.version,
            to_version: release.version,
            module_path: record
                .path
                .clone()
                .unwrap_or_else(|| self.modules_dir.join(record.name.as_str())),
        }
    }
}
