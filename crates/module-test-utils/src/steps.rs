//! A scripted [`UpdateSteps`] double.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use module_update::{Error, ReleaseInfo, Result, StepContext, UpdateStatus, UpdateSteps};

/// Records every step it is asked to run and fails the one it is told to.
#[derive(Debug, Default)]
pub struct ScriptedSteps {
    fail_at: Option<UpdateStatus>,
    /// Restricts `fail_at` to one module.
    fail_module: Option<String>,
    fail_restore: bool,
    migrations: usize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSteps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the step run while the record is in `status`.
    pub fn failing_at(mut self, status: UpdateStatus) -> Self {
        self.fail_at = Some(status);
        self
    }

    /// Fail only `module`, at `status`; other modules succeed.
    pub fn failing_module_at(mut self, module: &str, status: UpdateStatus) -> Self {
        self.fail_at = Some(status);
        self.fail_module = Some(module.to_string());
        self
    }

    pub fn failing_restore(mut self) -> Self {
        self.fail_restore = true;
        self
    }

    pub fn with_migrations(mut self, count: usize) -> Self {
        self.migrations = count;
        self
    }

    /// `"<step>:<module>"` for every call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Modules that reached the download step.
    pub fn attempted(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|c| c.strip_prefix("download:").map(str::to_string))
            .collect()
    }

    fn record(&self, step: &str, ctx: &StepContext, status: Option<UpdateStatus>) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{step}:{}", ctx.module));
        match status {
            Some(status)
                if self.fail_at == Some(status)
                    && self.fail_module.as_deref().is_none_or(|m| m == ctx.module) =>
            {
                Err(Error::step(status.step(), format!("scripted failure in {step}")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl UpdateSteps for ScriptedSteps {
    async fn download(&self, ctx: &StepContext, _release: &ReleaseInfo) -> Result<PathBuf> {
        self.record("download", ctx, Some(UpdateStatus::Downloading))?;
        Ok(PathBuf::from(format!("/staging/{}.zip", ctx.module)))
    }

    async fn verify(&self, ctx: &StepContext, _release: &ReleaseInfo, _archive: &Path) -> Result<()> {
        self.record("verify", ctx, Some(UpdateStatus::Verifying))
    }

    async fn backup(&self, ctx: &StepContext) -> Result<PathBuf> {
        self.record("backup", ctx, Some(UpdateStatus::BackingUp))?;
        Ok(PathBuf::from(format!("/backups/{}/{}", ctx.module, ctx.from_version)))
    }

    async fn apply(&self, ctx: &StepContext, _archive: &Path) -> Result<()> {
        self.record("apply", ctx, Some(UpdateStatus::Applying))
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<usize> {
        self.record("migrate", ctx, Some(UpdateStatus::Migrating))?;
        Ok(self.migrations)
    }

    async fn seed(&self, ctx: &StepContext) -> Result<()> {
        self.record("seed", ctx, Some(UpdateStatus::Seeding))
    }

    async fn health_check(&self, ctx: &StepContext) -> Result<()> {
        self.record("health_check", ctx, Some(UpdateStatus::HealthChecking))
    }

    async fn restore(&self, ctx: &StepContext, _backup: &Path) -> Result<()> {
        self.record("restore", ctx, None)?;
        if self.fail_restore {
            return Err(Error::step("rollback", "backup is unreadable"));
        }
        Ok(())
    }

    async fn pending_migrations(&self, _ctx: &StepContext) -> Result<usize> {
        Ok(self.migrations)
    }

    async fn cleanup(&self, ctx: &StepContext, _archive: Option<&Path>) -> Result<()> {
        self.record("cleanup", ctx, None)
    }
}
