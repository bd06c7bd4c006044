//! Wiring of configuration, registry and services for one invocation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use module_resolver::{Environment, ModuleRegistry};
use module_update::{
    FileHistoryStore, FilesystemSteps, GithubReleaseChecker, HistoryStore, JobQueue,
    ManagerConfig, SharedRegistry, UpdateChecker, UpdateOrchestrator, reap_abandoned,
    shared_registry,
};

use crate::error::{CliError, Result};

pub struct AppContext {
    pub config: ManagerConfig,
    pub registry: SharedRegistry,
    pub checker: Arc<UpdateChecker>,
    pub queue: JobQueue,
}

impl AppContext {
    /// Load the config at `config_path` and discover installed modules.
    ///
    /// Relative paths in the config are resolved against its directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let base = match config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        let config = ManagerConfig::load(config_path)
            .map_err(|e| {
                CliError::user(format!(
                    "Could not read config {}: {e}",
                    config_path.display()
                ))
            })?
            .rooted_at(&base);

        let statuses = ModuleRegistry::load_statuses(&config.statuses_path())?;
        let registry = if config.paths.modules_dir.is_dir() {
            let registry = ModuleRegistry::discover(&config.paths.modules_dir, &statuses)
                .map_err(|e| CliError::user(e.to_string()))?;
            // Newly discovered modules get an explicit flag operators can edit
            if registry.statuses() != statuses {
                registry.save_statuses(&config.statuses_path())?;
            }
            registry
        } else {
            tracing::warn!(
                dir = %config.paths.modules_dir.display(),
                "Modules directory not found"
            );
            ModuleRegistry::new()
        };
        let registry = shared_registry(registry);

        let releases = GithubReleaseChecker::new(&config.releases)?;
        let checker = UpdateChecker::new(registry.clone(), Arc::new(releases))
            .with_repositories(config.repositories.clone())
            .with_cache(
                config.cache_path(),
                Duration::from_secs(config.releases.cache_ttl_secs),
            );

        let queue = JobQueue::new().with_lock_dir(config.locks_dir());
        Ok(Self {
            config,
            registry,
            checker: Arc::new(checker),
            queue,
        })
    }

    pub fn history(&self) -> Arc<dyn HistoryStore> {
        Arc::new(FileHistoryStore::new(self.config.history_path()))
    }

    /// The runtime reported by `host.runtime_binary`.
    ///
    /// When the binary cannot be run the runtime version is left empty, so
    /// only modules that constrain it report an unmet requirement.
    pub fn environment(&self) -> Environment {
        let host = &self.config.host;
        Environment::detect(&host.runtime_binary, host.framework_version.as_deref())
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Could not inspect the runtime");
                let env = Environment::new("");
                match &host.framework_version {
                    Some(framework) => env.with_framework_version(framework),
                    None => env,
                }
            })
    }

    /// Build an orchestrator against the detected runtime.
    ///
    /// Records left unfinished by an earlier process are closed first.
    pub fn orchestrator(&self, force: bool) -> Result<Arc<UpdateOrchestrator>> {
        let environment = self.environment();

        let history = self.history();
        let reaped = reap_abandoned(history.as_ref(), self.config.update.timeout())?;
        if !reaped.is_empty() {
            tracing::warn!(count = reaped.len(), "Closed abandoned update records");
        }

        let steps = FilesystemSteps::new(
            self.config.update.clone(),
            self.config.staging_dir(),
            self.config.backups_dir(),
            self.config.migrations_dir(),
        )?;

        let orchestrator = UpdateOrchestrator::new(
            self.registry.clone(),
            self.checker.clone(),
            Arc::new(steps),
            history,
            environment,
        )
        .with_modules_dir(&self.config.paths.modules_dir)
        .with_force(force);
        Ok(Arc::new(orchestrator))
    }
}
