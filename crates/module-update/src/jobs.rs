//! Background jobs with first-class uniqueness, timeout and retry policy.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use fs2::FileExt;

use crate::batch::{BatchCoordinator, BatchReport};
use crate::checker::{AvailableUpdate, UpdateChecker};
use crate::config::UpdateConfig;
use crate::error::{Error, Result};
use crate::orchestrator::{UpdateOrchestrator, UpdateResult};

pub const BATCH_UNIQUE_KEY: &str = "module-update:batch";
pub const CHECK_UNIQUE_KEY: &str = "module-check-updates";

/// Delay policy between attempts of a retried job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

/// Scheduling parameters of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub name: String,
    /// At most one job per key runs at a time.
    pub unique_key: Option<String>,
    /// Wall-clock bound of one attempt.
    pub timeout: Duration,
    pub tries: u32,
    pub backoff: Option<BackoffPolicy>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            unique_key: None,
            timeout,
            tries: 1,
            backoff: None,
        }
    }

    pub fn unique(mut self, key: impl Into<String>) -> Self {
        self.unique_key = Some(key.into());
        self
    }

    pub fn retry(mut self, tries: u32, backoff: BackoffPolicy) -> Self {
        self.tries = tries.max(1);
        self.backoff = Some(backoff);
        self
    }

    /// Single-module update: one attempt, keyed by module.
    pub fn update_module(module: &str, timeout: Duration) -> Self {
        Self::new(format!("update-module:{module}"), timeout)
            .unique(format!("module-update:{module}"))
    }

    /// Batch update: one attempt, one batch at a time.
    pub fn batch_update(timeout: Duration) -> Self {
        Self::new("batch-update", timeout).unique(BATCH_UNIQUE_KEY)
    }

    /// Read-only update check; safe to retry.
    pub fn check_updates(tries: u32, timeout: Duration) -> Self {
        Self::new("check-updates", timeout)
            .unique(CHECK_UNIQUE_KEY)
            .retry(tries, BackoffPolicy::default())
    }
}

/// A unit of background work.
#[async_trait]
pub trait Job: Send + Sync {
    type Output: Send;

    fn spec(&self) -> JobSpec;

    async fn handle(&self) -> Result<Self::Output>;
}

/// Runs jobs while enforcing their [`JobSpec`].
///
/// Unique keys are always held in-process. With a lock directory they are
/// also held as exclusive file locks, so queues in other processes sharing
/// that directory see them too.
#[derive(Debug, Clone, Default)]
pub struct JobQueue {
    held: Arc<Mutex<HashSet<String>>>,
    lock_dir: Option<PathBuf>,
}

/// Holds a unique key until dropped, including on timeout or panic.
pub struct KeyGuard {
    held: Arc<Mutex<HashSet<String>>>,
    key: String,
    // Released when the handle is dropped
    _file: Option<File>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        lock(&self.held).remove(&self.key);
    }
}

fn lock(held: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `module-update:forum` -> `module-update-forum.lock`
fn lock_file_name(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    format!("{stem}.lock")
}

fn is_contended(error: &std::io::Error) -> bool {
    error.kind() == std::io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also hold unique keys as lock files in `dir`.
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    /// Whether `key` is held by this process.
    pub fn is_held(&self, key: &str) -> bool {
        lock(&self.held).contains(key)
    }

    /// Take `key` for the job called `name`, failing if anyone holds it.
    pub fn hold(&self, name: &str, key: &str) -> Result<KeyGuard> {
        let busy = || Error::JobAlreadyRunning {
            name: name.to_string(),
            key: key.to_string(),
        };
        if !lock(&self.held).insert(key.to_string()) {
            return Err(busy());
        }
        let mut guard = KeyGuard {
            held: Arc::clone(&self.held),
            key: key.to_string(),
            _file: None,
        };

        if let Some(dir) = &self.lock_dir {
            std::fs::create_dir_all(dir)?;
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(dir.join(lock_file_name(key)))?;
            match file.try_lock_exclusive() {
                Ok(()) => guard._file = Some(file),
                Err(e) if is_contended(&e) => {
                    tracing::debug!(job = name, key, "Unique key is locked by another process");
                    return Err(busy());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(guard)
    }

    fn acquire(&self, spec: &JobSpec) -> Result<Option<KeyGuard>> {
        spec.unique_key
            .as_deref()
            .map(|key| self.hold(&spec.name, key))
            .transpose()
    }

    pub async fn dispatch<J: Job>(&self, job: &J) -> Result<J::Output> {
        let spec = job.spec();
        self.run(&spec, || job.handle()).await
    }

    /// Run `task` under `spec`.
    ///
    /// Each attempt is bounded by `spec.timeout`. Failed attempts are
    /// retried while tries remain, but only for transient errors or timeouts;
    /// the final failure is returned as-is.
    pub async fn run<T, F, Fut>(&self, spec: &JobSpec, mut task: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _guard = self.acquire(spec)?;
        let mut delays = spec.backoff.map(|policy| {
            ExponentialBackoffBuilder::new()
                .with_initial_interval(policy.initial)
                .with_max_interval(policy.max)
                .with_multiplier(policy.multiplier)
                .with_max_elapsed_time(None)
                .build()
        });

        let tries = spec.tries.max(1);
        let mut attempt = 1;
        loop {
            tracing::debug!(job = %spec.name, attempt, tries, "Starting job attempt");
            let error = match tokio::time::timeout(spec.timeout, task()).await {
                Ok(Ok(output)) => return Ok(output),
                Ok(Err(e)) if !e.is_transient() => return Err(e),
                Ok(Err(e)) => e,
                Err(_) => Error::JobTimedOut {
                    name: spec.name.clone(),
                    seconds: spec.timeout.as_secs(),
                },
            };

            let delay = delays.as_mut().and_then(|d| d.next_backoff());
            match delay {
                Some(delay) if attempt < tries => {
                    tracing::warn!(job = %spec.name, attempt, error = %error, ?delay, "Job attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                _ => {
                    tracing::error!(job = %spec.name, attempt, error = %error, "Job failed");
                    return Err(error);
                }
            }
        }
    }
}

pub struct UpdateModuleJob {
    orchestrator: Arc<UpdateOrchestrator>,
    module: String,
    timeout: Duration,
}

impl UpdateModuleJob {
    pub fn new(
        orchestrator: Arc<UpdateOrchestrator>,
        module: impl Into<String>,
        config: &UpdateConfig,
    ) -> Self {
        Self {
            orchestrator,
            module: module.into(),
            timeout: config.timeout(),
        }
    }
}

#[async_trait]
impl Job for UpdateModuleJob {
    type Output = UpdateResult;

    fn spec(&self) -> JobSpec {
        JobSpec::update_module(&self.module, self.timeout)
    }

    async fn handle(&self) -> Result<UpdateResult> {
        self.orchestrator.update(&self.module).await
    }
}

pub struct BatchUpdateJob {
    coordinator: BatchCoordinator,
    checker: Arc<UpdateChecker>,
    only: Option<Vec<String>>,
    timeout: Duration,
}

impl BatchUpdateJob {
    /// Each module of the batch is updated under its own unique key on
    /// `queue`.
    pub fn new(
        orchestrator: Arc<UpdateOrchestrator>,
        checker: Arc<UpdateChecker>,
        queue: JobQueue,
        only: Option<Vec<String>>,
        config: &UpdateConfig,
    ) -> Self {
        Self {
            coordinator: BatchCoordinator::new(orchestrator).with_queue(queue, config.timeout()),
            checker,
            only,
            timeout: config.batch_timeout(),
        }
    }
}

#[async_trait]
impl Job for BatchUpdateJob {
    type Output = BatchReport;

    fn spec(&self) -> JobSpec {
        JobSpec::batch_update(self.timeout)
    }

    async fn handle(&self) -> Result<BatchReport> {
        let updates = self.checker.check(false).await?;
        Ok(self.coordinator.run(&updates, self.only.as_deref()).await)
    }
}

pub struct CheckUpdatesJob {
    checker: Arc<UpdateChecker>,
    force: bool,
    tries: u32,
    timeout: Duration,
}

impl CheckUpdatesJob {
    pub fn new(checker: Arc<UpdateChecker>, force: bool, config: &UpdateConfig) -> Self {
        Self {
            checker,
            force,
            tries: config.check_tries,
            timeout: config.check_timeout(),
        }
    }
}

#[async_trait]
impl Job for CheckUpdatesJob {
    type Output = Vec<AvailableUpdate>;

    fn spec(&self) -> JobSpec {
        JobSpec::check_updates(self.tries, self.timeout)
    }

    async fn handle(&self) -> Result<Vec<AvailableUpdate>> {
        self.checker.check(self.force).await
    }
}
