//! Sequential, dependency-ordered update of several modules.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use module_resolver::DependencyGraph;
use serde::Serialize;

use crate::checker::AvailableUpdate;
use crate::config::UpdateConfig;
use crate::jobs::{JobQueue, JobSpec};
use crate::orchestrator::{UpdateOrchestrator, UpdateResult};

/// What happened to each module of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub success: Vec<String>,
    /// Module name and the reason it failed.
    pub failed: Vec<(String, String)>,
    /// Modules not attempted because a dependency failed.
    pub skipped: Vec<String>,
    pub results: Vec<UpdateResult>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.results.len()
    }
}

pub struct BatchCoordinator {
    orchestrator: Arc<UpdateOrchestrator>,
    queue: JobQueue,
    module_timeout: Duration,
}

impl BatchCoordinator {
    pub fn new(orchestrator: Arc<UpdateOrchestrator>) -> Self {
        Self {
            orchestrator,
            queue: JobQueue::new(),
            module_timeout: UpdateConfig::default().timeout(),
        }
    }

    /// Update each module as a [`JobSpec::update_module`] run on `queue`, so
    /// single-module jobs for the same module are excluded.
    pub fn with_queue(mut self, queue: JobQueue, module_timeout: Duration) -> Self {
        self.queue = queue;
        self.module_timeout = module_timeout;
        self
    }

    /// Update every module in `updates` (restricted to `only` when given),
    /// dependencies first.
    ///
    /// A module whose declared dependencies include an already failed module
    /// is skipped. The batch never stops early.
    pub async fn run(&self, updates: &[AvailableUpdate], only: Option<&[String]>) -> BatchReport {
        let selected: BTreeSet<&str> = updates
            .iter()
            .map(|u| u.name.as_str())
            .filter(|name| only.is_none_or(|only| only.iter().any(|o| o == name)))
            .collect();

        let dependencies: BTreeMap<String, Vec<String>> = {
            let registry = self.orchestrator.registry().read().await;
            selected
                .iter()
                .map(|name| {
                    let deps = registry
                        .get(name)
                        .map(|r| r.dependencies.iter().map(|d| d.to_string()).collect())
                        .unwrap_or_default();
                    (name.to_string(), deps)
                })
                .collect()
        };

        let order = DependencyGraph::for_batch(&selected, |name| {
            dependencies.get(name).cloned().unwrap_or_default()
        })
        .topological_order();
        tracing::info!(?order, "Running batch update");

        let mut report = BatchReport::default();
        let mut failed: BTreeSet<String> = BTreeSet::new();

        for name in order {
            let deps = dependencies.get(&name).map(Vec::as_slice).unwrap_or_default();
            if let Some(dep) = deps.iter().find(|d| failed.contains(*d)) {
                tracing::warn!(module = %name, dependency = %dep, "Skipping update, dependency failed");
                report.skipped.push(name);
                continue;
            }

            let spec = JobSpec::update_module(&name, self.module_timeout);
            let outcome = self
                .queue
                .run(&spec, || self.orchestrator.update(&name))
                .await;
            match outcome {
                Ok(result) if result.is_success() => {
                    report.success.push(name);
                    report.results.push(result);
                }
                Ok(result) => {
                    let reason = result
                        .error_message
                        .clone()
                        .unwrap_or_else(|| format!("ended {}", result.status));
                    failed.insert(name.clone());
                    report.failed.push((name, reason));
                    report.results.push(result);
                }
                Err(e) => {
                    tracing::error!(module = %name, error = %e, "Update aborted");
                    failed.insert(name.clone());
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        report
    }
}
