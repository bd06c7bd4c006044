//! Discovery of available module and core updates.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use module_resolver::{ModuleRecord, SemanticVersion};
use serde::{Deserialize, Serialize};

use crate::SharedRegistry;
use crate::error::Result;
use crate::release::{ReleaseChecker, ReleaseInfo};

/// A module with a newer release than the installed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableUpdate {
    pub name: String,
    pub current_version: SemanticVersion,
    pub available_version: SemanticVersion,
    pub is_major: bool,
    pub release: ReleaseInfo,
}

#[derive(Debug, Serialize, Deserialize)]
struct UpdateCache {
    checked_at: DateTime<Utc>,
    updates: Vec<AvailableUpdate>,
}

/// Resolves module repositories and queries the release host for them.
pub struct UpdateChecker {
    registry: SharedRegistry,
    releases: Arc<dyn ReleaseChecker>,
    repositories: BTreeMap<String, String>,
    cache_path: Option<PathBuf>,
    cache_ttl: Duration,
}

impl UpdateChecker {
    pub fn new(registry: SharedRegistry, releases: Arc<dyn ReleaseChecker>) -> Self {
        Self {
            registry,
            releases,
            repositories: BTreeMap::new(),
            cache_path: None,
            cache_ttl: Duration::ZERO,
        }
    }

    /// Fallback repositories for modules whose manifest names none.
    pub fn with_repositories(mut self, repositories: BTreeMap<String, String>) -> Self {
        self.repositories = repositories;
        self
    }

    pub fn with_cache(mut self, path: impl Into<PathBuf>, ttl: Duration) -> Self {
        self.cache_path = Some(path.into());
        self.cache_ttl = ttl;
        self
    }

    pub fn repository_for(&self, record: &ModuleRecord) -> Option<String> {
        record
            .repository
            .clone()
            .or_else(|| self.repositories.get(record.name.as_str()).cloned())
    }

    /// Latest release for one installed module, bypassing the cache.
    ///
    /// `Ok(None)` when the module is unknown, has no repository, or the
    /// repository has no release.
    pub async fn release_for(&self, name: &str) -> Result<Option<ReleaseInfo>> {
        let repository = {
            let registry = self.registry.read().await;
            registry.get(name).and_then(|r| self.repository_for(r))
        };
        let Some(repository) = repository else {
            tracing::debug!(module = name, "No repository configured");
            return Ok(None);
        };
        self.releases.latest_release(&repository).await
    }

    /// Available updates for every installed module.
    ///
    /// A cache younger than the TTL is returned as-is unless `force`.
    /// Transient host errors propagate; a release that cannot be parsed is
    /// logged and skipped.
    pub async fn check(&self, force: bool) -> Result<Vec<AvailableUpdate>> {
        if !force && let Some(updates) = self.fresh_cache()? {
            tracing::debug!(count = updates.len(), "Using cached update check");
            return Ok(updates);
        }

        let targets: Vec<(String, SemanticVersion, String)> = {
            let registry = self.registry.read().await;
            registry
                .iter()
                .filter_map(|r| {
                    self.repository_for(r)
                        .map(|repo| (r.name.to_string(), r.version, repo))
                })
                .collect()
        };

        let mut updates = Vec::new();
        for (name, current, repository) in targets {
            let release = match self.releases.latest_release(&repository).await {
                Ok(Some(release)) => release,
                Ok(None) => continue,
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => {
                    tracing::warn!(module = %name, error = %e, "Skipping unreadable release");
                    continue;
                }
            };

            if release.is_newer_than(&current) {
                tracing::info!(
                    module = %name,
                    from = %current,
                    to = %release.version,
                    "Update available"
                );
                updates.push(AvailableUpdate {
                    is_major: release.is_major_upgrade_from(&current),
                    available_version: release.version,
                    current_version: current,
                    name,
                    release,
                });
            }
        }

        self.store_cache(Utc::now(), &updates)?;
        Ok(updates)
    }

    /// Newer platform release, if any.
    pub async fn check_core(
        &self,
        current: &SemanticVersion,
        repository: &str,
    ) -> Result<Option<ReleaseInfo>> {
        Ok(self
            .releases
            .latest_release(repository)
            .await?
            .filter(|release| release.is_newer_than(current)))
    }

    /// Cached results regardless of age.
    pub fn cached(&self) -> Result<Option<(DateTime<Utc>, Vec<AvailableUpdate>)>> {
        let Some(path) = &self.cache_path else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let content = module_fs::io::read_locked(path)?;
        match serde_json::from_str::<UpdateCache>(&content) {
            Ok(cache) => Ok(Some((cache.checked_at, cache.updates))),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable update cache");
                Ok(None)
            }
        }
    }

    /// Drop `name` from the cached updates once it has been updated.
    ///
    /// The check time is kept, so the remaining entries age out as before.
    pub fn forget(&self, name: &str) -> Result<()> {
        let Some((checked_at, mut updates)) = self.cached()? else {
            return Ok(());
        };
        let before = updates.len();
        updates.retain(|u| u.name != name);
        if updates.len() != before {
            tracing::debug!(module = name, "Removed module from update cache");
            self.store_cache(checked_at, &updates)?;
        }
        Ok(())
    }

    fn fresh_cache(&self) -> Result<Option<Vec<AvailableUpdate>>> {
        let Some((checked_at, updates)) = self.cached()? else {
            return Ok(None);
        };
        let age = Utc::now().signed_duration_since(checked_at);
        let fresh = age
            .to_std()
            .map(|age| age < self.cache_ttl)
            .unwrap_or(false);
        Ok(fresh.then_some(updates))
    }

    fn store_cache(&self, checked_at: DateTime<Utc>, updates: &[AvailableUpdate]) -> Result<()> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };
        let cache = UpdateCache {
            checked_at,
            updates: updates.to_vec(),
        };
        module_fs::io::write_atomic(path, serde_json::to_string_pretty(&cache)?.as_bytes())?;
        Ok(())
    }
}
