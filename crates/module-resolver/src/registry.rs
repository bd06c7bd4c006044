//! In-memory registry of installed modules.
//!
//! The registry is constructed explicitly (usually via
//! [`ModuleRegistry::discover`]) and handed to the components that need it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use module_fs::ConfigStore;

use crate::MANIFEST_FILENAME;
use crate::error::{Error, Result};
use crate::manifest::ModuleManifest;
use crate::name::ModuleName;
use crate::requirements::RequirementSet;
use crate::version::SemanticVersion;

/// Enabled flags keyed by module name, persisted as `module-statuses.json`.
pub type ModuleStatuses = BTreeMap<String, bool>;

/// A discovered module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub name: ModuleName,
    pub version: SemanticVersion,
    pub requirements: RequirementSet,
    pub enabled: bool,
    /// Sibling modules this one depends on; used for update ordering.
    pub dependencies: Vec<ModuleName>,
    pub description: Option<String>,
    /// `owner/name` on the release host.
    pub repository: Option<String>,
    /// Directory the module was discovered in.
    pub path: Option<PathBuf>,
}

impl ModuleRecord {
    pub fn new(name: ModuleName, version: SemanticVersion) -> Self {
        Self {
            name,
            version,
            requirements: RequirementSet::default(),
            enabled: true,
            dependencies: Vec::new(),
            description: None,
            repository: None,
            path: None,
        }
    }

    pub fn from_manifest(manifest: ModuleManifest, path: Option<PathBuf>, enabled: bool) -> Self {
        Self {
            requirements: RequirementSet::from_manifest(&manifest.requires),
            name: manifest.name,
            version: manifest.version,
            enabled,
            dependencies: manifest.dependencies,
            description: manifest.description,
            repository: manifest.repository,
            path,
        }
    }

    pub fn with_dependencies<I>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = ModuleName>,
    {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    pub fn with_requirements(mut self, requirements: RequirementSet) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d.as_str() == name)
    }
}

/// Name-keyed collection of [`ModuleRecord`]s. No two records share a name.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<ModuleName, ModuleRecord>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover every `<dir>/module.json` directly below `modules_dir`.
    ///
    /// Modules absent from `statuses` are enabled. A manifest that fails
    /// validation aborts discovery with the offending path.
    pub fn discover(modules_dir: &Path, statuses: &ModuleStatuses) -> Result<Self> {
        let mut registry = Self::new();
        if !modules_dir.exists() {
            tracing::debug!(dir = %modules_dir.display(), "Modules directory does not exist");
            return Ok(registry);
        }

        let mut dirs: Vec<PathBuf> = fs::read_dir(modules_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.join(MANIFEST_FILENAME).is_file())
            .collect();
        dirs.sort();

        for dir in dirs {
            let manifest_path = dir.join(MANIFEST_FILENAME);
            let manifest =
                ModuleManifest::from_path(&manifest_path).map_err(|e| Error::InvalidManifest {
                    path: manifest_path.clone(),
                    source: Box::new(e),
                })?;

            if dir.file_name().and_then(|n| n.to_str()) != Some(manifest.name.as_str()) {
                tracing::warn!(
                    module = %manifest.name,
                    dir = %dir.display(),
                    "Module directory name differs from manifest name"
                );
            }

            let enabled = statuses
                .get(manifest.name.as_str())
                .copied()
                .unwrap_or(true);
            registry.add(ModuleRecord::from_manifest(manifest, Some(dir), enabled))?;
        }

        tracing::debug!(count = registry.len(), "Discovered modules");
        Ok(registry)
    }

    /// Load enabled flags; a missing file means every module is enabled.
    pub fn load_statuses(path: &Path) -> Result<ModuleStatuses> {
        Ok(ConfigStore::new().load_or_default(path)?)
    }

    /// Persist the current enabled flags atomically.
    pub fn save_statuses(&self, path: &Path) -> Result<()> {
        ConfigStore::new().save(path, &self.statuses())?;
        Ok(())
    }

    pub fn statuses(&self) -> ModuleStatuses {
        self.modules
            .iter()
            .map(|(name, record)| (name.to_string(), record.enabled))
            .collect()
    }

    /// Register a module; a second module with the same name is rejected.
    pub fn add(&mut self, record: ModuleRecord) -> Result<()> {
        if self.modules.contains_key(&record.name) {
            return Err(Error::DuplicateModule(record.name.to_string()));
        }
        self.modules.insert(record.name.clone(), record);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<ModuleRecord> {
        self.modules.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&ModuleRecord> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn enable(&mut self, name: &str) -> Result<()> {
        self.get_mut(name)?.enabled = true;
        Ok(())
    }

    pub fn disable(&mut self, name: &str) -> Result<()> {
        self.get_mut(name)?.enabled = false;
        Ok(())
    }

    /// Record a newly installed version.
    pub fn set_version(&mut self, name: &str, version: SemanticVersion) -> Result<()> {
        self.get_mut(name)?.version = version;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values().filter(|m| m.enabled)
    }

    pub fn disabled(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values().filter(|m| !m.enabled)
    }

    pub fn filter<F>(&self, predicate: F) -> Vec<&ModuleRecord>
    where
        F: Fn(&ModuleRecord) -> bool,
    {
        self.modules.values().filter(|m| predicate(m)).collect()
    }

    pub fn map<T, F>(&self, f: F) -> Vec<T>
    where
        F: Fn(&ModuleRecord) -> T,
    {
        self.modules.values().map(f).collect()
    }

    pub fn first<F>(&self, predicate: F) -> Option<&ModuleRecord>
    where
        F: Fn(&ModuleRecord) -> bool,
    {
        self.modules.values().find(|m| predicate(m))
    }

    /// All module names in sorted order.
    pub fn names(&self) -> Vec<ModuleName> {
        self.modules.keys().cloned().collect()
    }

    /// Names of enabled modules, as consumed by [`crate::Environment`].
    pub fn enabled_names(&self) -> BTreeSet<String> {
        self.enabled().map(|m| m.name.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut ModuleRecord> {
        self.modules
            .get_mut(name)
            .ok_or_else(|| Error::UnknownModule(name.to_string()))
    }
}
