//! Module directory backups taken before an update is applied.
//!
//! Layout: `<backups_dir>/<module>/<version>-<timestamp>/` holding a full copy
//! of the module directory under `files/` plus `metadata.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use module_resolver::SemanticVersion;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const METADATA_FILE: &str = "metadata.toml";
const FILES_DIR: &str = "files";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub module: String,
    pub version: SemanticVersion,
    pub created: DateTime<Utc>,
    /// Number of files copied.
    pub files: u64,
}

#[derive(Debug, Clone)]
pub struct ModuleBackup {
    pub path: PathBuf,
    pub metadata: BackupMetadata,
}

/// Creates, lists and restores module backups.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backups_dir: PathBuf,
}

impl BackupManager {
    pub fn new(backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            backups_dir: backups_dir.into(),
        }
    }

    fn module_dir(&self, module: &str) -> PathBuf {
        self.backups_dir.join(module)
    }

    /// Copy `source` into a new backup directory.
    pub fn create(
        &self,
        module: &str,
        version: &SemanticVersion,
        source: &Path,
    ) -> Result<ModuleBackup> {
        if !source.is_dir() {
            return Err(Error::step(
                "backup",
                format!("module directory {} does not exist", source.display()),
            ));
        }

        let created = Utc::now();
        let path = self
            .module_dir(module)
            .join(format!("{version}-{}", created.format("%Y%m%dT%H%M%S%.3fZ")));
        fs::create_dir_all(&path)?;

        let files = module_fs::tree::copy_dir(source, &path.join(FILES_DIR))?;
        let metadata = BackupMetadata {
            module: module.to_string(),
            version: *version,
            created,
            files,
        };
        module_fs::io::write_text(&path.join(METADATA_FILE), &toml::to_string_pretty(&metadata)?)?;

        tracing::info!(module, path = %path.display(), files, "Created backup");
        Ok(ModuleBackup { path, metadata })
    }

    /// Replace `target` with the contents of the backup at `backup_path`.
    pub fn restore(&self, backup_path: &Path, target: &Path) -> Result<()> {
        let files = backup_path.join(FILES_DIR);
        if !files.is_dir() {
            return Err(Error::step(
                "rollback",
                format!("backup {} has no files", backup_path.display()),
            ));
        }

        // Restore from a scratch copy so the backup itself survives
        let scratch = backup_path.join(".restore");
        module_fs::tree::remove_dir_if_exists(&scratch)?;
        module_fs::tree::copy_dir(&files, &scratch)?;
        module_fs::tree::replace_dir(target, &scratch)?;

        tracing::info!(target = %target.display(), "Restored module from backup");
        Ok(())
    }

    pub fn read_metadata(&self, backup_path: &Path) -> Result<Option<BackupMetadata>> {
        let path = backup_path.join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = module_fs::io::read_text(&path)?;
        Ok(toml::from_str(&content).ok())
    }

    /// Backups of one module, oldest first.
    pub fn list(&self, module: &str) -> Result<Vec<ModuleBackup>> {
        let dir = self.module_dir(module);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if let Some(metadata) = self.read_metadata(&path)? {
                backups.push(ModuleBackup { path, metadata });
            }
        }
        backups.sort_by_key(|b| (b.metadata.created, b.metadata.version));
        Ok(backups)
    }

    /// Delete all but the `keep` newest backups of `module` (at least one is
    /// always kept). Returns how many were removed.
    pub fn prune(&self, module: &str, keep: usize) -> Result<usize> {
        let backups = self.list(module)?;
        let excess = backups.len().saturating_sub(keep.max(1));
        for backup in &backups[..excess] {
            fs::remove_dir_all(&backup.path)?;
            tracing::debug!(module, path = %backup.path.display(), "Removed old backup");
        }
        if excess > 0 {
            tracing::info!(module, removed = excess, "Pruned old backups");
        }
        Ok(excess)
    }
}
