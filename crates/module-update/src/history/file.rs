//! JSON-file history store shared between processes.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use uuid::Uuid;

use super::{HistoryDocument, HistoryStore, UpdateHistoryRecord, UpdateLogEntry};
use crate::Result;

/// History persisted as a single JSON document.
///
/// Reads take a shared lock. Mutations hold an exclusive lock on a sidecar
/// `.lock` file for the whole read-modify-write, and the document itself is
/// replaced by write-to-temp-then-rename.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HistoryDocument> {
        if !self.path.exists() {
            return Ok(HistoryDocument::default());
        }
        let content = module_fs::io::read_locked(&self.path)?;
        if content.trim().is_empty() {
            return Ok(HistoryDocument::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn modify<T>(&self, f: impl FnOnce(&mut HistoryDocument) -> Result<T>) -> Result<T> {
        let _lock = self.lock_exclusive()?;
        let mut document = self.load()?;
        let out = f(&mut document)?;
        let content = serde_json::to_string_pretty(&document)?;
        module_fs::io::write_atomic(&self.path, content.as_bytes())?;
        Ok(out)
    }

    fn lock_exclusive(&self) -> Result<File> {
        let lock_path = self.path.with_extension("json.lock");
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        file.lock_exclusive()?;
        // Released when the handle is dropped
        Ok(file)
    }
}

impl HistoryStore for FileHistoryStore {
    fn create(&self, record: &UpdateHistoryRecord) -> Result<()> {
        self.modify(|doc| {
            doc.create(record);
            Ok(())
        })
    }

    fn append_log(&self, id: Uuid, entry: UpdateLogEntry) -> Result<()> {
        self.modify(|doc| {
            doc.entry_mut(id)?.logs.push(entry);
            Ok(())
        })
    }

    fn update(&self, record: &UpdateHistoryRecord) -> Result<()> {
        self.modify(|doc| {
            doc.entry_mut(record.id)?.record = record.clone();
            Ok(())
        })
    }

    fn get(&self, id: Uuid) -> Result<Option<UpdateHistoryRecord>> {
        Ok(self.load()?.entry(id).map(|e| e.record.clone()))
    }

    fn logs(&self, id: Uuid) -> Result<Vec<UpdateLogEntry>> {
        Ok(self
            .load()?
            .entry(id)
            .map(|e| e.logs.clone())
            .unwrap_or_default())
    }

    fn records_for(&self, module: &str) -> Result<Vec<UpdateHistoryRecord>> {
        Ok(self.load()?.records_for(module))
    }

    fn abandoned(&self, started_before: DateTime<Utc>) -> Result<Vec<UpdateHistoryRecord>> {
        Ok(self.load()?.abandoned(started_before))
    }
}
