//! Update history: one record per update attempt plus an append-only log.
//!
//! The history store is the single source of truth for in-progress state.
//! A process that dies mid-update leaves its record in the last logged
//! non-terminal state; [`reap_abandoned`] closes such records as failed.

mod file;
mod memory;

pub use file::FileHistoryStore;
pub use memory::MemoryHistoryStore;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use module_resolver::SemanticVersion;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;
use crate::status::UpdateStatus;

/// One update attempt of one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateHistoryRecord {
    pub id: Uuid,
    pub module_name: String,
    pub from_version: SemanticVersion,
    pub to_version: SemanticVersion,
    pub status: UpdateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl UpdateHistoryRecord {
    pub fn new(
        module_name: impl Into<String>,
        from_version: SemanticVersion,
        to_version: SemanticVersion,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            module_name: module_name.into(),
            from_version,
            to_version,
            status: UpdateStatus::Pending,
            error_message: None,
            backup_path: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// An audit log line. Entries are appended, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateLogEntry {
    pub step: String,
    pub status: UpdateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    pub logged_at: DateTime<Utc>,
}

impl UpdateLogEntry {
    pub fn new(step: impl Into<String>, status: UpdateStatus) -> Self {
        Self {
            step: step.into(),
            status,
            message: None,
            context: None,
            logged_at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// Persistence for update history.
///
/// Implementations must keep logs append-only: `append_log` adds an entry,
/// nothing removes or rewrites one.
pub trait HistoryStore: Send + Sync {
    fn create(&self, record: &UpdateHistoryRecord) -> Result<()>;

    fn append_log(&self, id: Uuid, entry: UpdateLogEntry) -> Result<()>;

    /// Replace the stored record with the same id.
    fn update(&self, record: &UpdateHistoryRecord) -> Result<()>;

    fn get(&self, id: Uuid) -> Result<Option<UpdateHistoryRecord>>;

    fn logs(&self, id: Uuid) -> Result<Vec<UpdateLogEntry>>;

    /// Records for one module, oldest first.
    fn records_for(&self, module: &str) -> Result<Vec<UpdateHistoryRecord>>;

    /// Non-terminal records started before `started_before`.
    fn abandoned(&self, started_before: DateTime<Utc>) -> Result<Vec<UpdateHistoryRecord>>;
}

/// Serialized shape shared by the in-memory and file stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct HistoryDocument {
    #[serde(default)]
    pub(crate) entries: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct HistoryEntry {
    pub(crate) record: UpdateHistoryRecord,
    #[serde(default)]
    pub(crate) logs: Vec<UpdateLogEntry>,
}

impl HistoryDocument {
    pub(crate) fn create(&mut self, record: &UpdateHistoryRecord) {
        self.entries.push(HistoryEntry {
            record: record.clone(),
            logs: Vec::new(),
        });
    }

    pub(crate) fn entry_mut(&mut self, id: Uuid) -> Result<&mut HistoryEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.record.id == id)
            .ok_or(crate::Error::HistoryNotFound(id))
    }

    pub(crate) fn entry(&self, id: Uuid) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.record.id == id)
    }

    pub(crate) fn records_for(&self, module: &str) -> Vec<UpdateHistoryRecord> {
        self.entries
            .iter()
            .filter(|e| e.record.module_name == module)
            .map(|e| e.record.clone())
            .collect()
    }

    pub(crate) fn abandoned(&self, started_before: DateTime<Utc>) -> Vec<UpdateHistoryRecord> {
        self.entries
            .iter()
            .filter(|e| !e.record.is_terminal() && e.record.started_at < started_before)
            .map(|e| e.record.clone())
            .collect()
    }
}

/// Close every non-terminal record older than `timeout` as `Failed`.
///
/// Returns the ids that were closed. Such records are never resumed.
pub fn reap_abandoned(store: &dyn HistoryStore, timeout: Duration) -> Result<Vec<Uuid>> {
    let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now()
        .checked_sub_signed(timeout)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut reaped = Vec::new();
    for mut record in store.abandoned(cutoff)? {
        let last_status = record.status;
        let message = format!(
            "Update abandoned while {last_status}: started more than {}s ago",
            timeout.num_seconds()
        );
        tracing::warn!(module = %record.module_name, id = %record.id, "{message}");

        record.status = UpdateStatus::Failed;
        record.error_message = Some(message.clone());
        record.completed_at = Some(Utc::now());
        store.update(&record)?;
        store.append_log(
            record.id,
            UpdateLogEntry::new(last_status.step(), UpdateStatus::Failed).with_message(message),
        )?;
        reaped.push(record.id);
    }
    Ok(reaped)
}
