//! In-process history store.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{HistoryDocument, HistoryStore, UpdateHistoryRecord, UpdateLogEntry};
use crate::Result;

/// History kept in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    document: Mutex<HistoryDocument>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HistoryDocument> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn create(&self, record: &UpdateHistoryRecord) -> Result<()> {
        self.lock().create(record);
        Ok(())
    }

    fn append_log(&self, id: Uuid, entry: UpdateLogEntry) -> Result<()> {
        self.lock().entry_mut(id)?.logs.push(entry);
        Ok(())
    }

    fn update(&self, record: &UpdateHistoryRecord) -> Result<()> {
        self.lock().entry_mut(record.id)?.record = record.clone();
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<UpdateHistoryRecord>> {
        Ok(self.lock().entry(id).map(|e| e.record.clone()))
    }

    fn logs(&self, id: Uuid) -> Result<Vec<UpdateLogEntry>> {
        Ok(self
            .lock()
            .entry(id)
            .map(|e| e.logs.clone())
            .unwrap_or_default())
    }

    fn records_for(&self, module: &str) -> Result<Vec<UpdateHistoryRecord>> {
        Ok(self.lock().records_for(module))
    }

    fn abandoned(&self, started_before: DateTime<Utc>) -> Result<Vec<UpdateHistoryRecord>> {
        Ok(self.lock().abandoned(started_before))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::status::UpdateStatus;
    use module_resolver::SemanticVersion;

    #[test]
    fn logs_are_appended_in_order() {
        let store = MemoryHistoryStore::new();
        let record = UpdateHistoryRecord::new(
            "auth",
            SemanticVersion::new(1, 0, 0),
            SemanticVersion::new(1, 1, 0),
        );
        store.create(&record).unwrap();
        store
            .append_log(record.id, UpdateLogEntry::new("pending", UpdateStatus::Pending))
            .unwrap();
        store
            .append_log(
                record.id,
                UpdateLogEntry::new("download", UpdateStatus::Downloading).with_message("fetching"),
            )
            .unwrap();

        let steps: Vec<_> = store.logs(record.id).unwrap().into_iter().map(|e| e.step).collect();
        assert_eq!(steps, vec!["pending", "download"]);
        assert_eq!(store.records_for("auth").unwrap().len(), 1);
        assert!(store.records_for("forum").unwrap().is_empty());
    }

    #[test]
    fn unknown_id_is_an_error() {
        let store = MemoryHistoryStore::new();
        let id = Uuid::new_v4();
        let err = store
            .append_log(id, UpdateLogEntry::new("pending", UpdateStatus::Pending))
            .unwrap_err();
        assert!(matches!(err, Error::HistoryNotFound(found) if found == id));
        assert!(store.get(id).unwrap().is_none());
    }
}
