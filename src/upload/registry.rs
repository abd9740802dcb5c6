use super::types::{FileId, FileRecord};
use std::sync::{Arc, Mutex, MutexGuard};

/// Result of a keyed update against the registry
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The mutation was committed; carries the record as it is now
    Applied(FileRecord),
    /// The record exists but the update did not change it
    Unchanged,
    /// No record with that id (it was removed)
    Missing,
}

/// Authoritative collection of file records, most recent first.
///
/// Shared by every job of a manager. All access is serialized by one mutex and
/// only keyed operations are exposed, so a job never touches another job's
/// record and readers always get a consistent copy. The lock is never held
/// across an await point or a listener callback; the `*_then` variants only
/// run non-blocking work (channel sends) under it.
#[derive(Clone, Default)]
pub struct UploadRegistry {
    records: Arc<Mutex<Vec<FileRecord>>>,
}

impl UploadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registry with existing records, keeping their order.
    /// Later duplicates of an id are dropped.
    pub fn with_records(records: Vec<FileRecord>) -> Self {
        let mut unique: Vec<FileRecord> = Vec::with_capacity(records.len());
        for record in records {
            if unique.iter().all(|r| r.id != record.id) {
                unique.push(record);
            }
        }

        Self {
            records: Arc::new(Mutex::new(unique)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FileRecord>> {
        // Closures run under this lock never panic mid-update, so a poisoned
        // guard still holds consistent data.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Prepend a record and return a snapshot of it.
    /// Returns None if a record with the same id is already tracked.
    pub fn insert(&self, record: FileRecord) -> Option<FileRecord> {
        self.insert_then(record, |_| {})
    }

    /// Like `insert`, running `committed` on the new record before the lock
    /// is released.
    pub fn insert_then<G>(&self, record: FileRecord, committed: G) -> Option<FileRecord>
    where
        G: FnOnce(&FileRecord),
    {
        let mut records = self.lock();
        if records.iter().any(|r| r.id == record.id) {
            return None;
        }
        let snapshot = record.clone();
        records.insert(0, record);
        committed(&snapshot);
        Some(snapshot)
    }

    /// Apply `f` to the record with `id`, leaving every other record untouched.
    ///
    /// `f` reports whether it changed the record.
    pub fn update<F>(&self, id: FileId, f: F) -> UpdateOutcome
    where
        F: FnOnce(&mut FileRecord) -> bool,
    {
        self.update_then(id, f, |_| {})
    }

    /// Like `update`, running `committed` on the changed record before the
    /// lock is released. Events published from `committed` are therefore
    /// ordered with every other mutation of the registry.
    pub fn update_then<F, G>(&self, id: FileId, f: F, committed: G) -> UpdateOutcome
    where
        F: FnOnce(&mut FileRecord) -> bool,
        G: FnOnce(&FileRecord),
    {
        let mut records = self.lock();
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                if f(record) {
                    committed(record);
                    UpdateOutcome::Applied(record.clone())
                } else {
                    UpdateOutcome::Unchanged
                }
            }
            None => UpdateOutcome::Missing,
        }
    }

    /// Remove the record with `id`, returning its last state
    pub fn remove(&self, id: FileId) -> Option<FileRecord> {
        self.remove_then(id, |_| {})
    }

    /// Like `remove`, running `committed` on the removed record before the
    /// lock is released.
    pub fn remove_then<G>(&self, id: FileId, committed: G) -> Option<FileRecord>
    where
        G: FnOnce(&FileRecord),
    {
        let mut records = self.lock();
        let index = records.iter().position(|r| r.id == id)?;
        let removed = records.remove(index);
        committed(&removed);
        Some(removed)
    }

    pub fn get(&self, id: FileId) -> Option<FileRecord> {
        self.lock().iter().find(|r| r.id == id).cloned()
    }

    /// Copy of all records, most recent first
    pub fn snapshot(&self) -> Vec<FileRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
