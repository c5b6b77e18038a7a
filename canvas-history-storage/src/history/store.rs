// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Record Store - Transactional Key/Value Storage
//!
//! Every persisted entity (documents, versions, branches, rollbacks,
//! comparisons) is a typed [`Record`] stored under a `(kind, id)` key.
//! Mutations are staged in a [`UnitOfWork`] and become visible to readers
//! all at once on commit, or not at all.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(RecordKey),

    #[error("Conflicting write: {0}")]
    Conflict(RecordKey),

    #[error("Commit rejected: {0}")]
    CommitRejected(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Record families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Document,
    Version,
    History,
    Branch,
    Rollback,
    Comparison,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Document => "document",
            RecordKind::Version => "version",
            RecordKind::History => "history",
            RecordKind::Branch => "branch",
            RecordKind::Rollback => "rollback",
            RecordKind::Comparison => "comparison",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub kind: RecordKind,
    pub id: String,
}

impl RecordKey {
    pub fn new(kind: RecordKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.id)
    }
}

/// A typed entity with a stable storage key
pub trait Record: Serialize + DeserializeOwned {
    const KIND: RecordKind;

    fn record_id(&self) -> String;

    fn key(&self) -> RecordKey {
        RecordKey::new(Self::KIND, self.record_id())
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::SerializationError(e.to_string()))
    }
}

/// Staged set of writes.
///
/// Reads observe the unit's own staged writes. Dropping a unit without
/// committing discards it.
pub trait UnitOfWork {
    fn read(&self, key: &RecordKey) -> Result<Option<Vec<u8>>, StoreError>;

    fn write(&mut self, key: RecordKey, bytes: Vec<u8>) -> Result<(), StoreError>;

    fn delete(&mut self, key: &RecordKey) -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn abort(self: Box<Self>);
}

impl<'a> dyn UnitOfWork + 'a {
    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self.read(&RecordKey::new(T::KIND, id))? {
            Some(bytes) => T::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn put<T: Record>(&mut self, record: &T) -> Result<(), StoreError> {
        let bytes = record.encode()?;
        self.write(record.key(), bytes)
    }

    pub fn remove<T: Record>(&mut self, id: &str) -> Result<(), StoreError> {
        self.delete(&RecordKey::new(T::KIND, id))
    }
}

/// Transactional record storage
pub trait HistoryStore: Send + Sync {
    fn begin(&self) -> Box<dyn UnitOfWork + '_>;

    /// Read the committed value of a key
    fn read(&self, key: &RecordKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Committed records of one kind whose id starts with `prefix`, in key order
    fn scan(&self, kind: RecordKind, prefix: &str) -> Result<Vec<(RecordKey, Vec<u8>)>, StoreError>;
}

impl<'a> dyn HistoryStore + 'a {
    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self.read(&RecordKey::new(T::KIND, id))? {
            Some(bytes) => T::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_required<T: Record>(&self, id: &str) -> Result<T, StoreError> {
        self.get(id)?
            .ok_or_else(|| StoreError::NotFound(RecordKey::new(T::KIND, id)))
    }

    pub fn list<T: Record>(&self, prefix: &str) -> Result<Vec<T>, StoreError> {
        self.scan(T::KIND, prefix)?
            .into_iter()
            .map(|(_, bytes)| T::decode(&bytes))
            .collect()
    }

    /// Write a single record in its own unit of work
    pub fn put_one<T: Record>(&self, record: &T) -> Result<(), StoreError> {
        let mut uow = self.begin();
        uow.put(record)?;
        uow.commit()
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_records: u64,
    pub version_count: u64,
    pub commits: u64,
    pub aborts: u64,
    pub total_size_bytes: u64,
}

/// In-memory record store (for testing and embedding)
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordKey, Vec<u8>>>,
    commits: AtomicU64,
    aborts: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            commits: AtomicU64::new(0),
            aborts: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        let records = self.records.read();
        StoreStats {
            total_records: records.len() as u64,
            version_count: records
                .keys()
                .filter(|k| k.kind == RecordKind::Version)
                .count() as u64,
            commits: self.commits.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            total_size_bytes: records.values().map(|v| v.len() as u64).sum(),
        }
    }

    // === Persistence ===

    /// Save all committed records to a JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), StoreError> {
        let rows = self
            .records
            .read()
            .iter()
            .map(|(key, bytes)| {
                serde_json::from_slice(bytes).map(|value| StoredRow {
                    key: key.clone(),
                    value,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        let data = serde_json::to_vec(&rows)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        std::fs::write(path, data)?;
        Ok(())
    }

    /// Load a store previously written by [`MemoryStore::save_to_file`]
    pub fn load_from_file(path: &Path) -> Result<Self, StoreError> {
        let data = std::fs::read(path)?;
        let rows: Vec<StoredRow> = serde_json::from_slice(&data)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        let mut records = BTreeMap::new();
        for row in rows {
            let bytes = serde_json::to_vec(&row.value)
                .map_err(|e| StoreError::SerializationError(e.to_string()))?;
            records.insert(row.key, bytes);
        }

        Ok(Self {
            records: RwLock::new(records),
            commits: AtomicU64::new(0),
            aborts: AtomicU64::new(0),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize)]
struct StoredRow {
    key: RecordKey,
    value: serde_json::Value,
}

impl HistoryStore for MemoryStore {
    fn begin(&self) -> Box<dyn UnitOfWork + '_> {
        Box::new(MemoryUnitOfWork {
            store: self,
            staged: BTreeMap::new(),
        })
    }

    fn read(&self, key: &RecordKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records.read().get(key).cloned())
    }

    fn scan(&self, kind: RecordKind, prefix: &str) -> Result<Vec<(RecordKey, Vec<u8>)>, StoreError> {
        let start = RecordKey::new(kind, prefix);
        Ok(self
            .records
            .read()
            .range(start..)
            .take_while(|(k, _)| k.kind == kind && k.id.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Staged writes against a [`MemoryStore`]. `None` marks a deletion.
struct MemoryUnitOfWork<'a> {
    store: &'a MemoryStore,
    staged: BTreeMap<RecordKey, Option<Vec<u8>>>,
}

impl UnitOfWork for MemoryUnitOfWork<'_> {
    fn read(&self, key: &RecordKey) -> Result<Option<Vec<u8>>, StoreError> {
        match self.staged.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => self.store.read(key),
        }
    }

    fn write(&mut self, key: RecordKey, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.staged.insert(key, Some(bytes));
        Ok(())
    }

    fn delete(&mut self, key: &RecordKey) -> Result<(), StoreError> {
        self.staged.insert(key.clone(), None);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut records = this.store.records.write();
        for (key, value) in this.staged {
            match value {
                Some(bytes) => {
                    records.insert(key, bytes);
                }
                None => {
                    records.remove(&key);
                }
            }
        }
        this.store.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn abort(self: Box<Self>) {
        self.store.aborts.fetch_add(1, Ordering::Relaxed);
    }
}
