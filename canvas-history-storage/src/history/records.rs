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

//! Storage records for the history engine

use super::store::{Record, RecordKey, RecordKind, StoreError};
use canvas_history_core::{
    Branch, Comparison, ComparisonType, DocumentId, DocumentState, Rollback, Version, VersionId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The live document row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: DocumentId,
    pub state: DocumentState,
    /// Bumped on every write, including rollbacks
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn new(document_id: DocumentId, state: DocumentState) -> Self {
        Self {
            document_id,
            state,
            revision: 1,
            updated_at: Utc::now(),
        }
    }

    pub fn replace_state(&mut self, state: DocumentState) {
        self.state = state;
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

/// Per-document index `version_number -> version id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHistory {
    pub document_id: DocumentId,
    pub versions: BTreeMap<u64, VersionId>,
}

impl DocumentHistory {
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            versions: BTreeMap::new(),
        }
    }

    pub fn next_version_number(&self) -> u64 {
        self.versions.keys().next_back().map_or(1, |n| n + 1)
    }

    pub fn latest(&self) -> Option<VersionId> {
        self.versions.values().next_back().copied()
    }

    /// Index a version. A number can be taken only once.
    pub fn record(&mut self, version_number: u64, version_id: VersionId) -> Result<(), StoreError> {
        if self.versions.contains_key(&version_number) {
            return Err(StoreError::Conflict(RecordKey::new(
                RecordKind::History,
                format!("{}#{}", self.document_id, version_number),
            )));
        }
        self.versions.insert(version_number, version_id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Storage id of a branch record.
///
/// Both document ids and branch names may contain `/`, so the document id is
/// length-prefixed to keep `(document, branch)` pairs distinct.
pub fn branch_record_id(document_id: &DocumentId, name: &str) -> String {
    format!("{}:{document_id}/{name}", document_id.as_str().len())
}

/// Storage id of a cached comparison
pub fn comparison_record_id(a: VersionId, b: VersionId, comparison_type: ComparisonType) -> String {
    format!("{a}:{b}:{}", comparison_type.as_str())
}

impl Record for DocumentRecord {
    const KIND: RecordKind = RecordKind::Document;

    fn record_id(&self) -> String {
        self.document_id.to_string()
    }
}

impl Record for DocumentHistory {
    const KIND: RecordKind = RecordKind::History;

    fn record_id(&self) -> String {
        self.document_id.to_string()
    }
}

impl Record for Version {
    const KIND: RecordKind = RecordKind::Version;

    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

impl Record for Branch {
    const KIND: RecordKind = RecordKind::Branch;

    fn record_id(&self) -> String {
        branch_record_id(&self.document_id, &self.name)
    }
}

impl Record for Rollback {
    const KIND: RecordKind = RecordKind::Rollback;

    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

impl Record for Comparison {
    const KIND: RecordKind = RecordKind::Comparison;

    fn record_id(&self) -> String {
        comparison_record_id(self.version_a_id, self.version_b_id, self.comparison_type)
    }
}
