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

//! Collaborators consumed by the engine
//!
//! The live document content and the presence system are owned elsewhere;
//! the engine only needs a snapshot of the current state and a count of
//! active editing sessions.

use super::error::{HistoryError, HistoryResult};
use super::records::DocumentRecord;
use super::store::HistoryStore;
use canvas_history_core::{DocumentId, DocumentState, UserId};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Source of the current content of a document
pub trait DocumentStateProvider: Send + Sync {
    fn current_state(&self, document_id: &DocumentId, user_id: &UserId) -> HistoryResult<DocumentState>;
}

/// Presence: how many sessions are editing a document right now
pub trait SessionTracker: Send + Sync {
    fn active_sessions(&self, document_id: &DocumentId) -> usize;
}

/// Reads and writes the live [`DocumentRecord`] in a [`HistoryStore`]
pub struct StoreDocumentProvider {
    store: Arc<dyn HistoryStore>,
}

impl StoreDocumentProvider {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    pub fn document(&self, document_id: &DocumentId) -> HistoryResult<DocumentRecord> {
        self.store
            .get::<DocumentRecord>(document_id.as_str())?
            .ok_or_else(|| HistoryError::not_found("document", document_id))
    }

    /// Overwrite the live state, creating the document on first write.
    /// Returns the new revision.
    pub fn save_state(&self, document_id: &DocumentId, state: DocumentState) -> HistoryResult<u64> {
        let mut uow = self.store.begin();
        let record = match uow.get::<DocumentRecord>(document_id.as_str())? {
            Some(mut existing) => {
                existing.replace_state(state);
                existing
            }
            None => DocumentRecord::new(document_id.clone(), state),
        };
        uow.put(&record)?;
        uow.commit()?;
        Ok(record.revision)
    }
}

impl DocumentStateProvider for StoreDocumentProvider {
    fn current_state(&self, document_id: &DocumentId, _user_id: &UserId) -> HistoryResult<DocumentState> {
        Ok(self.document(document_id)?.state)
    }
}

/// Presence tracking for embedding and tests
#[derive(Default)]
pub struct InMemorySessionTracker {
    sessions: DashMap<DocumentId, HashSet<UserId>>,
}

impl InMemorySessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, document_id: &DocumentId, user_id: &UserId) {
        self.sessions
            .entry(document_id.clone())
            .or_default()
            .insert(user_id.clone());
    }

    pub fn leave(&self, document_id: &DocumentId, user_id: &UserId) {
        if let Some(mut users) = self.sessions.get_mut(document_id) {
            users.remove(user_id);
        }
        self.sessions.remove_if(document_id, |_, users| users.is_empty());
    }
}

impl SessionTracker for InMemorySessionTracker {
    fn active_sessions(&self, document_id: &DocumentId) -> usize {
        self.sessions.get(document_id).map_or(0, |users| users.len())
    }
}
