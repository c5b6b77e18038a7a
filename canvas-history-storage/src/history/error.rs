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

//! Engine errors

use super::store::StoreError;
use canvas_history_core::{ElementId, InvalidTransition, OperationType, RollbackId, VersionId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Corrupt history at version {version_id}: {reason}")]
    CorruptHistory { version_id: VersionId, reason: String },

    #[error("Cycle in version history at {version_id}")]
    CyclicHistory { version_id: VersionId },

    #[error("Failed to apply {operation_type} operation{}: {reason}", element_suffix(.element_id))]
    PatchApplicationFailed {
        operation_type: OperationType,
        element_id: Option<ElementId>,
        reason: String,
    },

    #[error("Rollback {rollback_id} failed: {message}")]
    TransactionFailed { rollback_id: RollbackId, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: &'static str, elapsed_ms: u64 },

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn element_suffix(element_id: &Option<ElementId>) -> String {
    match element_id {
        Some(id) => format!(" on element {id}"),
        None => String::new(),
    }
}

impl HistoryError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        HistoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn corrupt(version_id: VersionId, reason: impl Into<String>) -> Self {
        HistoryError::CorruptHistory {
            version_id,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        HistoryError::Serialization(err.to_string())
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;
