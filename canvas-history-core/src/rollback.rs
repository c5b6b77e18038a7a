// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Rollback lifecycle state machine.

use crate::ids::{DocumentId, RollbackId, UserId, VersionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackType {
    /// Replace canvas metadata and elements
    Full,
    /// Replace elements, keep current canvas metadata
    ElementsOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    Pending,
    Processing,
    Conflict,
    Completed,
    Failed,
    Cancelled,
}

impl RollbackStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RollbackStatus::Completed | RollbackStatus::Failed | RollbackStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackEvent {
    Start,
    DetectConflict,
    Complete,
    Fail,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid transition: {current:?} -> {event:?}")]
pub struct InvalidTransition {
    pub current: RollbackStatus,
    pub event: RollbackEvent,
}

impl RollbackStatus {
    pub fn transition(self, event: RollbackEvent) -> Result<RollbackStatus, InvalidTransition> {
        use RollbackEvent::*;
        use RollbackStatus::*;

        let next = match (self, event) {
            (Pending, Start) => Processing,
            (Processing, DetectConflict) => Conflict,
            (Processing, Complete) | (Conflict, Complete) => Completed,
            (Processing, Cancel) | (Conflict, Cancel) => Cancelled,
            (s, Fail) if !s.is_terminal() => Failed,
            _ => {
                return Err(InvalidTransition {
                    current: self,
                    event,
                })
            }
        };

        Ok(next)
    }
}

/// How to proceed when concurrent editing is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    Cancel,
    Manual,
    ForceOverwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    ConcurrentSessions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub active_sessions: usize,
    pub message: String,
}

impl Conflict {
    pub fn concurrent_sessions(active_sessions: usize) -> Self {
        Self {
            kind: ConflictKind::ConcurrentSessions,
            active_sessions,
            message: format!("{active_sessions} users are currently editing this document"),
        }
    }
}

/// Persistent record of one rollback attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollback {
    pub id: RollbackId,
    pub document_id: DocumentId,
    pub source_version_id: Option<VersionId>,
    pub target_version_id: VersionId,
    pub rollback_type: RollbackType,
    pub status: RollbackStatus,
    pub conflict_resolution: Option<ConflictResolution>,
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    pub backup_version_id: Option<VersionId>,
    pub processing_time_ms: Option<u64>,
    pub requested_by: UserId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Rollback {
    pub fn new(
        document_id: DocumentId,
        target_version_id: VersionId,
        rollback_type: RollbackType,
        requested_by: UserId,
    ) -> Self {
        Self {
            id: RollbackId::new(),
            document_id,
            source_version_id: None,
            target_version_id,
            rollback_type,
            status: RollbackStatus::Pending,
            conflict_resolution: None,
            conflicts: Vec::new(),
            backup_version_id: None,
            processing_time_ms: None,
            requested_by,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    /// Apply an event to the status, stamping `completed_at` on terminal states
    pub fn apply(&mut self, event: RollbackEvent) -> Result<RollbackStatus, InvalidTransition> {
        let next = self.status.transition(event)?;
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let s = RollbackStatus::Pending;
        let s = s.transition(RollbackEvent::Start).unwrap();
        assert_eq!(s, RollbackStatus::Processing);
        let s = s.transition(RollbackEvent::Complete).unwrap();
        assert_eq!(s, RollbackStatus::Completed);
        assert!(s.is_terminal());
    }

    #[test]
    fn test_conflict_can_be_resolved() {
        let s = RollbackStatus::Processing
            .transition(RollbackEvent::DetectConflict)
            .unwrap();
        assert_eq!(s, RollbackStatus::Conflict);
        assert_eq!(s.transition(RollbackEvent::Complete).unwrap(), RollbackStatus::Completed);
        assert_eq!(s.transition(RollbackEvent::Cancel).unwrap(), RollbackStatus::Cancelled);
        assert_eq!(s.transition(RollbackEvent::Fail).unwrap(), RollbackStatus::Failed);
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(RollbackStatus::Pending.transition(RollbackEvent::Complete).is_err());
        assert!(RollbackStatus::Pending.transition(RollbackEvent::DetectConflict).is_err());
        assert!(RollbackStatus::Completed.transition(RollbackEvent::Fail).is_err());
        assert!(RollbackStatus::Cancelled.transition(RollbackEvent::Start).is_err());

        let err = RollbackStatus::Failed
            .transition(RollbackEvent::Complete)
            .unwrap_err();
        assert_eq!(err.current, RollbackStatus::Failed);
        assert_eq!(err.event, RollbackEvent::Complete);
    }

    #[test]
    fn test_record_stamps_completion() {
        let mut record = Rollback::new(
            DocumentId::new("doc"),
            VersionId::new(),
            RollbackType::Full,
            UserId::new("alice"),
        );
        record.apply(RollbackEvent::Start).unwrap();
        assert!(record.completed_at.is_none());
        record.apply(RollbackEvent::Complete).unwrap();
        assert!(record.completed_at.is_some());
    }
}
