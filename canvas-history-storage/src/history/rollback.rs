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

//! Rollback Coordinator
//!
//! Restores a document to the state of an earlier version.
//!
//! ```text
//!  Pending ─Start─► Processing ─Complete─► Completed
//!                      │  │  └──Fail────► Failed
//!                      │  └─Cancel──────► Cancelled
//!                      └─DetectConflict─► Conflict ─(resolution)─► Completed | Cancelled | Failed
//! ```
//!
//! Every persisted rollback record references a backup version (a forced
//! snapshot of the pre-rollback state). Backup and document write run under
//! the document lock; a forced resolution takes a fresh backup first. The
//! document write and the `Completed` record are committed in one unit of
//! work.

use super::error::{HistoryError, HistoryResult};
use super::graph::{CreateVersionRequest, VersionGraph};
use super::provider::SessionTracker;
use super::reconstruct::Reconstructor;
use super::records::DocumentRecord;
use super::store::HistoryStore;
use canvas_history_core::{
    ChangeType, Conflict, ConflictResolution, DocumentId, DocumentState, Rollback, RollbackEvent,
    RollbackId, RollbackStatus, RollbackType, UserId, Version, VersionId,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct RollbackRequest {
    pub target_version_id: VersionId,
    pub rollback_type: RollbackType,
    /// How to proceed if other users are editing. `None` stops at `Conflict`.
    pub conflict_resolution: Option<ConflictResolution>,
}

impl RollbackRequest {
    pub fn full(target_version_id: VersionId) -> Self {
        Self {
            target_version_id,
            rollback_type: RollbackType::Full,
            conflict_resolution: None,
        }
    }

    pub fn elements_only(target_version_id: VersionId) -> Self {
        Self {
            target_version_id,
            rollback_type: RollbackType::ElementsOnly,
            conflict_resolution: None,
        }
    }

    pub fn on_conflict(mut self, resolution: ConflictResolution) -> Self {
        self.conflict_resolution = Some(resolution);
        self
    }
}

pub struct RollbackCoordinator {
    store: Arc<dyn HistoryStore>,
    graph: Arc<VersionGraph>,
    reconstructor: Arc<Reconstructor>,
    sessions: Arc<dyn SessionTracker>,
    transaction_timeout: Duration,
}

impl RollbackCoordinator {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        graph: Arc<VersionGraph>,
        reconstructor: Arc<Reconstructor>,
        sessions: Arc<dyn SessionTracker>,
        transaction_timeout: Duration,
    ) -> Self {
        Self {
            store,
            graph,
            reconstructor,
            sessions,
            transaction_timeout,
        }
    }

    pub fn rollback(
        &self,
        document_id: &DocumentId,
        user_id: &UserId,
        request: RollbackRequest,
    ) -> HistoryResult<Rollback> {
        if self.store.get::<DocumentRecord>(document_id.as_str())?.is_none() {
            return Err(HistoryError::not_found("document", document_id));
        }
        let target = self.graph.get_version(request.target_version_id)?;
        if &target.document_id != document_id {
            return Err(HistoryError::Validation(format!(
                "version {} does not belong to document {}",
                target.id, document_id
            )));
        }
        let target_state = self.reconstructor.reconstruct_version(&target)?;

        let lock = self.graph.document_lock(document_id);
        let _guard = lock.lock();

        let source_version_id = self.graph.branch_head(document_id, &target.branch_name)?;
        let backup = self.backup(document_id, user_id, &target)?;

        let mut record = Rollback::new(
            document_id.clone(),
            target.id,
            request.rollback_type,
            user_id.clone(),
        );
        record.source_version_id = source_version_id;
        record.backup_version_id = Some(backup.id);
        record.conflict_resolution = request.conflict_resolution;
        record.apply(RollbackEvent::Start)?;
        self.store.put_one(&record)?;

        info!(
            rollback_id = %record.id.short(),
            document_id = %document_id,
            target_version = target.version_number,
            backup_version = backup.version_number,
            rollback_type = ?record.rollback_type,
            "Rollback started"
        );

        let active = self.sessions.active_sessions(document_id);
        if active > 1 {
            record.conflicts.push(Conflict::concurrent_sessions(active));
            warn!(
                rollback_id = %record.id.short(),
                document_id = %document_id,
                active_sessions = active,
                resolution = ?request.conflict_resolution,
                "Rollback conflicts with active editing sessions"
            );
            match request.conflict_resolution {
                Some(ConflictResolution::ForceOverwrite) => {}
                Some(ConflictResolution::Cancel) => return self.cancel(record),
                Some(ConflictResolution::Manual) | None => {
                    record.apply(RollbackEvent::DetectConflict)?;
                    self.store.put_one(&record)?;
                    return Ok(record);
                }
            }
        }

        self.execute(record, &target_state)
    }

    /// Settle a rollback stopped in `Conflict`
    pub fn resolve_conflict(
        &self,
        rollback_id: RollbackId,
        user_id: &UserId,
        resolution: ConflictResolution,
    ) -> HistoryResult<Rollback> {
        let mut record = self.get_rollback(rollback_id)?;
        if record.status != RollbackStatus::Conflict {
            return Err(HistoryError::Validation(format!(
                "rollback {rollback_id} is {:?}, not awaiting conflict resolution",
                record.status
            )));
        }

        info!(
            rollback_id = %rollback_id.short(),
            user_id = %user_id,
            resolution = ?resolution,
            "Resolving rollback conflict"
        );

        match resolution {
            ConflictResolution::Manual => Err(HistoryError::Validation(
                "manual resolution happens in the editor; choose cancel or force_overwrite".into(),
            )),
            ConflictResolution::Cancel => {
                record.conflict_resolution = Some(resolution);
                self.cancel(record)
            }
            ConflictResolution::ForceOverwrite => {
                record.conflict_resolution = Some(resolution);
                let target = self.graph.get_version(record.target_version_id)?;
                let target_state = self.reconstructor.reconstruct_version(&target)?;

                let lock = self.graph.document_lock(&record.document_id);
                let _guard = lock.lock();

                // Edits made while the rollback sat in Conflict need their own backup
                record.source_version_id =
                    self.graph.branch_head(&record.document_id, &target.branch_name)?;
                let backup = self.backup(&record.document_id, user_id, &target)?;
                record.backup_version_id = Some(backup.id);
                self.store.put_one(&record)?;

                self.execute(record, &target_state)
            }
        }
    }

    /// Forced snapshot of the live document on the target's branch.
    /// Caller holds the document lock.
    fn backup(&self, document_id: &DocumentId, user_id: &UserId, target: &Version) -> HistoryResult<Version> {
        self.graph.create_version_locked(
            document_id,
            user_id,
            CreateVersionRequest::new(ChangeType::Rollback)
                .with_message(format!("Backup before rollback to version {}", target.version_number))
                .on_branch(target.branch_name.clone())
                .force_snapshot(),
        )
    }

    pub fn get_rollback(&self, rollback_id: RollbackId) -> HistoryResult<Rollback> {
        self.store
            .get::<Rollback>(&rollback_id.to_string())?
            .ok_or_else(|| HistoryError::not_found("rollback", rollback_id))
    }

    fn cancel(&self, mut record: Rollback) -> HistoryResult<Rollback> {
        record.apply(RollbackEvent::Cancel)?;
        self.store.put_one(&record)?;
        info!(rollback_id = %record.id.short(), "Rollback cancelled");
        Ok(record)
    }

    fn execute(&self, record: Rollback, target_state: &DocumentState) -> HistoryResult<Rollback> {
        let started = Instant::now();
        match self.apply_state(&record, target_state, started) {
            Ok(completed) => {
                info!(
                    rollback_id = %completed.id.short(),
                    document_id = %completed.document_id,
                    processing_time_ms = completed.processing_time_ms,
                    "Rollback completed"
                );
                Ok(completed)
            }
            Err(err) => {
                let mut failed = record;
                failed.processing_time_ms = Some(started.elapsed().as_millis() as u64);
                failed.error_message = Some(err.to_string());
                failed.apply(RollbackEvent::Fail)?;
                self.store.put_one(&failed)?;

                error!(
                    rollback_id = %failed.id.short(),
                    document_id = %failed.document_id,
                    error = %err,
                    "Rollback failed"
                );

                Err(match err {
                    HistoryError::Timeout { .. } => err,
                    other => HistoryError::TransactionFailed {
                        rollback_id: failed.id,
                        message: other.to_string(),
                    },
                })
            }
        }
    }

    /// Replace the live document and complete the record in one unit of work
    fn apply_state(
        &self,
        record: &Rollback,
        target_state: &DocumentState,
        started: Instant,
    ) -> HistoryResult<Rollback> {
        let mut uow = self.store.begin();

        let mut document = uow
            .get::<DocumentRecord>(record.document_id.as_str())?
            .ok_or_else(|| HistoryError::not_found("document", &record.document_id))?;
        let next_state = match record.rollback_type {
            RollbackType::Full => target_state.clone(),
            RollbackType::ElementsOnly => DocumentState {
                canvas: document.state.canvas.clone(),
                elements: target_state.elements.clone(),
            },
        };
        document.replace_state(next_state);
        uow.put(&document)?;

        let mut completed = record.clone();
        completed.processing_time_ms = Some(started.elapsed().as_millis() as u64);
        completed.apply(RollbackEvent::Complete)?;
        uow.put(&completed)?;

        let elapsed = started.elapsed();
        if elapsed >= self.transaction_timeout {
            uow.abort();
            return Err(HistoryError::Timeout {
                operation: "rollback",
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }

        uow.commit()?;
        Ok(completed)
    }
}
