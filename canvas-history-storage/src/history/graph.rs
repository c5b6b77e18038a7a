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

//! Version Graph - Version Creation and Branch Heads
//!
//! Appends versions to a document's history. Creation is serialized per
//! document; the version node, the history index and the branch head are
//! written in one unit of work.

use super::codec::create_delta;
use super::error::{HistoryError, HistoryResult};
use super::provider::DocumentStateProvider;
use super::reconstruct::Reconstructor;
use super::records::{branch_record_id, DocumentHistory};
use super::snapshot::SnapshotPolicy;
use super::store::HistoryStore;
use canvas_history_core::{
    validate_branch_name, Branch, ChangeStats, ChangeType, DocumentId, DocumentState, UserId,
    Version, VersionId, VersionPayload, DEFAULT_BRANCH,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Parameters of a new version
#[derive(Debug, Clone)]
pub struct CreateVersionRequest {
    pub change_type: ChangeType,
    pub commit_message: Option<String>,
    /// Defaults to `main`
    pub branch_name: Option<String>,
    pub tags: BTreeSet<String>,
    pub is_milestone: bool,
    pub force_snapshot: bool,
    pub merge_source_id: Option<VersionId>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CreateVersionRequest {
    pub fn new(change_type: ChangeType) -> Self {
        Self {
            change_type,
            commit_message: None,
            branch_name: None,
            tags: BTreeSet::new(),
            is_milestone: false,
            force_snapshot: false,
            merge_source_id: None,
            expires_at: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }

    pub fn on_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch_name = Some(branch.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn milestone(mut self) -> Self {
        self.is_milestone = true;
        self
    }

    pub fn force_snapshot(mut self) -> Self {
        self.force_snapshot = true;
        self
    }

    pub fn merged_from(mut self, source: VersionId) -> Self {
        self.merge_source_id = Some(source);
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn branch(&self) -> &str {
        self.branch_name.as_deref().unwrap_or(DEFAULT_BRANCH)
    }

    fn validate(&self, now: DateTime<Utc>) -> HistoryResult<()> {
        validate_branch_name(self.branch())
            .map_err(|reason| HistoryError::Validation(format!("invalid branch name: {reason}")))?;

        if self.change_type.as_str().trim().is_empty() {
            return Err(HistoryError::Validation("change type must not be empty".into()));
        }
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(HistoryError::Validation("tags must not be empty".into()));
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err(HistoryError::Validation(format!(
                    "expires_at {expires_at} is not in the future"
                )));
            }
        }
        Ok(())
    }
}

pub struct VersionGraph {
    store: Arc<dyn HistoryStore>,
    provider: Arc<dyn DocumentStateProvider>,
    reconstructor: Arc<Reconstructor>,
    policy: SnapshotPolicy,
    autosave_threshold: usize,
    locks: DashMap<DocumentId, Arc<Mutex<()>>>,
}

impl VersionGraph {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        provider: Arc<dyn DocumentStateProvider>,
        reconstructor: Arc<Reconstructor>,
        policy: SnapshotPolicy,
        autosave_threshold: usize,
    ) -> Self {
        Self {
            store,
            provider,
            reconstructor,
            policy,
            autosave_threshold,
            locks: DashMap::new(),
        }
    }

    /// Record the document's current state as a new version.
    ///
    /// An `auto_save` whose content matches the branch head is skipped and
    /// the head is returned instead.
    pub fn create_version(
        &self,
        document_id: &DocumentId,
        user_id: &UserId,
        request: CreateVersionRequest,
    ) -> HistoryResult<Version> {
        let lock = self.document_lock(document_id);
        let _guard = lock.lock();
        self.create_version_locked(document_id, user_id, request)
    }

    /// [`create_version`](Self::create_version) for callers already holding
    /// the document lock
    pub(crate) fn create_version_locked(
        &self,
        document_id: &DocumentId,
        user_id: &UserId,
        request: CreateVersionRequest,
    ) -> HistoryResult<Version> {
        let now = Utc::now();
        request.validate(now)?;

        let state = self.provider.current_state(document_id, user_id)?;
        let mut history = self
            .store
            .get::<DocumentHistory>(document_id.as_str())?
            .unwrap_or_else(|| DocumentHistory::new(document_id.clone()));
        let branch_name = request.branch().to_string();
        let branch = self
            .store
            .get::<Branch>(&branch_record_id(document_id, &branch_name))?;

        let canvas_hash = state.canvas_hash()?;
        let elements_hash = state.elements_hash()?;
        let element_count = state.element_count();

        if request.change_type == ChangeType::AutoSave {
            if let Some(head) = &branch {
                let head = self.get_version(head.head)?;
                if head.elements_hash == elements_hash
                    && head.element_count.abs_diff(element_count) <= self.autosave_threshold
                {
                    debug!(
                        document_id = %document_id,
                        version = head.version_number,
                        "Auto-save skipped, no element changes since head"
                    );
                    return Ok(head);
                }
            }
        }

        let parent_version_id = self.resolve_parent(document_id, branch.as_ref(), &history)?;
        let version_number = history.next_version_number();
        let snapshot = self.policy.should_snapshot(
            &request.change_type,
            version_number,
            request.force_snapshot,
            parent_version_id.is_some(),
        );

        let (payload, stats) = match parent_version_id {
            None => (
                VersionPayload::Snapshot(self.policy.encode(&state)?),
                ChangeStats::initial(element_count),
            ),
            Some(parent_id) => {
                let parent_state = self.reconstructor.reconstruct(parent_id)?;
                let ops = create_delta(&parent_state, &state)?;
                let stats = ChangeStats::from_operations(&ops);
                let payload = if snapshot {
                    VersionPayload::Snapshot(self.policy.encode(&state)?)
                } else {
                    VersionPayload::Delta(ops)
                };
                (payload, stats)
            }
        };

        let version = Version {
            id: VersionId::new(),
            document_id: document_id.clone(),
            version_number,
            parent_version_id,
            change_type: request.change_type,
            commit_message: request.commit_message,
            branch_name: branch_name.clone(),
            merge_source_id: request.merge_source_id,
            is_milestone: request.is_milestone,
            tags: request.tags,
            payload,
            canvas_hash,
            elements_hash,
            element_count,
            stats,
            created_by: user_id.clone(),
            created_at: now,
            expires_at: request.expires_at,
        };

        history.record(version_number, version.id)?;
        let branch = match branch {
            Some(mut existing) => {
                existing.advance(version.id);
                existing
            }
            None => Branch::new(document_id.clone(), branch_name, version.id),
        };

        let mut uow = self.store.begin();
        uow.put(&version)?;
        uow.put(&history)?;
        uow.put(&branch)?;
        uow.commit()?;

        self.reconstructor.remember(version.id, &state);

        info!(
            document_id = %document_id,
            version = version.version_number,
            version_id = %version.id.short(),
            version_type = ?version.version_type(),
            change_type = %version.change_type,
            branch = %version.branch_name,
            changes = version.stats.total_changes,
            "Created version"
        );

        Ok(version)
    }

    /// Parent of a new version on `branch`.
    ///
    /// A branch without a head forks from `main`, or from the latest
    /// version when `main` has none either. `None` only for a document's
    /// first version.
    fn resolve_parent(
        &self,
        document_id: &DocumentId,
        branch: Option<&Branch>,
        history: &DocumentHistory,
    ) -> HistoryResult<Option<VersionId>> {
        if let Some(branch) = branch {
            return Ok(Some(branch.head));
        }
        if let Some(head) = self.branch_head(document_id, DEFAULT_BRANCH)? {
            return Ok(Some(head));
        }
        Ok(history.latest())
    }

    /// Mutex serializing version creation and rollback for one document
    pub(crate) fn document_lock(&self, document_id: &DocumentId) -> Arc<Mutex<()>> {
        self.locks
            .entry(document_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn get_version(&self, version_id: VersionId) -> HistoryResult<Version> {
        self.store
            .get::<Version>(&version_id.to_string())?
            .ok_or_else(|| HistoryError::not_found("version", version_id))
    }

    /// Reconstruct the full state of a version
    pub fn version_state(&self, version_id: VersionId) -> HistoryResult<DocumentState> {
        self.reconstructor.reconstruct(version_id)
    }

    pub fn history(&self, document_id: &DocumentId) -> HistoryResult<DocumentHistory> {
        Ok(self
            .store
            .get::<DocumentHistory>(document_id.as_str())?
            .unwrap_or_else(|| DocumentHistory::new(document_id.clone())))
    }

    /// All versions of a document, oldest first
    pub fn versions(&self, document_id: &DocumentId) -> HistoryResult<Vec<Version>> {
        self.history(document_id)?
            .versions
            .values()
            .map(|id| {
                self.get_version(*id)
                    .map_err(|_| HistoryError::corrupt(*id, "indexed version is missing"))
            })
            .collect()
    }

    pub fn branch_head(&self, document_id: &DocumentId, branch: &str) -> HistoryResult<Option<VersionId>> {
        Ok(self
            .store
            .get::<Branch>(&branch_record_id(document_id, branch))?
            .map(|b| b.head))
    }

    /// Branches of a document, by name
    pub fn list_branches(&self, document_id: &DocumentId) -> HistoryResult<Vec<Branch>> {
        let prefix = branch_record_id(document_id, "");
        let mut branches: Vec<Branch> = self
            .store
            .list::<Branch>(&prefix)?
            .into_iter()
            .filter(|b| &b.document_id == document_id)
            .collect();
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }
}
