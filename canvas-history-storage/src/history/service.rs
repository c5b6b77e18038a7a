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

//! Version Service
//!
//! High-level entry point combining the version graph, reconstruction,
//! rollback and comparison.
//!
//! Callers have already been authorized; `user_id` is recorded as the
//! author or requester and never checked.

use super::compare::Comparator;
use super::error::{HistoryError, HistoryResult};
use super::graph::{CreateVersionRequest, VersionGraph};
use super::provider::{
    DocumentStateProvider, InMemorySessionTracker, SessionTracker, StoreDocumentProvider,
};
use super::reconstruct::Reconstructor;
use super::rollback::{RollbackCoordinator, RollbackRequest};
use super::snapshot::SnapshotPolicy;
use super::store::{HistoryStore, MemoryStore};
use canvas_history_core::{
    Branch, ChangeType, Comparison, ComparisonType, ConflictResolution, DocumentId, DocumentState,
    HistoryConfig, Rollback, RollbackId, UserId, Version, VersionId, VersionSummary,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// History listing filter. Empty fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryFilter {
    pub branch_name: Option<String>,
    pub change_types: Vec<ChangeType>,
    pub created_by: Option<UserId>,
    pub milestones_only: bool,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub include_expired: bool,
}

impl HistoryFilter {
    pub fn on_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch_name = Some(branch.into());
        self
    }

    pub fn with_change_type(mut self, change_type: ChangeType) -> Self {
        self.change_types.push(change_type);
        self
    }

    pub fn by(mut self, user_id: UserId) -> Self {
        self.created_by = Some(user_id);
        self
    }

    pub fn milestones_only(mut self) -> Self {
        self.milestones_only = true;
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn include_expired(mut self) -> Self {
        self.include_expired = true;
        self
    }

    fn matches(&self, version: &Version, now: DateTime<Utc>) -> bool {
        if !self.include_expired && version.is_expired(now) {
            return false;
        }
        if let Some(branch) = &self.branch_name {
            if &version.branch_name != branch {
                return false;
            }
        }
        if !self.change_types.is_empty() && !self.change_types.contains(&version.change_type) {
            return false;
        }
        if let Some(author) = &self.created_by {
            if &version.created_by != author {
                return false;
            }
        }
        if self.milestones_only && !version.is_milestone {
            return false;
        }
        if self.date_from.is_some_and(|from| version.created_at < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| version.created_at > to) {
            return false;
        }
        true
    }
}

/// One page of history, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedVersions {
    pub versions: Vec<VersionSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct CompareRequest {
    pub version_a_id: VersionId,
    pub version_b_id: VersionId,
    pub comparison_type: ComparisonType,
}

impl CompareRequest {
    pub fn full(version_a_id: VersionId, version_b_id: VersionId) -> Self {
        Self {
            version_a_id,
            version_b_id,
            comparison_type: ComparisonType::Full,
        }
    }

    pub fn elements_only(version_a_id: VersionId, version_b_id: VersionId) -> Self {
        Self {
            version_a_id,
            version_b_id,
            comparison_type: ComparisonType::ElementsOnly,
        }
    }
}

/// Everything needed to run the engine in memory
pub struct InMemoryHistory {
    pub service: VersionService,
    pub store: Arc<MemoryStore>,
    pub documents: Arc<StoreDocumentProvider>,
    pub sessions: Arc<InMemorySessionTracker>,
}

pub struct VersionService {
    config: HistoryConfig,
    graph: Arc<VersionGraph>,
    reconstructor: Arc<Reconstructor>,
    rollbacks: RollbackCoordinator,
    comparator: Comparator,
}

impl VersionService {
    pub fn new(
        config: HistoryConfig,
        store: Arc<dyn HistoryStore>,
        provider: Arc<dyn DocumentStateProvider>,
        sessions: Arc<dyn SessionTracker>,
    ) -> HistoryResult<Self> {
        config
            .validate()
            .map_err(|e| HistoryError::Validation(e.to_string()))?;

        let reconstructor = Arc::new(Reconstructor::new(store.clone(), &config.reconstruction));
        let graph = Arc::new(VersionGraph::new(
            store.clone(),
            provider,
            reconstructor.clone(),
            SnapshotPolicy::new(&config.snapshot),
            config.autosave.element_count_threshold,
        ));
        let rollbacks = RollbackCoordinator::new(
            store.clone(),
            graph.clone(),
            reconstructor.clone(),
            sessions,
            Duration::from_millis(config.rollback.transaction_timeout_ms),
        );
        let comparator = Comparator::new(store, reconstructor.clone(), &config.comparison);

        Ok(Self {
            config,
            graph,
            reconstructor,
            rollbacks,
            comparator,
        })
    }

    /// Wire a service over a fresh [`MemoryStore`]
    pub fn in_memory(config: HistoryConfig) -> HistoryResult<InMemoryHistory> {
        let store = Arc::new(MemoryStore::new());
        let documents = Arc::new(StoreDocumentProvider::new(store.clone()));
        let sessions = Arc::new(InMemorySessionTracker::new());
        let service = Self::new(config, store.clone(), documents.clone(), sessions.clone())?;
        Ok(InMemoryHistory {
            service,
            store,
            documents,
            sessions,
        })
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn create_version(
        &self,
        document_id: &DocumentId,
        user_id: &UserId,
        request: CreateVersionRequest,
    ) -> HistoryResult<Version> {
        self.graph.create_version(document_id, user_id, request)
    }

    /// List versions newest first.
    ///
    /// `limit` defaults to the configured page size and must not exceed the
    /// configured maximum.
    pub fn get_version_history(
        &self,
        document_id: &DocumentId,
        _user_id: &UserId,
        filter: &HistoryFilter,
        limit: Option<usize>,
        offset: usize,
    ) -> HistoryResult<PaginatedVersions> {
        let limit = limit.unwrap_or(self.config.history.default_limit);
        if limit == 0 || limit > self.config.history.max_limit {
            return Err(HistoryError::Validation(format!(
                "limit must be within 1..={}",
                self.config.history.max_limit
            )));
        }
        if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
            if from > to {
                return Err(HistoryError::Validation("date_from is after date_to".into()));
            }
        }

        let now = Utc::now();
        let mut matching: Vec<Version> = self
            .graph
            .versions(document_id)?
            .into_iter()
            .filter(|v| filter.matches(v, now))
            .collect();
        matching.sort_by(|a, b| b.version_number.cmp(&a.version_number));

        let total = matching.len();
        let versions: Vec<VersionSummary> = matching
            .iter()
            .skip(offset)
            .take(limit)
            .map(VersionSummary::from)
            .collect();

        Ok(PaginatedVersions {
            has_more: offset + versions.len() < total,
            versions,
            total,
            limit,
            offset,
        })
    }

    pub fn rollback_to_version(
        &self,
        document_id: &DocumentId,
        user_id: &UserId,
        request: RollbackRequest,
    ) -> HistoryResult<Rollback> {
        self.rollbacks.rollback(document_id, user_id, request)
    }

    pub fn compare_versions(
        &self,
        document_id: &DocumentId,
        _user_id: &UserId,
        request: CompareRequest,
    ) -> HistoryResult<Comparison> {
        self.comparator.compare(
            document_id,
            request.version_a_id,
            request.version_b_id,
            request.comparison_type,
        )
    }

    pub fn get_version(&self, document_id: &DocumentId, version_id: VersionId) -> HistoryResult<Version> {
        let version = self.graph.get_version(version_id)?;
        if &version.document_id != document_id {
            return Err(HistoryError::not_found("version", version_id));
        }
        Ok(version)
    }

    /// Full reconstructed state of a version
    pub fn get_version_state(&self, document_id: &DocumentId, version_id: VersionId) -> HistoryResult<DocumentState> {
        let version = self.get_version(document_id, version_id)?;
        self.reconstructor.reconstruct_version(&version)
    }

    pub fn list_branches(&self, document_id: &DocumentId) -> HistoryResult<Vec<Branch>> {
        self.graph.list_branches(document_id)
    }

    pub fn resolve_rollback_conflict(
        &self,
        rollback_id: RollbackId,
        user_id: &UserId,
        resolution: ConflictResolution,
    ) -> HistoryResult<Rollback> {
        self.rollbacks.resolve_conflict(rollback_id, user_id, resolution)
    }

    pub fn get_rollback(&self, rollback_id: RollbackId) -> HistoryResult<Rollback> {
        self.rollbacks.get_rollback(rollback_id)
    }

    pub fn purge_expired_comparisons(&self) -> HistoryResult<usize> {
        self.comparator.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_history_core::Element;
    use chrono::Duration as ChronoDuration;

    fn setup() -> (InMemoryHistory, DocumentId, UserId) {
        let history = VersionService::in_memory(HistoryConfig::testing()).unwrap();
        let doc = DocumentId::new("board");
        history.documents.save_state(&doc, DocumentState::new()).unwrap();
        (history, doc, UserId::new("alice"))
    }

    #[test]
    fn test_pagination() {
        let (h, doc, user) = setup();
        for i in 0..5 {
            h.documents
                .save_state(&doc, DocumentState::new().with_element(Element::new(format!("e{i}"), "text")))
                .unwrap();
            h.service
                .create_version(&doc, &user, CreateVersionRequest::new(ChangeType::Manual))
                .unwrap();
        }

        let page = h
            .service
            .get_version_history(&doc, &user, &HistoryFilter::default(), Some(2), 0)
            .unwrap();
        let numbers: Vec<u64> = page.versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![5, 4]);
        assert_eq!(page.total, 5);
        assert!(page.has_more);

        let last = h
            .service
            .get_version_history(&doc, &user, &HistoryFilter::default(), Some(2), 4)
            .unwrap();
        assert_eq!(last.versions.len(), 1);
        assert!(!last.has_more);
    }

    #[test]
    fn test_filters() {
        let (h, doc, user) = setup();
        let bob = UserId::new("bob");
        h.service
            .create_version(&doc, &user, CreateVersionRequest::new(ChangeType::Manual).milestone())
            .unwrap();
        h.documents
            .save_state(&doc, DocumentState::new().with_canvas("zoom", 2))
            .unwrap();
        h.service
            .create_version(&doc, &bob, CreateVersionRequest::new(ChangeType::Minor).on_branch("draft"))
            .unwrap();

        let by_bob = h
            .service
            .get_version_history(&doc, &user, &HistoryFilter::default().by(bob.clone()), None, 0)
            .unwrap();
        assert_eq!(by_bob.total, 1);
        assert_eq!(by_bob.versions[0].branch_name, "draft");

        let milestones = h
            .service
            .get_version_history(&doc, &user, &HistoryFilter::default().milestones_only(), None, 0)
            .unwrap();
        assert_eq!(milestones.total, 1);
        assert_eq!(milestones.versions[0].version_number, 1);

        let minor = h
            .service
            .get_version_history(
                &doc,
                &user,
                &HistoryFilter::default().with_change_type(ChangeType::Minor).on_branch("draft"),
                None,
                0,
            )
            .unwrap();
        assert_eq!(minor.total, 1);
    }

    #[test]
    fn test_history_validation() {
        let (h, doc, user) = setup();
        let filter = HistoryFilter::default();
        assert!(matches!(
            h.service.get_version_history(&doc, &user, &filter, Some(0), 0),
            Err(HistoryError::Validation(_))
        ));
        assert!(matches!(
            h.service.get_version_history(&doc, &user, &filter, Some(101), 0),
            Err(HistoryError::Validation(_))
        ));

        let now = Utc::now();
        let inverted = HistoryFilter::default().between(Some(now), Some(now - ChronoDuration::days(1)));
        assert!(matches!(
            h.service.get_version_history(&doc, &user, &inverted, None, 0),
            Err(HistoryError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_document_has_empty_history() {
        let (h, _doc, user) = setup();
        let page = h
            .service
            .get_version_history(&DocumentId::new("empty"), &user, &HistoryFilter::default(), None, 0)
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(!page.has_more);
    }

    #[test]
    fn test_get_version_scoped_to_document() {
        let (h, doc, user) = setup();
        let v1 = h
            .service
            .create_version(&doc, &user, CreateVersionRequest::new(ChangeType::Manual))
            .unwrap();
        assert_eq!(h.service.get_version(&doc, v1.id).unwrap().id, v1.id);
        assert!(matches!(
            h.service.get_version(&DocumentId::new("other"), v1.id),
            Err(HistoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = HistoryConfig::testing();
        config.snapshot.interval = 0;
        assert!(matches!(
            VersionService::in_memory(config),
            Err(HistoryError::Validation(_))
        ));

        let mut config = HistoryConfig::testing();
        config.comparison.ttl_secs = 100_000_000_000_000;
        assert!(matches!(
            VersionService::in_memory(config),
            Err(HistoryError::Validation(_))
        ));

        let mut config = HistoryConfig::testing();
        config.history.default_limit = 0;
        assert!(matches!(
            VersionService::in_memory(config),
            Err(HistoryError::Validation(_))
        ));
    }
}
