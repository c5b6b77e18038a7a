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

//! Version comparison
//!
//! Structural diff between two reconstructed states plus a Jaccard
//! similarity over element ids. Results are cached in memory and persisted
//! with an expiry.

use super::codec::classify_change;
use super::error::{HistoryError, HistoryResult};
use super::reconstruct::Reconstructor;
use super::records::comparison_record_id;
use super::store::HistoryStore;
use canvas_history_core::{
    Comparison, ComparisonConfig, ComparisonDiff, ComparisonId, ComparisonType, DocumentId,
    DocumentState, ModifiedElement, Version, VersionId, MAX_COMPARISON_TTL_SECS,
};
use chrono::Utc;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComparisonKey {
    pub version_a: VersionId,
    pub version_b: VersionId,
    pub comparison_type: ComparisonType,
}

impl ComparisonKey {
    pub fn record_id(&self) -> String {
        comparison_record_id(self.version_a, self.version_b, self.comparison_type)
    }
}

/// Diff from `a` to `b`. Canvas changes are ignored for `ElementsOnly`.
pub fn diff_states(a: &DocumentState, b: &DocumentState, comparison_type: ComparisonType) -> ComparisonDiff {
    let mut diff = ComparisonDiff {
        canvas_changed: comparison_type == ComparisonType::Full && a.canvas != b.canvas,
        ..ComparisonDiff::default()
    };

    for (id, before) in &a.elements {
        match b.elements.get(id) {
            None => diff.removed.push(id.clone()),
            Some(after) => match classify_change(before, after) {
                Some(change) => diff.modified.push(ModifiedElement {
                    element_id: id.clone(),
                    change,
                }),
                None => diff.unchanged_count += 1,
            },
        }
    }
    diff.added = b
        .elements
        .keys()
        .filter(|id| !a.elements.contains_key(*id))
        .cloned()
        .collect();

    diff
}

/// Jaccard similarity of the element id sets.
///
/// Two empty documents are identical (1.0).
pub fn similarity_score(a: &DocumentState, b: &DocumentState) -> f64 {
    let intersection = a
        .elements
        .keys()
        .filter(|id| b.elements.contains_key(*id))
        .count();
    let union = a.element_count() + b.element_count() - intersection;
    if union == 0 {
        return 1.0;
    }
    intersection as f64 / union as f64
}

pub struct Comparator {
    store: Arc<dyn HistoryStore>,
    reconstructor: Arc<Reconstructor>,
    cache: Cache<ComparisonKey, Arc<Comparison>>,
    ttl: chrono::Duration,
}

impl Comparator {
    /// TTLs above [`MAX_COMPARISON_TTL_SECS`] are clamped
    pub fn new(store: Arc<dyn HistoryStore>, reconstructor: Arc<Reconstructor>, config: &ComparisonConfig) -> Self {
        let ttl_secs = config.ttl_secs.min(MAX_COMPARISON_TTL_SECS);
        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            store,
            reconstructor,
            cache,
            ttl: chrono::Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1_000)),
        }
    }

    pub fn compare(
        &self,
        document_id: &DocumentId,
        version_a_id: VersionId,
        version_b_id: VersionId,
        comparison_type: ComparisonType,
    ) -> HistoryResult<Comparison> {
        let key = ComparisonKey {
            version_a: version_a_id,
            version_b: version_b_id,
            comparison_type,
        };
        let now = Utc::now();

        if let Some(hit) = self.cache.get(&key) {
            if !hit.is_expired(now) && &hit.document_id == document_id {
                debug!(comparison = %key.record_id(), "Comparison cache hit");
                return Ok((*hit).clone());
            }
        }

        if let Some(stored) = self.store.get::<Comparison>(&key.record_id())? {
            if !stored.is_expired(now) && &stored.document_id == document_id {
                debug!(comparison = %key.record_id(), "Comparison loaded from store");
                self.cache.insert(key, Arc::new(stored.clone()));
                return Ok(stored);
            }
        }

        let version_a = self.load(document_id, version_a_id)?;
        let version_b = self.load(document_id, version_b_id)?;
        let state_a = self.reconstructor.reconstruct_version(&version_a)?;
        let state_b = self.reconstructor.reconstruct_version(&version_b)?;

        let comparison = Comparison {
            id: ComparisonId::new(),
            document_id: document_id.clone(),
            version_a_id,
            version_b_id,
            comparison_type,
            diff: diff_states(&state_a, &state_b, comparison_type),
            similarity_score: similarity_score(&state_a, &state_b),
            created_at: now,
            expires_at: now + self.ttl,
        };

        if let Err(err) = self.store.put_one(&comparison) {
            warn!(comparison = %key.record_id(), error = %err, "Failed to persist comparison");
        }
        self.cache.insert(key, Arc::new(comparison.clone()));

        info!(
            document_id = %document_id,
            version_a = version_a.version_number,
            version_b = version_b.version_number,
            added = comparison.diff.added.len(),
            removed = comparison.diff.removed.len(),
            modified = comparison.diff.modified.len(),
            similarity = comparison.similarity_score,
            "Compared versions"
        );

        Ok(comparison)
    }

    /// Delete persisted comparisons past their expiry. Returns how many.
    pub fn purge_expired(&self) -> HistoryResult<usize> {
        let now = Utc::now();
        let expired: Vec<Comparison> = self
            .store
            .list::<Comparison>("")?
            .into_iter()
            .filter(|c| c.is_expired(now))
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let mut uow = self.store.begin();
        for comparison in &expired {
            uow.remove::<Comparison>(&comparison_record_id(
                comparison.version_a_id,
                comparison.version_b_id,
                comparison.comparison_type,
            ))?;
        }
        uow.commit()?;

        debug!(purged = expired.len(), "Purged expired comparisons");
        Ok(expired.len())
    }

    fn load(&self, document_id: &DocumentId, version_id: VersionId) -> HistoryResult<Version> {
        let version = self
            .store
            .get::<Version>(&version_id.to_string())?
            .ok_or_else(|| HistoryError::not_found("version", version_id))?;
        if &version.document_id != document_id {
            return Err(HistoryError::Validation(format!(
                "version {version_id} does not belong to document {document_id}"
            )));
        }
        Ok(version)
    }
}
