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

//! State reconstruction
//!
//! Walks from a version back to the nearest snapshot (or a cached ancestor
//! state), then replays the collected deltas oldest-first. The walk is an
//! explicit loop with a visited set and a hop ceiling, so a corrupted parent
//! chain fails with an error instead of looping or exhausting the stack.

use super::codec::apply_delta_chain;
use super::error::{HistoryError, HistoryResult};
use super::snapshot::decode_snapshot;
use super::store::HistoryStore;
use canvas_history_core::{DocumentState, ReconstructionConfig, Version, VersionId, VersionPayload};
use moka::sync::Cache;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct Reconstructor {
    store: Arc<dyn HistoryStore>,
    max_chain_depth: usize,
    timeout: Option<Duration>,
    /// Versions are immutable, so cached states never go stale
    cache: Option<Cache<VersionId, Arc<DocumentState>>>,
}

impl Reconstructor {
    pub fn new(store: Arc<dyn HistoryStore>, config: &ReconstructionConfig) -> Self {
        let cache = (config.state_cache_capacity > 0)
            .then(|| Cache::builder().max_capacity(config.state_cache_capacity).build());
        Self {
            store,
            max_chain_depth: config.max_chain_depth,
            timeout: config.timeout_ms.map(Duration::from_millis),
            cache,
        }
    }

    /// Reconstruct the state of a stored version
    pub fn reconstruct(&self, version_id: VersionId) -> HistoryResult<DocumentState> {
        if let Some(state) = self.cached(version_id) {
            return Ok(state);
        }
        let version = self.load(version_id)?;
        self.reconstruct_version(&version)
    }

    /// Reconstruct the state of an already loaded version
    pub fn reconstruct_version(&self, target: &Version) -> HistoryResult<DocumentState> {
        if let Some(state) = self.cached(target.id) {
            return Ok(state);
        }

        let started = Instant::now();
        let mut visited: HashSet<VersionId> = HashSet::new();
        let mut pending: Vec<Version> = Vec::new();
        let mut current = target.clone();

        let base = loop {
            self.check_deadline(started)?;

            if !visited.insert(current.id) {
                return Err(HistoryError::CyclicHistory {
                    version_id: current.id,
                });
            }
            if visited.len() > self.max_chain_depth {
                return Err(HistoryError::corrupt(
                    target.id,
                    format!("parent chain exceeds {} versions", self.max_chain_depth),
                ));
            }

            let parent_id = match &current.payload {
                VersionPayload::Snapshot(data) => {
                    break decode_snapshot(data)
                        .map_err(|e| HistoryError::corrupt(current.id, e.to_string()))?;
                }
                VersionPayload::Delta(_) => current.parent_version_id.ok_or_else(|| {
                    HistoryError::corrupt(current.id, "delta version has no parent")
                })?,
            };

            if let Some(state) = self.cached(parent_id) {
                debug!(version_id = %parent_id, depth = pending.len() + 1, "Reconstruction hit state cache");
                pending.push(current);
                break state;
            }

            let parent = self
                .store
                .get::<Version>(&parent_id.to_string())?
                .ok_or_else(|| {
                    HistoryError::corrupt(current.id, format!("parent {parent_id} is missing"))
                })?;
            pending.push(std::mem::replace(&mut current, parent));
        };

        let mut state = base;
        for version in pending.iter().rev() {
            self.check_deadline(started)?;
            let replay = apply_delta_chain(&state, version.delta_operations())?;
            if replay.fallbacks > 0 {
                warn!(
                    version_id = %version.id,
                    version = version.version_number,
                    fallbacks = replay.fallbacks,
                    "Delta replay used full-data fallbacks"
                );
            }
            state = replay.state;
        }

        debug!(
            version_id = %target.id,
            deltas = pending.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Reconstructed version state"
        );
        self.remember(target.id, &state);
        Ok(state)
    }

    /// Seed the cache with a state known to belong to `version_id`
    pub fn remember(&self, version_id: VersionId, state: &DocumentState) {
        if let Some(cache) = &self.cache {
            cache.insert(version_id, Arc::new(state.clone()));
        }
    }

    pub fn cached_states(&self) -> u64 {
        self.cache.as_ref().map_or(0, |cache| {
            cache.run_pending_tasks();
            cache.entry_count()
        })
    }

    fn cached(&self, version_id: VersionId) -> Option<DocumentState> {
        self.cache
            .as_ref()
            .and_then(|cache| cache.get(&version_id))
            .map(|state| (*state).clone())
    }

    fn load(&self, version_id: VersionId) -> HistoryResult<Version> {
        self.store
            .get::<Version>(&version_id.to_string())?
            .ok_or_else(|| HistoryError::not_found("version", version_id))
    }

    fn check_deadline(&self, started: Instant) -> HistoryResult<()> {
        match self.timeout {
            Some(limit) if started.elapsed() >= limit => Err(HistoryError::Timeout {
                operation: "reconstruct",
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::codec::create_delta;
    use crate::history::store::MemoryStore;
    use canvas_history_core::{
        ChangeStats, ChangeType, DocumentId, Element, SnapshotData, UserId, DEFAULT_BRANCH,
    };
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn version(number: u64, parent: Option<VersionId>, payload: VersionPayload) -> Version {
        let empty = DocumentState::new();
        Version {
            id: VersionId::new(),
            document_id: DocumentId::new("doc"),
            version_number: number,
            parent_version_id: parent,
            change_type: ChangeType::Manual,
            commit_message: None,
            branch_name: DEFAULT_BRANCH.into(),
            merge_source_id: None,
            is_milestone: false,
            tags: BTreeSet::new(),
            payload,
            canvas_hash: empty.canvas_hash().unwrap(),
            elements_hash: empty.elements_hash().unwrap(),
            element_count: 0,
            stats: ChangeStats::default(),
            created_by: UserId::new("tester"),
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    fn setup(cache: u64) -> (Arc<MemoryStore>, Reconstructor) {
        let store = Arc::new(MemoryStore::new());
        let config = ReconstructionConfig {
            max_chain_depth: 50,
            timeout_ms: None,
            state_cache_capacity: cache,
        };
        let reconstructor = Reconstructor::new(store.clone(), &config);
        (store, reconstructor)
    }

    fn put(store: &Arc<MemoryStore>, v: &Version) {
        let store: &dyn HistoryStore = &**store;
        store.put_one(v).unwrap();
    }

    #[test]
    fn test_snapshot_then_deltas() {
        let (store, reconstructor) = setup(0);
        let s1 = DocumentState::new().with_element(Element::new("a", "text"));
        let s2 = s1.clone().with_element(Element::new("b", "line"));
        let s3 = s2.clone().with_canvas("zoom", 2);

        let v1 = version(1, None, VersionPayload::Snapshot(SnapshotData::Raw { state: s1.clone() }));
        let v2 = version(2, Some(v1.id), VersionPayload::Delta(create_delta(&s1, &s2).unwrap()));
        let v3 = version(3, Some(v2.id), VersionPayload::Delta(create_delta(&s2, &s3).unwrap()));
        for v in [&v1, &v2, &v3] {
            put(&store, v);
        }

        assert_eq!(reconstructor.reconstruct(v3.id).unwrap(), s3);
        assert_eq!(reconstructor.reconstruct(v2.id).unwrap(), s2);
        assert_eq!(reconstructor.reconstruct(v1.id).unwrap(), s1);
    }

    #[test]
    fn test_missing_target() {
        let (_store, reconstructor) = setup(0);
        assert!(matches!(
            reconstructor.reconstruct(VersionId::new()),
            Err(HistoryError::NotFound { entity: "version", .. })
        ));
    }

    #[test]
    fn test_root_delta_is_corrupt() {
        let (store, reconstructor) = setup(0);
        let v = version(1, None, VersionPayload::Delta(vec![]));
        put(&store, &v);
        assert!(matches!(
            reconstructor.reconstruct(v.id),
            Err(HistoryError::CorruptHistory { .. })
        ));
    }

    #[test]
    fn test_missing_parent_is_corrupt() {
        let (store, reconstructor) = setup(0);
        let v = version(2, Some(VersionId::new()), VersionPayload::Delta(vec![]));
        put(&store, &v);
        assert!(matches!(
            reconstructor.reconstruct(v.id),
            Err(HistoryError::CorruptHistory { .. })
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let (store, reconstructor) = setup(0);
        let mut a = version(1, None, VersionPayload::Delta(vec![]));
        let b = version(2, Some(a.id), VersionPayload::Delta(vec![]));
        a.parent_version_id = Some(b.id);
        put(&store, &a);
        put(&store, &b);
        assert!(matches!(
            reconstructor.reconstruct(b.id),
            Err(HistoryError::CyclicHistory { .. })
        ));
    }

    #[test]
    fn test_depth_ceiling() {
        let (store, reconstructor) = setup(0);
        let root = version(1, None, VersionPayload::Snapshot(SnapshotData::Raw {
            state: DocumentState::new(),
        }));
        put(&store, &root);
        let mut parent = root.id;
        for n in 2..=60 {
            let v = version(n, Some(parent), VersionPayload::Delta(vec![]));
            put(&store, &v);
            parent = v.id;
        }
        let err = reconstructor.reconstruct(parent).unwrap_err();
        assert!(matches!(err, HistoryError::CorruptHistory { ref reason, .. } if reason.contains("exceeds 50")));
    }

    #[test]
    fn test_cache_short_circuits_walk() {
        let (store, reconstructor) = setup(16);
        let s1 = DocumentState::new().with_element(Element::new("a", "text"));
        let s2 = s1.clone().with_element(Element::new("b", "text"));

        let v1 = version(1, None, VersionPayload::Snapshot(SnapshotData::Raw { state: s1.clone() }));
        let v2 = version(2, Some(v1.id), VersionPayload::Delta(create_delta(&s1, &s2).unwrap()));
        put(&store, &v2);

        // v1 is not stored; the walk must stop at the cached state
        reconstructor.remember(v1.id, &s1);
        assert_eq!(reconstructor.reconstruct(v2.id).unwrap(), s2);
        assert!(reconstructor.cached_states() >= 2);
    }

    #[test]
    fn test_timeout() {
        let store = Arc::new(MemoryStore::new());
        let config = ReconstructionConfig {
            max_chain_depth: 10,
            timeout_ms: Some(0),
            state_cache_capacity: 0,
        };
        let reconstructor = Reconstructor::new(store.clone(), &config);
        let v = version(1, None, VersionPayload::Snapshot(SnapshotData::Raw {
            state: DocumentState::new(),
        }));
        put(&store, &v);
        assert!(matches!(
            reconstructor.reconstruct(v.id),
            Err(HistoryError::Timeout { operation: "reconstruct", .. })
        ));
    }
}
