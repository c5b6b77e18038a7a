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

//! Canvas Version History
//!
//! Git-like version control for element-based canvas documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        VersionService                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌────────────────────┐   ┌──────────────┐   │
//! │  │ VersionGraph │   │ RollbackCoordinator│   │  Comparator  │   │
//! │  │ (create,     │   │ (state machine,    │   │ (diff, score,│   │
//! │  │  branches)   │   │  backup, conflict) │   │  TTL cache)  │   │
//! │  └──────┬───────┘   └─────────┬──────────┘   └──────┬───────┘   │
//! │         │                     │                     │            │
//! │         ▼                     ▼                     ▼            │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │  Reconstructor (snapshot + delta replay, state cache)   │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │         │                                                        │
//! │         ▼                                                        │
//! │  ┌──────────────┐   ┌──────────────┐                             │
//! │  │  DeltaCodec  │   │SnapshotPolicy│                             │
//! │  └──────────────┘   └──────────────┘                             │
//! │                                                                  │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │     HistoryStore (records, staged units of work)        │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Hybrid storage**: periodic full snapshots, deltas in between
//! - **Immutable versions**: nodes are append-only; branches move
//! - **Bounded reconstruction**: cycle detection, hop ceiling, deadline
//! - **Safe rollback**: backup snapshot first, then one atomic write
//! - **Comparison**: structural diff plus Jaccard similarity, cached

pub mod codec;
pub mod compare;
pub mod error;
pub mod graph;
pub mod provider;
pub mod reconstruct;
pub mod records;
pub mod rollback;
pub mod service;
pub mod snapshot;
pub mod store;

pub use codec::{apply_delta, apply_delta_chain, classify_change, create_delta, ApplyOutcome, Replay};
pub use compare::{diff_states, similarity_score, Comparator, ComparisonKey};
pub use error::{HistoryError, HistoryResult};
pub use graph::{CreateVersionRequest, VersionGraph};
pub use provider::{
    DocumentStateProvider, InMemorySessionTracker, SessionTracker, StoreDocumentProvider,
};
pub use reconstruct::Reconstructor;
pub use records::{DocumentHistory, DocumentRecord};
pub use rollback::{RollbackCoordinator, RollbackRequest};
pub use service::{CompareRequest, HistoryFilter, InMemoryHistory, PaginatedVersions, VersionService};
pub use snapshot::{decode_snapshot, SnapshotPolicy};
pub use store::{
    HistoryStore, MemoryStore, Record, RecordKey, RecordKind, StoreError, StoreStats, UnitOfWork,
};
