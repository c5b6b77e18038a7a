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

//! Canvas History Core
//!
//! Data model for versioned canvas documents: document states, version
//! nodes, branches, rollback and comparison records, content hashes,
//! structural patches and engine configuration.

pub mod branch;
pub mod comparison;
pub mod config;
pub mod document;
pub mod hash;
pub mod ids;
pub mod patch;
pub mod rollback;
pub mod version;

pub use branch::{validate_branch_name, Branch};
pub use comparison::{Comparison, ComparisonDiff, ComparisonType, ModifiedElement};
pub use config::{
    AutosaveConfig, ComparisonConfig, ConfigError, HistoryConfig, HistoryListConfig,
    ReconstructionConfig, RollbackConfig, SnapshotConfig, DEFAULT_COMPARISON_TTL_SECS,
    DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_MAX_CHAIN_DEPTH, DEFAULT_SNAPSHOT_INTERVAL,
    MAX_COMPARISON_TTL_SECS,
};
pub use document::{CanvasMeta, DocumentState, Element};
pub use hash::ContentHash;
pub use ids::{ComparisonId, DocumentId, ElementId, ParseError, RollbackId, UserId, VersionId};
pub use patch::{PatchError, PatchOp};
pub use rollback::{
    Conflict, ConflictKind, ConflictResolution, InvalidTransition, Rollback, RollbackEvent,
    RollbackStatus, RollbackType,
};
pub use version::{
    ChangeStats, ChangeType, DeltaOperation, OperationType, SnapshotData, Version,
    VersionPayload, VersionSummary, VersionType, DEFAULT_BRANCH,
};
