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

//! Version nodes
//!
//! A version is an immutable node in a document's history tree. It carries
//! either a full snapshot of the document or the ordered list of delta
//! operations that turns its parent's state into its own.
//!
//! ```text
//!   v1 (snapshot) ◄── v2 (delta) ◄── v3 (delta) ◄── ... ◄── v10 (snapshot)
//!                          ▲
//!                          └── v4 (delta, branch "feature")
//! ```

use crate::document::DocumentState;
use crate::hash::ContentHash;
use crate::ids::{DocumentId, ElementId, ParseError, UserId, VersionId};
use crate::patch::PatchOp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Branch every document starts on
pub const DEFAULT_BRANCH: &str = "main";

/// Storage form of a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionType {
    Snapshot,
    Delta,
}

/// Why a version was created
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ChangeType {
    AutoSave,
    Manual,
    Major,
    Minor,
    Template,
    Rollback,
    Merge,
    Custom(String),
}

impl ChangeType {
    pub fn as_str(&self) -> &str {
        match self {
            ChangeType::AutoSave => "auto_save",
            ChangeType::Manual => "manual",
            ChangeType::Major => "major",
            ChangeType::Minor => "minor",
            ChangeType::Template => "template",
            ChangeType::Rollback => "rollback",
            ChangeType::Merge => "merge",
            ChangeType::Custom(name) => name,
        }
    }

    fn parse(name: &str) -> Self {
        match name {
            "auto_save" => ChangeType::AutoSave,
            "manual" => ChangeType::Manual,
            "major" => ChangeType::Major,
            "minor" => ChangeType::Minor,
            "template" => ChangeType::Template,
            "rollback" => ChangeType::Rollback,
            "merge" => ChangeType::Merge,
            other => ChangeType::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::UnknownVariant {
                kind: "change type",
                value: String::new(),
            });
        }
        Ok(Self::parse(s))
    }
}

impl From<ChangeType> for String {
    fn from(change: ChangeType) -> Self {
        change.as_str().to_string()
    }
}

impl From<String> for ChangeType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

/// Kind of a single delta operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Canvas,
    Create,
    Delete,
    Update,
    Move,
    Style,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Canvas => "canvas",
            OperationType::Create => "create",
            OperationType::Delete => "delete",
            OperationType::Update => "update",
            OperationType::Move => "move",
            OperationType::Style => "style",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a delta.
///
/// `patch` paths are relative to the operation target: the canvas map for
/// `Canvas`, or the `{element_id: element}` collection for element ops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaOperation {
    pub operation_type: OperationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<ElementId>,
    pub operation_order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_data: Option<Value>,
    #[serde(default)]
    pub patch: Vec<PatchOp>,
}

/// Snapshot body, optionally gzip-compressed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum SnapshotData {
    Raw { state: DocumentState },
    Gzip { bytes: Vec<u8>, original_size: usize },
}

impl SnapshotData {
    pub fn is_compressed(&self) -> bool {
        matches!(self, SnapshotData::Gzip { .. })
    }
}

/// Exactly one of snapshot or delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum VersionPayload {
    Snapshot(SnapshotData),
    Delta(Vec<DeltaOperation>),
}

impl VersionPayload {
    pub fn version_type(&self) -> VersionType {
        match self {
            VersionPayload::Snapshot(_) => VersionType::Snapshot,
            VersionPayload::Delta(_) => VersionType::Delta,
        }
    }
}

/// Per-version change accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStats {
    pub total_changes: u32,
    pub elements_added: u32,
    pub elements_modified: u32,
    pub elements_deleted: u32,
}

impl ChangeStats {
    /// Count element-level operations. Canvas ops count toward the total only.
    pub fn from_operations(ops: &[DeltaOperation]) -> Self {
        let mut stats = Self {
            total_changes: ops.len() as u32,
            ..Self::default()
        };
        for op in ops {
            match op.operation_type {
                OperationType::Create => stats.elements_added += 1,
                OperationType::Delete => stats.elements_deleted += 1,
                OperationType::Update | OperationType::Move | OperationType::Style => {
                    stats.elements_modified += 1
                }
                OperationType::Canvas => {}
            }
        }
        stats
    }

    /// First version of a document: every element counts as added
    pub fn initial(element_count: usize) -> Self {
        Self {
            total_changes: element_count as u32,
            elements_added: element_count as u32,
            ..Self::default()
        }
    }
}

/// An immutable node in a document's version tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub document_id: DocumentId,
    pub version_number: u64,
    pub parent_version_id: Option<VersionId>,
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    pub branch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_source_id: Option<VersionId>,
    #[serde(default)]
    pub is_milestone: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub payload: VersionPayload,
    pub canvas_hash: ContentHash,
    pub elements_hash: ContentHash,
    pub element_count: usize,
    #[serde(flatten)]
    pub stats: ChangeStats,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Version {
    pub fn version_type(&self) -> VersionType {
        self.payload.version_type()
    }

    pub fn is_snapshot(&self) -> bool {
        self.version_type() == VersionType::Snapshot
    }

    /// Delta operations, empty for snapshots
    pub fn delta_operations(&self) -> &[DeltaOperation] {
        match &self.payload {
            VersionPayload::Delta(ops) => ops,
            VersionPayload::Snapshot(_) => &[],
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Payload-free view of a version, used for history listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub id: VersionId,
    pub version_number: u64,
    pub parent_version_id: Option<VersionId>,
    pub version_type: VersionType,
    pub change_type: ChangeType,
    pub commit_message: Option<String>,
    pub branch_name: String,
    pub is_milestone: bool,
    pub tags: BTreeSet<String>,
    pub element_count: usize,
    pub stats: ChangeStats,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Version> for VersionSummary {
    fn from(v: &Version) -> Self {
        Self {
            id: v.id,
            version_number: v.version_number,
            parent_version_id: v.parent_version_id,
            version_type: v.version_type(),
            change_type: v.change_type.clone(),
            commit_message: v.commit_message.clone(),
            branch_name: v.branch_name.clone(),
            is_milestone: v.is_milestone,
            tags: v.tags.clone(),
            element_count: v.element_count,
            stats: v.stats,
            created_by: v.created_by.clone(),
            created_at: v.created_at,
            expires_at: v.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn op(kind: OperationType, order: u32) -> DeltaOperation {
        DeltaOperation {
            operation_type: kind,
            element_id: None,
            operation_order: order,
            old_data: None,
            new_data: None,
            patch: vec![],
        }
    }

    #[test]
    fn test_change_type_names() {
        assert_eq!(ChangeType::AutoSave.as_str(), "auto_save");
        assert_eq!("template".parse::<ChangeType>().unwrap(), ChangeType::Template);
        assert_eq!(
            "brainstorm".parse::<ChangeType>().unwrap(),
            ChangeType::Custom("brainstorm".into())
        );
        assert!("".parse::<ChangeType>().is_err());
    }

    #[test]
    fn test_change_type_serde_as_string() {
        let json = serde_json::to_string(&ChangeType::Major).unwrap();
        assert_eq!(json, "\"major\"");
        let back: ChangeType = serde_json::from_str("\"rollback\"").unwrap();
        assert_eq!(back, ChangeType::Rollback);
    }

    #[test]
    fn test_stats_from_operations() {
        let ops = vec![
            op(OperationType::Canvas, 0),
            op(OperationType::Delete, 1),
            op(OperationType::Create, 2),
            op(OperationType::Create, 3),
            op(OperationType::Move, 4),
            op(OperationType::Style, 5),
        ];
        let stats = ChangeStats::from_operations(&ops);
        assert_eq!(stats.total_changes, 6);
        assert_eq!(stats.elements_added, 2);
        assert_eq!(stats.elements_deleted, 1);
        assert_eq!(stats.elements_modified, 2);
    }

    #[test]
    fn test_payload_serde_tagging() {
        let payload = VersionPayload::Delta(vec![op(OperationType::Update, 0)]);
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["kind"], "delta");
        assert_eq!(v["data"][0]["operation_type"], "update");

        let snap = VersionPayload::Snapshot(SnapshotData::Raw { state: DocumentState::new() });
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["data"]["encoding"], "raw");
        assert_eq!(snap.version_type(), VersionType::Snapshot);
    }

    #[test]
    fn test_version_expiry() {
        let state = DocumentState::new();
        let now = Utc::now();
        let mut version = Version {
            id: VersionId::new(),
            document_id: DocumentId::new("doc"),
            version_number: 1,
            parent_version_id: None,
            change_type: ChangeType::Manual,
            commit_message: None,
            branch_name: DEFAULT_BRANCH.into(),
            merge_source_id: None,
            is_milestone: false,
            tags: BTreeSet::new(),
            payload: VersionPayload::Snapshot(SnapshotData::Raw { state: state.clone() }),
            canvas_hash: state.canvas_hash().unwrap(),
            elements_hash: state.elements_hash().unwrap(),
            element_count: 0,
            stats: ChangeStats::initial(0),
            created_by: UserId::new("u"),
            created_at: now,
            expires_at: None,
        };
        assert!(!version.is_expired(now));
        version.expires_at = Some(now - Duration::seconds(1));
        assert!(version.is_expired(now));
        assert!(version.delta_operations().is_empty());

        let roundtrip: Version =
            serde_json::from_value(serde_json::to_value(&version).unwrap()).unwrap();
        assert_eq!(roundtrip, version);
    }
}
