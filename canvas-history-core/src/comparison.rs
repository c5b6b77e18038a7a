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

//! Version comparison results

use crate::ids::{ComparisonId, DocumentId, ElementId, VersionId};
use crate::version::OperationType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonType {
    Full,
    ElementsOnly,
}

impl ComparisonType {
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonType::Full => "full",
            ComparisonType::ElementsOnly => "elements_only",
        }
    }
}

/// An element present in both versions with differing content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedElement {
    pub element_id: ElementId,
    /// `Move`, `Style` or `Update`
    pub change: OperationType,
}

/// Structural difference from version A to version B
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonDiff {
    pub canvas_changed: bool,
    /// Present in B only
    pub added: Vec<ElementId>,
    /// Present in A only
    pub removed: Vec<ElementId>,
    pub modified: Vec<ModifiedElement>,
    pub unchanged_count: usize,
}

impl ComparisonDiff {
    pub fn is_identical(&self) -> bool {
        !self.canvas_changed
            && self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub id: ComparisonId,
    pub document_id: DocumentId,
    pub version_a_id: VersionId,
    pub version_b_id: VersionId,
    pub comparison_type: ComparisonType,
    pub diff: ComparisonDiff,
    /// Jaccard similarity of the element id sets, in `[0, 1]`
    pub similarity_score: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Comparison {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
