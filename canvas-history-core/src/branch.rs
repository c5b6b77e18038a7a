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

//! Branch heads
//!
//! A branch is a named pointer `(document, name) -> head version`. It moves
//! forward every time a version is created on it.

use crate::ids::{DocumentId, VersionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub document_id: DocumentId,
    pub name: String,
    pub head: VersionId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Branch {
    pub fn new(document_id: DocumentId, name: impl Into<String>, head: VersionId) -> Self {
        let now = Utc::now();
        Self {
            document_id,
            name: name.into(),
            head,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the head to a newer version
    pub fn advance(&mut self, head: VersionId) {
        self.head = head;
        self.updated_at = Utc::now();
    }
}

/// Check a branch name against git-style ref rules.
///
/// Returns a human-readable reason on rejection.
pub fn validate_branch_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty name".to_string());
    }

    if name.starts_with('.') || name.ends_with('.') {
        return Err("cannot start or end with '.'".to_string());
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err("cannot start or end with '/'".to_string());
    }

    if name.contains("..") {
        return Err("cannot contain '..'".to_string());
    }

    if name.contains("//") {
        return Err("cannot contain '//'".to_string());
    }

    if name.ends_with(".lock") {
        return Err("cannot end with '.lock'".to_string());
    }

    let invalid_chars = ['~', '^', ':', '\\', '?', '*', '[', ' ', '\t', '\n'];
    if let Some(c) = invalid_chars.into_iter().find(|c| name.contains(*c)) {
        return Err(format!("cannot contain '{}'", c.escape_default()));
    }

    if name.chars().any(char::is_control) {
        return Err("cannot contain control characters".to_string());
    }

    Ok(())
}
