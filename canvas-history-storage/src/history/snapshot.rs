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

//! Snapshot policy and snapshot encoding

use super::error::{HistoryError, HistoryResult};
use canvas_history_core::{ChangeType, DocumentState, SnapshotConfig, SnapshotData};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Decides when a version stores full state and how that state is encoded
#[derive(Debug, Clone)]
pub struct SnapshotPolicy {
    interval: u64,
    compression_threshold: usize,
    snapshot_change_types: Vec<ChangeType>,
}

impl SnapshotPolicy {
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            interval: config.interval.max(1),
            compression_threshold: config.compression_threshold_bytes,
            snapshot_change_types: config.snapshot_change_types.clone(),
        }
    }

    pub fn should_snapshot(
        &self,
        change_type: &ChangeType,
        version_number: u64,
        force_snapshot: bool,
        has_parent: bool,
    ) -> bool {
        force_snapshot
            || !has_parent
            || self.snapshot_change_types.contains(change_type)
            || version_number % self.interval == 0
    }

    /// Serialize a state, gzip-compressing it above the size threshold
    pub fn encode(&self, state: &DocumentState) -> HistoryResult<SnapshotData> {
        let raw = state.to_canonical_bytes()?;
        if raw.len() <= self.compression_threshold {
            return Ok(SnapshotData::Raw {
                state: state.clone(),
            });
        }

        let compression_error =
            |e: std::io::Error| HistoryError::Serialization(format!("snapshot compression failed: {e}"));
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).map_err(compression_error)?;
        let bytes = encoder.finish().map_err(compression_error)?;

        Ok(SnapshotData::Gzip {
            bytes,
            original_size: raw.len(),
        })
    }
}

/// Decode a snapshot body, decompressing if needed
pub fn decode_snapshot(data: &SnapshotData) -> HistoryResult<DocumentState> {
    match data {
        SnapshotData::Raw { state } => Ok(state.clone()),
        SnapshotData::Gzip {
            bytes,
            original_size,
        } => {
            let mut raw = Vec::with_capacity(*original_size);
            GzDecoder::new(bytes.as_slice())
                .read_to_end(&mut raw)
                .map_err(|e| HistoryError::Serialization(format!("snapshot decompression failed: {e}")))?;
            if raw.len() != *original_size {
                return Err(HistoryError::Serialization(format!(
                    "snapshot size mismatch: expected {original_size} bytes, got {}",
                    raw.len()
                )));
            }
            Ok(serde_json::from_slice(&raw)?)
        }
    }
}
