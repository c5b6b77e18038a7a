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

//! Canvas History Storage
//!
//! Version history engine for canvas documents: snapshot/delta storage,
//! state reconstruction, rollback and version comparison.

pub mod history;

pub use history::{
    CompareRequest, CreateVersionRequest, HistoryError, HistoryFilter, HistoryResult,
    HistoryStore, InMemoryHistory, MemoryStore, PaginatedVersions, RollbackRequest,
    VersionService,
};
