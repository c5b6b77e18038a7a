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

//! Canvas document state
//!
//! A document is canvas-level metadata plus a set of positioned, styled
//! elements. Elements live in an ordered map so every walk over them is
//! lexicographic by identifier.

use crate::hash::ContentHash;
use crate::ids::ElementId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Canvas-level metadata (background, zoom, grid, ...)
pub type CanvasMeta = Map<String, Value>;

/// One drawable element on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    /// Element kind ("rectangle", "text", "arrow", ...)
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub angle: f64,
    /// Presentation attributes (stroke, fill, opacity, ...)
    #[serde(default)]
    pub style: Map<String, Value>,
    /// Free-form content (text, points, links, ...)
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Element {
    pub fn new(id: impl Into<ElementId>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            angle: 0.0,
            style: Map::new(),
            data: Map::new(),
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn sized(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_style(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.style.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Complete state of a canvas document at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    #[serde(default)]
    pub canvas: CanvasMeta,
    #[serde(default)]
    pub elements: BTreeMap<ElementId, Element>,
}

impl DocumentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style canvas setting
    pub fn with_canvas(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.canvas.insert(key.into(), value.into());
        self
    }

    /// Builder-style element insertion
    pub fn with_element(mut self, element: Element) -> Self {
        self.insert(element);
        self
    }

    /// Insert or replace an element, returning the previous one
    pub fn insert(&mut self, element: Element) -> Option<Element> {
        self.elements.insert(element.id.clone(), element)
    }

    pub fn remove(&mut self, id: &str) -> Option<Element> {
        self.elements.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.elements.get_mut(id)
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.canvas.is_empty()
    }

    /// Element identifiers in lexicographic order
    pub fn element_ids(&self) -> impl Iterator<Item = &ElementId> {
        self.elements.keys()
    }

    pub fn canvas_hash(&self) -> Result<ContentHash, serde_json::Error> {
        ContentHash::of_json(&self.canvas)
    }

    pub fn elements_hash(&self) -> Result<ContentHash, serde_json::Error> {
        ContentHash::of_json(&self.elements)
    }

    /// Canonical serialized form (ordered maps, compact JSON)
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
