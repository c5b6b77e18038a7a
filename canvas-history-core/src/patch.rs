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

//! Structural patches over JSON values
//!
//! A small subset of JSON Patch: `add`, `remove` and `replace` addressed by
//! key paths. Objects are diffed key by key in sorted order; arrays and
//! scalars are replaced as a whole, so a patch is always deterministic for
//! a given pair of inputs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Invalid target at {0}")]
    InvalidTarget(String),

    #[error("Invalid array index at {0}")]
    InvalidIndex(String),
}

/// One patch step. Paths are object keys (or array indices) from the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    Add { path: Vec<String>, value: Value },
    Remove { path: Vec<String> },
    Replace { path: Vec<String>, value: Value },
}

impl PatchOp {
    pub fn path(&self) -> &[String] {
        match self {
            PatchOp::Add { path, .. } | PatchOp::Remove { path } | PatchOp::Replace { path, .. } => {
                path
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PatchOp::Add { .. } => "add",
            PatchOp::Remove { .. } => "remove",
            PatchOp::Replace { .. } => "replace",
        }
    }
}

/// RFC 6901 pointer for a key path
pub fn path_to_pointer(path: &[String]) -> String {
    let mut ptr = String::with_capacity(path.len() * 8);
    for key in path {
        ptr.push('/');
        ptr.push_str(&key.replace('~', "~0").replace('/', "~1"));
    }
    ptr
}

/// Compute the patch turning `src` into `dst`
pub fn diff(src: &Value, dst: &Value) -> Vec<PatchOp> {
    diff_at(&[], src, dst)
}

/// Compute the patch turning `src` into `dst`, with every path prefixed by `base`
pub fn diff_at(base: &[String], src: &Value, dst: &Value) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    diff_value(&mut base.to_vec(), src, dst, &mut ops);
    ops
}

fn diff_value(path: &mut Vec<String>, src: &Value, dst: &Value, ops: &mut Vec<PatchOp>) {
    if src == dst {
        return;
    }
    match (src, dst) {
        (Value::Object(a), Value::Object(b)) => diff_object(path, a, b, ops),
        _ => ops.push(PatchOp::Replace {
            path: path.clone(),
            value: dst.clone(),
        }),
    }
}

fn diff_object(
    path: &mut Vec<String>,
    src: &Map<String, Value>,
    dst: &Map<String, Value>,
    ops: &mut Vec<PatchOp>,
) {
    let mut removed: Vec<&String> = src.keys().filter(|k| !dst.contains_key(*k)).collect();
    removed.sort();
    for key in removed {
        path.push(key.clone());
        ops.push(PatchOp::Remove { path: path.clone() });
        path.pop();
    }

    let mut keys: Vec<&String> = dst.keys().collect();
    keys.sort();
    for key in keys {
        let target = &dst[key];
        path.push(key.clone());
        match src.get(key) {
            Some(current) => diff_value(path, current, target, ops),
            None => ops.push(PatchOp::Add {
                path: path.clone(),
                value: target.clone(),
            }),
        }
        path.pop();
    }
}

/// Apply a sequence of operations in order. Stops at the first failure,
/// leaving earlier operations applied; callers that need atomicity apply
/// to a scratch copy.
pub fn apply(doc: &mut Value, ops: &[PatchOp]) -> Result<(), PatchError> {
    for op in ops {
        apply_op(doc, op)?;
    }
    Ok(())
}

pub fn apply_op(doc: &mut Value, op: &PatchOp) -> Result<(), PatchError> {
    match op {
        PatchOp::Add { path, value } => apply_add(doc, path, value.clone()),
        PatchOp::Remove { path } => apply_remove(doc, path),
        PatchOp::Replace { path, value } => apply_replace(doc, path, value.clone()),
    }
}

fn parent_mut<'a>(doc: &'a mut Value, path: &[String]) -> Result<&'a mut Value, PatchError> {
    let parent_path = &path[..path.len() - 1];
    doc.pointer_mut(&path_to_pointer(parent_path))
        .ok_or_else(|| PatchError::NotFound(path_to_pointer(parent_path)))
}

fn apply_add(doc: &mut Value, path: &[String], value: Value) -> Result<(), PatchError> {
    let Some(key) = path.last() else {
        *doc = value;
        return Ok(());
    };
    let pointer = path_to_pointer(path);
    match parent_mut(doc, path)? {
        Value::Object(map) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        Value::Array(arr) => {
            if key == "-" {
                arr.push(value);
                return Ok(());
            }
            let idx: usize = key.parse().map_err(|_| PatchError::InvalidIndex(pointer.clone()))?;
            if idx > arr.len() {
                return Err(PatchError::InvalidIndex(pointer));
            }
            arr.insert(idx, value);
            Ok(())
        }
        _ => Err(PatchError::InvalidTarget(pointer)),
    }
}

fn apply_remove(doc: &mut Value, path: &[String]) -> Result<(), PatchError> {
    let Some(key) = path.last() else {
        return Err(PatchError::InvalidTarget(String::new()));
    };
    let pointer = path_to_pointer(path);
    match parent_mut(doc, path)? {
        Value::Object(map) => map
            .remove(key)
            .map(|_| ())
            .ok_or(PatchError::NotFound(pointer)),
        Value::Array(arr) => {
            let idx: usize = key.parse().map_err(|_| PatchError::InvalidIndex(pointer.clone()))?;
            if idx >= arr.len() {
                return Err(PatchError::NotFound(pointer));
            }
            arr.remove(idx);
            Ok(())
        }
        _ => Err(PatchError::InvalidTarget(pointer)),
    }
}

fn apply_replace(doc: &mut Value, path: &[String], value: Value) -> Result<(), PatchError> {
    let Some(key) = path.last() else {
        *doc = value;
        return Ok(());
    };
    let pointer = path_to_pointer(path);
    match parent_mut(doc, path)? {
        Value::Object(map) => match map.get_mut(key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(PatchError::NotFound(pointer)),
        },
        Value::Array(arr) => {
            let idx: usize = key.parse().map_err(|_| PatchError::InvalidIndex(pointer.clone()))?;
            match arr.get_mut(idx) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(PatchError::NotFound(pointer)),
            }
        }
        _ => Err(PatchError::InvalidTarget(pointer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let v = json!({"a": 1, "b": [1, 2]});
        assert!(diff(&v, &v).is_empty());
    }

    #[test]
    fn test_diff_sorted_and_nested() {
        let src = json!({"z": 1, "style": {"fill": "red", "stroke": "black"}, "gone": true});
        let dst = json!({"z": 2, "style": {"fill": "blue", "stroke": "black"}, "new": 5});
        let ops = diff(&src, &dst);
        assert_eq!(
            ops,
            vec![
                PatchOp::Remove { path: p(&["gone"]) },
                PatchOp::Add { path: p(&["new"]), value: json!(5) },
                PatchOp::Replace { path: p(&["style", "fill"]), value: json!("blue") },
                PatchOp::Replace { path: p(&["z"]), value: json!(2) },
            ]
        );
    }

    #[test]
    fn test_arrays_replaced_wholesale() {
        let ops = diff(&json!({"pts": [1, 2, 3]}), &json!({"pts": [1, 2]}));
        assert_eq!(ops, vec![PatchOp::Replace { path: p(&["pts"]), value: json!([1, 2]) }]);
    }

    #[test]
    fn test_diff_at_prefixes_paths() {
        let ops = diff_at(&p(&["el-1"]), &json!({"x": 1}), &json!({"x": 2}));
        assert_eq!(ops[0].path(), &p(&["el-1", "x"])[..]);
    }

    #[test]
    fn test_apply_reproduces_target() {
        let src = json!({"a": {"b": 1, "c": [1]}, "d": "x"});
        let dst = json!({"a": {"b": 2, "e": null}, "f": {"g": true}});
        let mut doc = src.clone();
        apply(&mut doc, &diff(&src, &dst)).unwrap();
        assert_eq!(doc, dst);
    }

    #[test]
    fn test_apply_errors() {
        let mut doc = json!({"a": 1});
        assert!(matches!(
            apply_op(&mut doc, &PatchOp::Remove { path: p(&["missing"]) }),
            Err(PatchError::NotFound(_))
        ));
        assert!(matches!(
            apply_op(&mut doc, &PatchOp::Replace { path: p(&["missing"]), value: json!(1) }),
            Err(PatchError::NotFound(_))
        ));
        assert!(matches!(
            apply_op(&mut doc, &PatchOp::Add { path: p(&["a", "b"]), value: json!(1) }),
            Err(PatchError::InvalidTarget(_))
        ));
        assert!(matches!(
            apply_op(&mut doc, &PatchOp::Remove { path: vec![] }),
            Err(PatchError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_array_index_ops() {
        let mut doc = json!({"list": [1, 2]});
        apply_op(&mut doc, &PatchOp::Add { path: p(&["list", "-"]), value: json!(3) }).unwrap();
        apply_op(&mut doc, &PatchOp::Remove { path: p(&["list", "0"]) }).unwrap();
        assert_eq!(doc, json!({"list": [2, 3]}));
        assert!(matches!(
            apply_op(&mut doc, &PatchOp::Replace { path: p(&["list", "x"]), value: json!(0) }),
            Err(PatchError::InvalidIndex(_))
        ));
    }

    #[test]
    fn test_pointer_escaping() {
        assert_eq!(path_to_pointer(&p(&["a/b", "c~d"])), "/a~1b/c~0d");
    }

    #[test]
    fn test_patch_op_serde_shape() {
        let op = PatchOp::Replace { path: p(&["x"]), value: json!(3) };
        let v = serde_json::to_value(&op).unwrap();
        assert_eq!(v, json!({"op": "replace", "path": ["x"], "value": 3}));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn json_value() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::from),
                (-5..5i64).prop_map(Value::from),
                "[a-c]{0,3}".prop_map(Value::from),
            ];
            leaf.prop_recursive(3, 24, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..3).prop_map(Value::from),
                    prop::collection::btree_map("[ab/~]{1,2}", inner, 0..4)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        proptest! {
            #[test]
            fn test_diff_then_apply_reaches_target(src in json_value(), dst in json_value()) {
                let mut doc = src.clone();
                apply(&mut doc, &diff(&src, &dst)).unwrap();
                prop_assert_eq!(doc, dst);
            }
        }
    }
}
