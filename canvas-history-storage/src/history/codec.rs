// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Delta Codec - State Differencing and Replay
//!
//! Turns a pair of document states into an ordered list of delta operations
//! and replays such lists on top of a base state.
//!
//! Operation order is fixed: canvas change first, then deletions, then
//! creations, then modifications. Inside each group elements are visited in
//! identifier order, so the same pair of states always yields the same
//! delta.

use super::error::{HistoryError, HistoryResult};
use canvas_history_core::patch::{self, PatchOp};
use canvas_history_core::{DeltaOperation, DocumentState, Element, ElementId, OperationType};
use serde_json::{Map, Value};
use tracing::warn;

/// Result of replaying one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Patch replayed cleanly
    Applied,
    /// Patch failed; the operation's full data was used instead
    AppliedWithFallback { reason: String },
    /// Neither the patch nor the fallback could be applied
    Failed { reason: String },
}

/// State produced by a replay
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    pub state: DocumentState,
    /// Operations that needed the full-data fallback
    pub fallbacks: usize,
}

/// Classify how an element changed, or `None` if it did not.
///
/// Position-only changes are `Move`, style-only changes are `Style`,
/// everything else is `Update`.
pub fn classify_change(old: &Element, new: &Element) -> Option<OperationType> {
    if old == new {
        return None;
    }

    let mut moved = old.clone();
    moved.x = new.x;
    moved.y = new.y;
    if moved == *new {
        return Some(OperationType::Move);
    }

    let mut restyled = old.clone();
    restyled.style = new.style.clone();
    if restyled == *new {
        return Some(OperationType::Style);
    }

    Some(OperationType::Update)
}

/// Compute the ordered operations turning `old` into `new`
pub fn create_delta(old: &DocumentState, new: &DocumentState) -> HistoryResult<Vec<DeltaOperation>> {
    let mut ops = Vec::new();
    let mut order = 0u32;
    let mut push = |ops: &mut Vec<DeltaOperation>, mut op: DeltaOperation| {
        op.operation_order = order;
        order += 1;
        ops.push(op);
    };

    if old.canvas != new.canvas {
        let before = Value::Object(old.canvas.clone());
        let after = Value::Object(new.canvas.clone());
        let op = DeltaOperation {
            operation_type: OperationType::Canvas,
            element_id: None,
            operation_order: 0,
            patch: patch::diff(&before, &after),
            old_data: Some(before),
            new_data: Some(after),
        };
        push(&mut ops, op);
    }

    for (id, element) in old.elements.iter().filter(|(id, _)| !new.elements.contains_key(*id)) {
        let op = DeltaOperation {
            operation_type: OperationType::Delete,
            element_id: Some(id.clone()),
            operation_order: 0,
            old_data: Some(serde_json::to_value(element)?),
            new_data: None,
            patch: vec![PatchOp::Remove {
                path: vec![id.to_string()],
            }],
        };
        push(&mut ops, op);
    }

    for (id, element) in new.elements.iter().filter(|(id, _)| !old.elements.contains_key(*id)) {
        let value = serde_json::to_value(element)?;
        let op = DeltaOperation {
            operation_type: OperationType::Create,
            element_id: Some(id.clone()),
            operation_order: 0,
            old_data: None,
            patch: vec![PatchOp::Add {
                path: vec![id.to_string()],
                value: value.clone(),
            }],
            new_data: Some(value),
        };
        push(&mut ops, op);
    }

    for (id, after) in &new.elements {
        let Some(before) = old.elements.get(id) else {
            continue;
        };
        let Some(kind) = classify_change(before, after) else {
            continue;
        };
        let before = serde_json::to_value(before)?;
        let after = serde_json::to_value(after)?;
        let op = DeltaOperation {
            operation_type: kind,
            element_id: Some(id.clone()),
            operation_order: 0,
            patch: patch::diff_at(&[id.to_string()], &before, &after),
            old_data: Some(before),
            new_data: Some(after),
        };
        push(&mut ops, op);
    }

    Ok(ops)
}

/// Replay one operation on `state` in place.
///
/// The patch is tried first against a scratch copy of the target; on
/// failure the operation's `new_data` (or removal, for deletes) is used.
pub fn apply_delta(state: &mut DocumentState, op: &DeltaOperation) -> ApplyOutcome {
    let patched = match op.operation_type {
        OperationType::Canvas => patch_canvas(state, &op.patch),
        _ => match &op.element_id {
            Some(id) => patch_element(state, id, &op.patch),
            None => return failed(op, "element operation without element id".to_string()),
        },
    };

    let reason = match patched {
        Ok(()) => return ApplyOutcome::Applied,
        Err(reason) => reason,
    };

    match fallback(state, op) {
        Ok(()) => {
            warn!(
                operation = %op.operation_type,
                element_id = ?op.element_id.as_ref().map(ElementId::as_str),
                order = op.operation_order,
                reason = %reason,
                "Patch replay failed, applied full data instead"
            );
            ApplyOutcome::AppliedWithFallback { reason }
        }
        Err(fallback_reason) => failed(op, format!("{reason}; fallback: {fallback_reason}")),
    }
}

fn failed(op: &DeltaOperation, reason: String) -> ApplyOutcome {
    warn!(
        operation = %op.operation_type,
        order = op.operation_order,
        reason = %reason,
        "Delta operation could not be applied"
    );
    ApplyOutcome::Failed { reason }
}

fn patch_canvas(state: &mut DocumentState, ops: &[PatchOp]) -> Result<(), String> {
    let mut target = Value::Object(state.canvas.clone());
    patch::apply(&mut target, ops).map_err(|e| e.to_string())?;
    match target {
        Value::Object(canvas) => {
            state.canvas = canvas;
            Ok(())
        }
        other => Err(format!("canvas patch produced a non-object value: {other}")),
    }
}

/// Patch the `{id: element}` scope of a single element and write it back
fn patch_element(state: &mut DocumentState, id: &ElementId, ops: &[PatchOp]) -> Result<(), String> {
    let mut scope = Map::new();
    if let Some(element) = state.get(id.as_str()) {
        let value = serde_json::to_value(element).map_err(|e| e.to_string())?;
        scope.insert(id.to_string(), value);
    }
    let mut target = Value::Object(scope);
    patch::apply(&mut target, ops).map_err(|e| e.to_string())?;

    let Value::Object(mut scope) = target else {
        return Err("element patch replaced its scope".to_string());
    };
    if scope.keys().any(|key| key != id.as_str()) {
        return Err(format!("patch touched elements other than {id}"));
    }
    match scope.remove(id.as_str()) {
        Some(value) => {
            let element = element_from_value(id, value)?;
            state.insert(element);
        }
        None => {
            state.remove(id.as_str());
        }
    }
    Ok(())
}

fn fallback(state: &mut DocumentState, op: &DeltaOperation) -> Result<(), String> {
    match op.operation_type {
        OperationType::Canvas => match &op.new_data {
            Some(Value::Object(canvas)) => {
                state.canvas = canvas.clone();
                Ok(())
            }
            Some(_) => Err("canvas new_data is not an object".to_string()),
            None => Err("no new_data to fall back to".to_string()),
        },
        OperationType::Delete => {
            let id = op.element_id.as_ref().ok_or("delete without element id")?;
            state.remove(id.as_str());
            Ok(())
        }
        _ => {
            let id = op.element_id.as_ref().ok_or("operation without element id")?;
            let value = op.new_data.clone().ok_or("no new_data to fall back to")?;
            let element = element_from_value(id, value)?;
            state.insert(element);
            Ok(())
        }
    }
}

fn element_from_value(id: &ElementId, value: Value) -> Result<Element, String> {
    let mut element: Element = serde_json::from_value(value).map_err(|e| e.to_string())?;
    element.id = id.clone();
    Ok(element)
}

/// Replay a full operation list on a copy of `base`.
///
/// Operations are applied in `operation_order` (stable for ties). A
/// `Failed` outcome aborts the replay.
pub fn apply_delta_chain(base: &DocumentState, ops: &[DeltaOperation]) -> HistoryResult<Replay> {
    let mut ordered: Vec<&DeltaOperation> = ops.iter().collect();
    ordered.sort_by_key(|op| op.operation_order);

    let mut state = base.clone();
    let mut fallbacks = 0;
    for op in ordered {
        match apply_delta(&mut state, op) {
            ApplyOutcome::Applied => {}
            ApplyOutcome::AppliedWithFallback { .. } => fallbacks += 1,
            ApplyOutcome::Failed { reason } => {
                return Err(HistoryError::PatchApplicationFailed {
                    operation_type: op.operation_type,
                    element_id: op.element_id.clone(),
                    reason,
                })
            }
        }
    }

    Ok(Replay { state, fallbacks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rect(id: &str, x: f64) -> Element {
        Element::new(id, "rectangle")
            .at(x, 0.0)
            .sized(10.0, 10.0)
            .with_style("fill", "red")
    }

    fn kinds(ops: &[DeltaOperation]) -> Vec<(OperationType, Option<&str>)> {
        ops.iter()
            .map(|op| (op.operation_type, op.element_id.as_ref().map(ElementId::as_str)))
            .collect()
    }

    #[test]
    fn test_identical_states_yield_empty_delta() {
        let state = DocumentState::new().with_element(rect("a", 1.0));
        assert!(create_delta(&state, &state).unwrap().is_empty());
    }

    #[test]
    fn test_operation_ordering() {
        let old = DocumentState::new()
            .with_canvas("zoom", 1)
            .with_element(rect("d", 0.0))
            .with_element(rect("b", 0.0))
            .with_element(rect("m", 0.0))
            .with_element(rect("s", 0.0))
            .with_element(rect("u", 0.0));
        let new = DocumentState::new()
            .with_canvas("zoom", 2)
            .with_element(rect("c2", 0.0))
            .with_element(rect("c1", 0.0))
            .with_element(rect("m", 5.0))
            .with_element(rect("s", 0.0).with_style("fill", "blue"))
            .with_element(rect("u", 0.0).with_data("text", "hi"));

        let ops = create_delta(&old, &new).unwrap();
        assert_eq!(
            kinds(&ops),
            vec![
                (OperationType::Canvas, None),
                (OperationType::Delete, Some("b")),
                (OperationType::Delete, Some("d")),
                (OperationType::Create, Some("c1")),
                (OperationType::Create, Some("c2")),
                (OperationType::Move, Some("m")),
                (OperationType::Style, Some("s")),
                (OperationType::Update, Some("u")),
            ]
        );
        let orders: Vec<u32> = ops.iter().map(|op| op.operation_order).collect();
        assert_eq!(orders, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_element_patch_paths_are_scoped() {
        let old = DocumentState::new().with_element(rect("a", 0.0));
        let new = DocumentState::new().with_element(rect("a", 3.0));
        let ops = create_delta(&old, &new).unwrap();
        assert_eq!(
            ops[0].patch,
            vec![PatchOp::Replace {
                path: vec!["a".into(), "x".into()],
                value: json!(3.0)
            }]
        );
    }

    #[test]
    fn test_round_trip() {
        let old = DocumentState::new()
            .with_canvas("background", "#fff")
            .with_element(rect("a", 0.0))
            .with_element(rect("b", 1.0));
        let new = DocumentState::new()
            .with_canvas("background", "#000")
            .with_canvas("grid", true)
            .with_element(rect("b", 2.0).with_style("stroke", "black"))
            .with_element(Element::new("t", "text").with_data("text", "note"));

        let ops = create_delta(&old, &new).unwrap();
        let replay = apply_delta_chain(&old, &ops).unwrap();
        assert_eq!(replay.state, new);
        assert_eq!(replay.fallbacks, 0);
    }

    #[test]
    fn test_chain_sorts_by_order() {
        let old = DocumentState::new();
        let new = DocumentState::new()
            .with_element(rect("a", 0.0))
            .with_element(rect("b", 0.0));
        let mut ops = create_delta(&old, &new).unwrap();
        ops.reverse();
        assert_eq!(apply_delta_chain(&old, &ops).unwrap().state, new);
    }

    #[test]
    fn test_fallback_on_broken_patch() {
        let mut state = DocumentState::new();
        let op = DeltaOperation {
            operation_type: OperationType::Update,
            element_id: Some(ElementId::from("ghost")),
            operation_order: 0,
            old_data: None,
            new_data: Some(serde_json::to_value(rect("ghost", 4.0)).unwrap()),
            patch: vec![PatchOp::Replace {
                path: vec!["ghost".into(), "x".into()],
                value: json!(4.0),
            }],
        };
        let outcome = apply_delta(&mut state, &op);
        assert!(matches!(outcome, ApplyOutcome::AppliedWithFallback { .. }));
        assert_eq!(state.get("ghost").unwrap().x, 4.0);
    }

    #[test]
    fn test_delete_of_missing_element_falls_back() {
        let mut state = DocumentState::new();
        let op = DeltaOperation {
            operation_type: OperationType::Delete,
            element_id: Some(ElementId::from("gone")),
            operation_order: 0,
            old_data: None,
            new_data: None,
            patch: vec![PatchOp::Remove { path: vec!["gone".into()] }],
        };
        assert!(matches!(
            apply_delta(&mut state, &op),
            ApplyOutcome::AppliedWithFallback { .. }
        ));
    }

    #[test]
    fn test_failed_outcome_aborts_chain() {
        let op = DeltaOperation {
            operation_type: OperationType::Update,
            element_id: Some(ElementId::from("ghost")),
            operation_order: 0,
            old_data: None,
            new_data: None,
            patch: vec![PatchOp::Remove {
                path: vec!["ghost".into(), "x".into()],
            }],
        };
        let err = apply_delta_chain(&DocumentState::new(), &[op]).unwrap_err();
        assert!(matches!(
            err,
            HistoryError::PatchApplicationFailed {
                operation_type: OperationType::Update,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_patch_leaves_state_untouched() {
        let original = DocumentState::new().with_element(rect("a", 1.0));
        let mut state = original.clone();
        let op = DeltaOperation {
            operation_type: OperationType::Update,
            element_id: Some(ElementId::from("a")),
            operation_order: 0,
            old_data: None,
            new_data: None,
            patch: vec![
                PatchOp::Replace {
                    path: vec!["a".into(), "x".into()],
                    value: json!(9.0),
                },
                PatchOp::Remove {
                    path: vec!["a".into(), "missing".into()],
                },
            ],
        };
        assert!(matches!(apply_delta(&mut state, &op), ApplyOutcome::Failed { .. }));
        assert_eq!(state, original);
    }

    #[test]
    fn test_classify_change() {
        let base = rect("a", 0.0);
        assert_eq!(classify_change(&base, &base), None);
        assert_eq!(classify_change(&base, &rect("a", 1.0)), Some(OperationType::Move));
        assert_eq!(
            classify_change(&base, &base.clone().with_style("fill", "green")),
            Some(OperationType::Style)
        );
        assert_eq!(
            classify_change(&base, &rect("a", 1.0).with_style("fill", "green")),
            Some(OperationType::Update)
        );
        assert_eq!(
            classify_change(&base, &base.clone().sized(20.0, 20.0)),
            Some(OperationType::Update)
        );
    }
}
