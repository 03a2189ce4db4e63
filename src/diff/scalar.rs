use super::array;
use super::op::{FieldPath, UpdateOp};
use crate::core::Document;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Bookkeeping an entity hands to the diff engine at save time.
pub struct TrackedState<'a> {
    /// Current local values, including cached defaults.
    pub values: &'a Document,
    /// Values as they were last loaded from or written to the store.
    pub baseline: &'a Document,
    /// Attributes whose value came from storage or the caller.
    pub loaded: &'a BTreeSet<String>,
    /// Attributes the caller explicitly deleted since the last save.
    pub deleted: &'a BTreeSet<String>,
    /// List attributes edited without ever having been projected, with the
    /// local value each one started from.
    pub unloaded_lists: &'a BTreeMap<String, Vec<Value>>,
}

/// Compute the minimal set of operations turning the stored document into
/// the local one, visiting attributes in `order`.
///
/// Attributes that were never loaded and never touched produce nothing, so
/// a partial instance cannot overwrite fields it never saw.
pub fn diff_attributes<'n>(
    order: impl IntoIterator<Item = &'n str>,
    state: &TrackedState<'_>,
) -> Vec<UpdateOp> {
    let mut ops = Vec::new();

    for name in order {
        if !state.loaded.contains(name) {
            if state.deleted.contains(name) {
                ops.push(UpdateOp::unset(FieldPath::field(name)));
            }
            continue;
        }

        let Some(current) = state.values.get(name) else {
            continue;
        };
        let path = FieldPath::field(name);

        if let Some(start) = state.unloaded_lists.get(name) {
            ops.extend(array::append_unloaded(path, start, current));
            continue;
        }

        match state.baseline.get(name) {
            Some(previous) if previous == current => {}
            Some(Value::Array(previous)) => match current {
                Value::Array(items) => ops.extend(array::reconcile(path, previous, items)),
                _ => ops.push(UpdateOp::set(path, current.clone())),
            },
            _ => ops.push(UpdateOp::set(path, current.clone())),
        }
    }

    ops
}

/// Key-level diff of two embedded documents rooted at `path`.
pub fn diff_object(path: &FieldPath, previous: &Document, current: &Document) -> Vec<UpdateOp> {
    let mut ops = Vec::new();

    for (key, value) in current {
        if previous.get(key) != Some(value) {
            ops.push(UpdateOp::set(path.clone().key(key.as_str()), value.clone()));
        }
    }

    for key in previous.keys() {
        if !current.contains_key(key) {
            ops.push(UpdateOp::unset(path.clone().key(key.as_str())));
        }
    }

    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unchanged_values_emit_nothing() {
        let values = doc(json!({"id": 1, "delta": "hinkali"}));
        let state = TrackedState {
            values: &values,
            baseline: &values.clone(),
            loaded: &names(&["id", "delta"]),
            deleted: &BTreeSet::new(),
            unloaded_lists: &BTreeMap::new(),
        };
        assert!(diff_attributes(["delta"], &state).is_empty());
    }

    #[test]
    fn test_changed_new_and_deleted_values() {
        let baseline = doc(json!({"id": 1, "meta": "onigiri", "delta": "hinkali"}));
        let values = doc(json!({"id": 1, "delta": "hacapuri", "name": "x", "extra": "uo"}));
        let state = TrackedState {
            values: &values,
            baseline: &baseline,
            loaded: &names(&["id", "delta", "name"]),
            deleted: &names(&["meta"]),
            unloaded_lists: &BTreeMap::new(),
        };
        let ops = diff_attributes(["name", "meta", "delta", "extra"], &state);
        assert_eq!(
            ops,
            vec![
                UpdateOp::set(FieldPath::field("name"), "x"),
                UpdateOp::unset(FieldPath::field("meta")),
                UpdateOp::set(FieldPath::field("delta"), "hacapuri"),
            ]
        );
    }

    #[test]
    fn test_cached_default_is_not_written() {
        let values = doc(json!({"id": 1, "delta": "hinkali", "extra": "uhinkalio"}));
        let state = TrackedState {
            values: &values,
            baseline: &doc(json!({"id": 1, "delta": "hinkali"})),
            loaded: &names(&["id", "delta"]),
            deleted: &BTreeSet::new(),
            unloaded_lists: &BTreeMap::new(),
        };
        assert!(diff_attributes(["delta", "extra", "meta"], &state).is_empty());
    }

    #[test]
    fn test_diff_object_sets_and_unsets_keys() {
        let path = FieldPath::field("multi").index(3);
        let ops = diff_object(
            &path,
            &doc(json!({"id": "a", "taiga": 4, "tundra": 1})),
            &doc(json!({"id": "a", "taiga": 5})),
        );
        assert_eq!(
            ops,
            vec![
                UpdateOp::set(FieldPath::field("multi").index(3).key("taiga"), 5),
                UpdateOp::unset(FieldPath::field("multi").index(3).key("tundra")),
            ]
        );
    }
}
