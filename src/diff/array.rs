//! Positional reconciliation of list attributes.
//!
//! Elements are matched by index, not by identity: the local list is
//! expected to have undergone the same structural edits the caller wants
//! applied remotely. Elements that are both embedded documents are diffed
//! key by key; anything else is replaced at its index.

use super::op::{FieldPath, UpdateOp};
use super::scalar::diff_object;
use serde_json::Value;

/// Operations turning `previous` into `current` at `path`.
///
/// Shared indices get nested edits, a longer `current` appends its tail and
/// a shorter one truncates.
pub fn reconcile(path: FieldPath, previous: &[Value], current: &[Value]) -> Vec<UpdateOp> {
    let mut ops = Vec::new();
    let shared = previous.len().min(current.len());

    for (index, (before, after)) in previous.iter().zip(current.iter()).enumerate() {
        if before == after {
            continue;
        }
        let element = path.clone().index(index);
        match (before, after) {
            (Value::Object(before), Value::Object(after)) => {
                ops.extend(diff_object(&element, before, after));
            }
            _ => ops.push(UpdateOp::set(element, after.clone())),
        }
    }

    if current.len() > shared {
        ops.push(UpdateOp::append(path, current[shared..].to_vec()));
    } else if previous.len() > shared {
        ops.push(UpdateOp::truncate(path, shared));
    }

    ops
}

/// Elements `current` added after `start`, if it only grew from it.
pub fn appended_tail<'c>(start: &[Value], current: &'c Value) -> Option<&'c [Value]> {
    match current {
        Value::Array(items) if items.starts_with(start) => Some(&items[start.len()..]),
        _ => None,
    }
}

/// Operations for a list that was never projected.
///
/// `start` is the local value the list began from (its default). Elements
/// added after it are appended to whatever the store holds; any other edit
/// replaces the stored list.
pub fn append_unloaded(path: FieldPath, start: &[Value], current: &Value) -> Vec<UpdateOp> {
    match appended_tail(start, current) {
        Some([]) => Vec::new(),
        Some(tail) => vec![UpdateOp::append(path, tail.to_vec())],
        None => vec![UpdateOp::set(path, current.clone())],
    }
}
