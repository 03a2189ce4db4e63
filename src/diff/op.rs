//! Field-addressed update operations and how a store applies them.
//!
//! Each operation targets a path inside one document. A store applies the
//! full list of operations for a save as a single unit.

use crate::core::{DocError, Document, Result, json_type_name};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A single segment of a field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "{}", key),
            Segment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Location of a value inside a document, rendered as `multi.2.taiga`.
///
/// The first segment is always the top-level attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    pub fn field(name: impl Into<String>) -> Self {
        Self(vec![Segment::Key(name.into())])
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.0.push(Segment::Key(key.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.0.push(Segment::Index(index));
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// The top-level attribute this path lives under.
    pub fn root(&self) -> &str {
        match self.0.first() {
            Some(Segment::Key(key)) => key,
            _ => "",
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// One targeted mutation of a stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum UpdateOp {
    /// Set the value at the path, creating intermediate objects.
    Set { path: FieldPath, value: Value },

    /// Remove the value at the path. No-op if it does not exist.
    Unset { path: FieldPath },

    /// Append values to the array at the path, creating it if missing.
    Append { path: FieldPath, values: Vec<Value> },

    /// Keep only the first `len` elements of the array at the path.
    Truncate { path: FieldPath, len: usize },
}

impl UpdateOp {
    pub fn set(path: FieldPath, value: impl Into<Value>) -> Self {
        UpdateOp::Set {
            path,
            value: value.into(),
        }
    }

    pub fn unset(path: FieldPath) -> Self {
        UpdateOp::Unset { path }
    }

    pub fn append(path: FieldPath, values: Vec<Value>) -> Self {
        UpdateOp::Append { path, values }
    }

    pub fn truncate(path: FieldPath, len: usize) -> Self {
        UpdateOp::Truncate { path, len }
    }

    pub fn path(&self) -> &FieldPath {
        match self {
            UpdateOp::Set { path, .. }
            | UpdateOp::Unset { path }
            | UpdateOp::Append { path, .. }
            | UpdateOp::Truncate { path, .. } => path,
        }
    }
}

impl fmt::Display for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOp::Set { path, value } => write!(f, "set {} = {}", path, value),
            UpdateOp::Unset { path } => write!(f, "unset {}", path),
            UpdateOp::Append { path, values } => write!(f, "append {} (+{})", path, values.len()),
            UpdateOp::Truncate { path, len } => write!(f, "truncate {} to {}", path, len),
        }
    }
}

/// Apply a batch of operations to a document.
///
/// Works on a copy and only replaces `doc` when every operation succeeds.
pub fn apply_all(doc: &mut Document, ops: &[UpdateOp]) -> Result<()> {
    let mut working = Value::Object(doc.clone());
    for op in ops {
        apply_op(&mut working, op)?;
    }
    if let Value::Object(updated) = working {
        *doc = updated;
    }
    Ok(())
}

fn apply_op(doc: &mut Value, op: &UpdateOp) -> Result<()> {
    match op {
        UpdateOp::Set { path, value } => {
            let (parent, last) = parent_mut(doc, path, true)?;
            match (parent, last) {
                (Some(Value::Object(map)), Segment::Key(key)) => {
                    map.insert(key.clone(), value.clone());
                    Ok(())
                }
                (Some(Value::Array(items)), Segment::Index(index)) => {
                    let len = items.len();
                    let slot = items.get_mut(*index).ok_or_else(|| {
                        DocError::InvalidPath(format!("{}: index out of bounds (len {})", path, len))
                    })?;
                    *slot = value.clone();
                    Ok(())
                }
                (Some(other), _) => Err(DocError::InvalidPath(format!(
                    "{}: cannot set inside {}",
                    path,
                    json_type_name(other)
                ))),
                (None, _) => Err(DocError::InvalidPath(path.to_string())),
            }
        }
        UpdateOp::Unset { path } => {
            let (parent, last) = parent_mut(doc, path, false)?;
            match (parent, last) {
                (Some(Value::Object(map)), Segment::Key(key)) => {
                    map.remove(key);
                }
                (Some(Value::Array(items)), Segment::Index(index)) => {
                    // Array slots are nulled rather than removed so indices stay stable.
                    if let Some(slot) = items.get_mut(*index) {
                        *slot = Value::Null;
                    }
                }
                _ => {}
            }
            Ok(())
        }
        UpdateOp::Append { path, values } => {
            let target = value_mut(doc, path, true)?;
            match target {
                Some(slot) if slot.is_null() => {
                    *slot = Value::Array(values.clone());
                    Ok(())
                }
                Some(Value::Array(items)) => {
                    items.extend(values.iter().cloned());
                    Ok(())
                }
                Some(other) => Err(DocError::InvalidPath(format!(
                    "{}: append requires list, found {}",
                    path,
                    json_type_name(other)
                ))),
                None => Err(DocError::InvalidPath(path.to_string())),
            }
        }
        UpdateOp::Truncate { path, len } => match value_mut(doc, path, false)? {
            Some(Value::Array(items)) => {
                items.truncate(*len);
                Ok(())
            }
            Some(Value::Null) | None => Ok(()),
            Some(other) => Err(DocError::InvalidPath(format!(
                "{}: truncate requires list, found {}",
                path,
                json_type_name(other)
            ))),
        },
    }
}

/// Walk to the container holding the last segment of `path`.
///
/// With `create`, missing intermediate keys become empty objects.
fn parent_mut<'a, 'p>(
    doc: &'a mut Value,
    path: &'p FieldPath,
    create: bool,
) -> Result<(Option<&'a mut Value>, &'p Segment)> {
    let (last, init) = path
        .segments()
        .split_last()
        .ok_or_else(|| DocError::InvalidPath("empty path".to_string()))?;
    let mut current = doc;
    for segment in init {
        current = match step(current, segment, create, path)? {
            Some(next) => next,
            None => return Ok((None, last)),
        };
    }
    if create && current.is_null() && matches!(last, Segment::Key(_)) {
        *current = Value::Object(Document::new());
    }
    Ok((Some(current), last))
}

/// Walk to the value at `path`. With `create`, a missing final key is
/// inserted as `null` so the caller can fill it in.
fn value_mut<'a>(doc: &'a mut Value, path: &FieldPath, create: bool) -> Result<Option<&'a mut Value>> {
    let mut current = doc;
    for segment in path.segments() {
        current = match step(current, segment, create, path)? {
            Some(next) => next,
            None => return Ok(None),
        };
    }
    Ok(Some(current))
}

fn step<'a>(
    current: &'a mut Value,
    segment: &Segment,
    create: bool,
    path: &FieldPath,
) -> Result<Option<&'a mut Value>> {
    if create && current.is_null() {
        *current = Value::Object(Document::new());
    }
    match (current, segment) {
        (Value::Object(map), Segment::Key(key)) => {
            if create {
                Ok(Some(map.entry(key.clone()).or_insert(Value::Null)))
            } else {
                Ok(map.get_mut(key))
            }
        }
        (Value::Array(items), Segment::Index(index)) => {
            let len = items.len();
            match items.get_mut(*index) {
                Some(item) => Ok(Some(item)),
                None if create => Err(DocError::InvalidPath(format!(
                    "{}: index {} out of bounds (len {})",
                    path, index, len
                ))),
                None => Ok(None),
            }
        }
        (other, _) if create => Err(DocError::InvalidPath(format!(
            "{}: cannot descend into {}",
            path,
            json_type_name(other)
        ))),
        _ => Ok(None),
    }
}
