//! Entity instances: a local, mutable staging area over one document.
//!
//! An instance tracks where each value came from:
//! - `values` holds everything currently known, cached defaults included
//! - `loaded` names the attributes whose value came from storage or the
//!   caller; only these (plus explicit deletes) are ever written back
//! - `specified` is the projection the instance was loaded under, `None`
//!   for a full document
//! - `baseline` is what the store held for `loaded` at the last load/save
//! - `unloaded_lists` maps list attributes edited without being projected
//!   to the local value they started from
//! - `lent` holds the value handed out by [`Entity::get_mut`] for attributes
//!   that were not loaded; they are only written if that value changed
//!
//! Instances are not synchronized; share them across tasks only behind a
//! lock of your own.

mod ident;
mod lifecycle;

pub use ident::{TOKEN_LEN, generate_token};

use crate::core::{DocError, Document, EntityId, ID_FIELD, Result, json_type_name};
use crate::schema::{EntitySchema, EntityType, ValueKind};
use log::warn;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone)]
pub struct Entity {
    kind: EntityType,
    values: Document,
    loaded: BTreeSet<String>,
    specified: Option<BTreeSet<String>>,
    baseline: Document,
    deleted: BTreeSet<String>,
    unloaded_lists: BTreeMap<String, Vec<Value>>,
    lent: BTreeMap<String, Value>,
    removed: bool,
}

impl EntityType {
    /// Construct a fresh instance from caller data.
    ///
    /// `null` entries are ignored. Embeddable types get a generated token id
    /// right away; root types keep the unsaved sentinel until first save.
    pub fn create(&self, data: Document) -> Result<Entity> {
        let mut entity = Entity::empty(self.clone());
        for (name, value) in data {
            entity.set(&name, value)?;
        }
        entity.ensure_id();
        Ok(entity)
    }

    /// Fresh instance with nothing set.
    pub fn blank(&self) -> Entity {
        let mut entity = Entity::empty(self.clone());
        entity.ensure_id();
        entity
    }

    /// Wrap an embedded document, such as one element of a list attribute.
    pub fn from_document(&self, doc: &Value) -> Result<Entity> {
        match doc {
            Value::Object(map) => self.create(map.clone()),
            other => Err(DocError::TypeMismatch {
                attribute: self.name().to_string(),
                expected: ValueKind::Dict.to_string(),
                found: json_type_name(other).to_string(),
            }),
        }
    }
}

impl Entity {
    fn empty(kind: EntityType) -> Self {
        Self {
            kind,
            values: Document::new(),
            loaded: BTreeSet::new(),
            specified: None,
            baseline: Document::new(),
            deleted: BTreeSet::new(),
            unloaded_lists: BTreeMap::new(),
            lent: BTreeMap::new(),
            removed: false,
        }
    }

    fn ensure_id(&mut self) {
        if !self.values.contains_key(ID_FIELD) {
            let id = if self.kind.schema().is_embedded() {
                Value::String(generate_token())
            } else {
                EntityId::UNSAVED.to_value()
            };
            self.values.insert(ID_FIELD.to_string(), id);
        }
        self.loaded.insert(ID_FIELD.to_string());
    }

    /// Rebuild an instance from a stored document fetched under `specified`.
    pub(crate) fn hydrate(kind: EntityType, doc: Document, specified: Option<BTreeSet<String>>) -> Self {
        let mut entity = Entity::empty(kind);
        for (name, value) in doc {
            if value.is_null() {
                continue;
            }
            if entity.schema().contains(&name) {
                entity.loaded.insert(name.clone());
                entity.values.insert(name, value);
            } else {
                warn!("Dropping undeclared field '{}' of '{}'", name, entity.kind.name());
            }
        }
        entity.ensure_id();
        entity.baseline = entity.values.clone();
        entity.specified = specified;
        entity
    }

    /// Keyword-style override applied after construction.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.kind
    }

    fn schema(&self) -> &EntitySchema {
        self.kind.schema()
    }

    pub fn id(&self) -> EntityId {
        self.values
            .get(ID_FIELD)
            .and_then(EntityId::from_value)
            .unwrap_or(EntityId::UNSAVED)
    }

    /// True for root entities that have been assigned a real id.
    pub fn is_persisted(&self) -> bool {
        !self.schema().is_embedded() && !self.id().is_unsaved()
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Attributes whose value came from storage or explicit input.
    pub fn loaded_fields(&self) -> &BTreeSet<String> {
        &self.loaded
    }

    /// Projection the instance was loaded under, `None` for a full document.
    pub fn specified_fields(&self) -> Option<&BTreeSet<String>> {
        self.specified.as_ref()
    }

    /// Read an attribute, resolving and caching its default when unset.
    pub fn get(&mut self, name: &str) -> Result<Value> {
        let position = self.position(name)?;
        if let Some(value) = self.values.get(name) {
            return Ok(value.clone());
        }
        self.resolve_through(position);
        Ok(self.values.get(name).cloned().unwrap_or(Value::Null))
    }

    /// Write an attribute. `null` clears the local value without scheduling
    /// any store operation; use [`Entity::delete`] to remove it remotely.
    ///
    /// Writing a list the instance never projected appends whatever the new
    /// list adds past the value it started from. Any other change to such a
    /// list replaces the stored one.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let position = self.position(name)?;
        self.schema().attributes()[position].validate(&value)?;

        self.lent.remove(name);
        if value.is_null() {
            self.unloaded_lists.remove(name);
            self.values.remove(name);
            self.loaded.remove(name);
            return Ok(());
        }

        self.track_unloaded_list(name, position);
        self.values.insert(name.to_string(), value);
        self.mark_touched(name);
        Ok(())
    }

    /// Remove an attribute. The next read resolves its default again and the
    /// next save unsets it in the store.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.position(name)?;
        if name == ID_FIELD {
            return Err(DocError::InvalidPath("id cannot be deleted".to_string()));
        }
        self.values.remove(name);
        self.loaded.remove(name);
        self.unloaded_lists.remove(name);
        self.lent.remove(name);
        self.deleted.insert(name.to_string());
        if let Some(specified) = &mut self.specified {
            specified.insert(name.to_string());
        }
        Ok(())
    }

    /// Mutable access for in-place edits of nested values.
    ///
    /// Edits are found at save time by diffing against the baseline. An
    /// attribute that was not loaded is only written if the value handed out
    /// here was changed. A list attribute the instance never projected starts
    /// from its default and whatever is added to it is appended to the
    /// stored list on save.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Value> {
        let position = self.position(name)?;
        if !self.values.contains_key(name) {
            self.resolve_through(position);
        }

        if self.track_unloaded_list(name, position) {
            self.mark_touched(name);
            let slot = self.values.entry(name.to_string());
            return Ok(slot.or_insert_with(|| Value::Array(Vec::new())));
        }

        if !self.loaded.contains(name) && !self.lent.contains_key(name) {
            let handed_out = self.values.get(name).cloned().unwrap_or(Value::Null);
            self.lent.insert(name.to_string(), handed_out);
        }
        Ok(self.values.entry(name.to_string()).or_insert(Value::Null))
    }

    /// Append one element to a list attribute.
    pub fn push(&mut self, name: &str, item: impl Into<Value>) -> Result<()> {
        let item = item.into();
        let attribute = self.schema().attribute(name)?.clone();
        if !attribute.kind().is_list() {
            return Err(DocError::TypeMismatch {
                attribute: name.to_string(),
                expected: ValueKind::List.to_string(),
                found: attribute.kind().to_string(),
            });
        }
        attribute.validate(&Value::Array(vec![item.clone()]))?;

        let slot = self.get_mut(name)?;
        if slot.is_null() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(items) => {
                items.push(item);
                Ok(())
            }
            other => Err(DocError::TypeMismatch {
                attribute: name.to_string(),
                expected: attribute.kind().to_string(),
                found: json_type_name(other).to_string(),
            }),
        }
    }

    /// Plain mapping snapshot of the instance.
    ///
    /// With `with_defaults` every selected attribute is present, defaults
    /// resolved and unset ones as `null`. Without it only attributes that
    /// came from storage or the caller are included, which is the form used
    /// when embedding one entity inside another's list attribute.
    pub fn json(&self, fields: Option<&[&str]>, with_defaults: bool) -> Result<Document> {
        let names: Vec<&str> = match fields {
            Some(fields) => {
                for field in fields {
                    self.position(field)?;
                }
                fields.to_vec()
            }
            None => self.schema().attribute_names().collect(),
        };

        let resolved = if with_defaults {
            self.resolved_values()
        } else {
            self.values.clone()
        };

        let mut out = Document::new();
        for name in names {
            if with_defaults {
                let value = resolved.get(name).cloned().unwrap_or(Value::Null);
                out.insert(name.to_string(), value);
            } else if self.loaded.contains(name) || self.lent_changed(name) {
                if let Some(value) = resolved.get(name) {
                    out.insert(name.to_string(), value.clone());
                }
            }
        }
        Ok(out)
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.schema()
            .position(name)
            .ok_or_else(|| DocError::UnknownAttribute {
                entity: self.kind.name().to_string(),
                attribute: name.to_string(),
            })
    }

    /// Start tracking `name` as a list the instance never projected, if it
    /// is one. Returns whether it is tracked.
    fn track_unloaded_list(&mut self, name: &str, position: usize) -> bool {
        if self.unloaded_lists.contains_key(name) {
            return true;
        }
        let never_projected = self
            .specified
            .as_ref()
            .is_some_and(|specified| !specified.contains(name));
        if self.loaded.contains(name)
            || !never_projected
            || !self.is_persisted()
            || !self.schema().attributes()[position].kind().is_list()
        {
            return false;
        }

        if !self.values.contains_key(name) {
            self.resolve_through(position);
        }
        let start = match self.values.get(name) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        self.unloaded_lists.insert(name.to_string(), start);
        true
    }

    /// True when a value handed out by `get_mut` has since been changed.
    fn lent_changed(&self, name: &str) -> bool {
        match (self.lent.get(name), self.values.get(name)) {
            (Some(handed_out), Some(current)) => !current.is_null() && current != handed_out,
            _ => false,
        }
    }

    /// Treat values changed through `get_mut` as written.
    fn settle_lent(&mut self) {
        let changed: Vec<String> = self
            .lent
            .keys()
            .filter(|name| self.lent_changed(name))
            .cloned()
            .collect();
        for name in changed {
            self.lent.remove(&name);
            self.mark_touched(&name);
        }
    }

    fn mark_touched(&mut self, name: &str) {
        self.loaded.insert(name.to_string());
        self.deleted.remove(name);
        if let Some(specified) = &mut self.specified {
            specified.insert(name.to_string());
        }
    }

    /// Resolve defaults of every unset attribute up to and including
    /// `position`, in declaration order, caching non-null results.
    fn resolve_through(&mut self, position: usize) {
        let kind = self.kind.clone();
        for attribute in &kind.schema().attributes()[..=position] {
            if self.values.contains_key(attribute.name()) {
                continue;
            }
            let value = attribute.default().resolve(&self.values);
            if !value.is_null() {
                self.values.insert(attribute.name().to_string(), value);
            }
        }
    }

    /// All values with defaults resolved, without touching the cache.
    fn resolved_values(&self) -> Document {
        let mut resolved = self.values.clone();
        for attribute in self.schema().attributes() {
            if resolved.contains_key(attribute.name()) {
                continue;
            }
            let value = attribute.default().resolve(&resolved);
            if !value.is_null() {
                resolved.insert(attribute.name().to_string(), value);
            }
        }
        resolved
    }

    /// Re-check touched values; in-place edits bypass `set`'s validation.
    fn validate_touched(&self) -> Result<()> {
        for name in &self.loaded {
            if let Some(value) = self.values.get(name) {
                self.schema().attribute(name)?.validate(value)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.json(None, true).map_err(|_| fmt::Error)?;
        write!(f, "Object {}({})", self.kind.name(), Value::Object(snapshot))
    }
}
