use super::attribute::{Attribute, ValueKind};
use crate::core::{DocError, ID_FIELD, Result, timestamp_now};
use serde_json::Value;
use std::collections::HashMap;

/// Attributes every root entity carries regardless of its declared schema.
fn root_attributes() -> Vec<Attribute> {
    vec![
        Attribute::new(ID_FIELD, ValueKind::Int).default_value(0),
        Attribute::new("name", ValueKind::Str),
        Attribute::new("user", ValueKind::Int).default_value(0),
        Attribute::new("status", ValueKind::Int),
        Attribute::new("created", ValueKind::Float).computed(|values| {
            let unsaved = match values.get(ID_FIELD) {
                Some(id) => id.as_i64() == Some(0),
                None => true,
            };
            if unsaved { timestamp_now() } else { Value::Null }
        }),
        Attribute::new("updated", ValueKind::Float),
    ]
}

/// Embeddable entities only carry an opaque string id, generated at
/// construction when the caller does not supply one.
fn embedded_attributes() -> Vec<Attribute> {
    vec![Attribute::new(ID_FIELD, ValueKind::Str)]
}

/// Fixed descriptor table for one entity type.
///
/// Attribute order is declaration order (implicit attributes first) and is
/// the order defaults are resolved in.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    name: String,
    collection: Option<String>,
    attributes: Vec<Attribute>,
    positions: HashMap<String, usize>,
}

impl EntitySchema {
    /// Start a schema for an entity stored in its own collection.
    pub fn root(name: impl Into<String>, collection: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            collection: Some(collection.into()),
            attributes: Vec::new(),
        }
    }

    /// Start a schema for an entity that only lives nested inside another.
    pub fn embedded(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            collection: None,
            attributes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn is_embedded(&self) -> bool {
        self.collection.is_none()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(Attribute::name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Look up an attribute, failing with `UnknownAttribute`.
    pub fn attribute(&self, name: &str) -> Result<&Attribute> {
        self.position(name)
            .map(|idx| &self.attributes[idx])
            .ok_or_else(|| DocError::UnknownAttribute {
                entity: self.name.clone(),
                attribute: name.to_string(),
            })
    }
}

pub struct SchemaBuilder {
    name: String,
    collection: Option<String>,
    attributes: Vec<Attribute>,
}

impl SchemaBuilder {
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Validate and freeze the descriptor table.
    ///
    /// A declared attribute that shares a name with an implicit one replaces
    /// it in place.
    pub fn build(self) -> Result<EntitySchema> {
        if self.name.is_empty() {
            return Err(DocError::InvalidSchema("entity name cannot be empty".to_string()));
        }
        if let Some(collection) = &self.collection {
            if collection.is_empty() {
                return Err(DocError::InvalidSchema(format!(
                    "collection name for '{}' cannot be empty",
                    self.name
                )));
            }
        }

        let mut attributes = if self.collection.is_some() {
            root_attributes()
        } else {
            embedded_attributes()
        };
        let implicit = attributes.len();
        let mut positions: HashMap<String, usize> = attributes
            .iter()
            .enumerate()
            .map(|(idx, attr)| (attr.name().to_string(), idx))
            .collect();
        let mut declared = std::collections::HashSet::new();

        for attribute in self.attributes {
            let name = attribute.name().to_string();
            if name.is_empty() {
                return Err(DocError::InvalidSchema(format!(
                    "'{}' declares an attribute with an empty name",
                    self.name
                )));
            }
            if !declared.insert(name.clone()) {
                return Err(DocError::InvalidSchema(format!(
                    "'{}' declares attribute '{}' twice",
                    self.name, name
                )));
            }
            match positions.get(&name) {
                Some(&idx) if idx < implicit => attributes[idx] = attribute,
                _ => {
                    positions.insert(name, attributes.len());
                    attributes.push(attribute);
                }
            }
        }

        let id_kind = attributes[positions[ID_FIELD]].kind();
        let expected = if self.collection.is_some() { ValueKind::Int } else { ValueKind::Str };
        if id_kind != expected && id_kind != ValueKind::Any {
            return Err(DocError::InvalidSchema(format!(
                "'{}' id must be {}, declared {}",
                self.name, expected, id_kind
            )));
        }

        Ok(EntitySchema {
            name: self.name,
            collection: self.collection,
            attributes,
            positions,
        })
    }
}
