use super::entity_schema::EntitySchema;
use crate::core::{DocError, Result};
use crate::storage::DocumentStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Handle to a registered entity type: its schema plus the store it
/// persists to. Cheap to clone; every instance holds one.
#[derive(Clone)]
pub struct EntityType {
    schema: Arc<EntitySchema>,
    store: Option<Arc<dyn DocumentStore>>,
}

impl EntityType {
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// The collection and store handle, or `NoCollection` for embeddable types.
    pub(crate) fn backing(&self) -> Result<(&str, &Arc<dyn DocumentStore>)> {
        match (self.schema.collection(), &self.store) {
            (Some(collection), Some(store)) => Ok((collection, store)),
            _ => Err(DocError::NoCollection {
                entity: self.schema.name().to_string(),
            }),
        }
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.schema.name())
            .field("collection", &self.schema.collection())
            .finish()
    }
}

/// Owns the store handle and hands it to every registered entity type.
///
/// Built once at startup; entity operations never look the store up from
/// global state.
pub struct Registry {
    store: Arc<dyn DocumentStore>,
    types: HashMap<String, EntityType>,
}

impl Registry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            types: HashMap::new(),
        }
    }

    pub fn register(&mut self, schema: EntitySchema) -> Result<EntityType> {
        if self.types.contains_key(schema.name()) {
            return Err(DocError::InvalidSchema(format!(
                "entity type '{}' is already registered",
                schema.name()
            )));
        }
        let store = if schema.is_embedded() {
            None
        } else {
            Some(self.store.clone())
        };
        let entity_type = EntityType {
            schema: Arc::new(schema),
            store,
        };
        self.types
            .insert(entity_type.name().to_string(), entity_type.clone());
        Ok(entity_type)
    }

    pub fn entity_type(&self, name: &str) -> Option<EntityType> {
        self.types.get(name).cloned()
    }
}
