#![allow(dead_code)]

use async_trait::async_trait;
use memodoc::{
    Attribute, Document, DocumentStore, EntitySchema, EntityType, Filter, MemoryStore, Projection,
    Query, Registry, Result, UpdateOp, ValueKind,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Memory store that remembers every update batch it was sent.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    updates: Mutex<Vec<Vec<UpdateOp>>>,
}

impl RecordingStore {
    pub fn updates(&self) -> Vec<Vec<UpdateOp>> {
        self.updates.lock().unwrap().clone()
    }

    pub fn last_update(&self) -> Vec<UpdateOp> {
        self.updates().pop().unwrap_or_default()
    }

    pub fn clear(&self) {
        self.updates.lock().unwrap().clear();
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn fetch_one(
        &self,
        collection: &str,
        id: i64,
        projection: Option<&Projection>,
    ) -> Result<Document> {
        self.inner.fetch_one(collection, id, projection).await
    }

    async fn fetch_many(
        &self,
        collection: &str,
        ids: &[i64],
        projection: Option<&Projection>,
    ) -> Result<Vec<Document>> {
        self.inner.fetch_many(collection, ids, projection).await
    }

    async fn find(
        &self,
        collection: &str,
        query: &Query,
        projection: Option<&Projection>,
    ) -> Result<Vec<Document>> {
        self.inner.find(collection, query, projection).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize> {
        self.inner.count(collection, filter).await
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<i64> {
        self.inner.insert(collection, document).await
    }

    async fn update(&self, collection: &str, id: i64, ops: &[UpdateOp]) -> Result<()> {
        self.updates.lock().unwrap().push(ops.to_vec());
        self.inner.update(collection, id, ops).await
    }

    async fn delete(&self, collection: &str, id: i64) -> Result<()> {
        self.inner.delete(collection, id).await
    }

    async fn collections(&self) -> Vec<String> {
        self.inner.collections().await
    }
}

pub fn object_schema() -> EntitySchema {
    EntitySchema::root("ObjectModel", "tests")
        .attribute(Attribute::new("meta", ValueKind::Str))
        .attribute(Attribute::new("delta", ValueKind::Str).default_value(""))
        .attribute(Attribute::new("extra", ValueKind::Str).computed(|values| {
            let delta = values.get("delta").and_then(Value::as_str).unwrap_or_default();
            Value::String(format!("u{}o", delta))
        }))
        .attribute(Attribute::new("multi", ValueKind::List).default_value(Value::Array(Vec::new())))
        .build()
        .unwrap()
}

pub fn sub_schema() -> EntitySchema {
    EntitySchema::embedded("SubObject")
        .attribute(Attribute::new("id", ValueKind::Str))
        .attribute(Attribute::new("taiga", ValueKind::Int))
        .attribute(Attribute::new("tundra", ValueKind::Int).default_value(0))
        .build()
        .unwrap()
}

pub struct Fixture {
    pub store: Arc<RecordingStore>,
    pub object: EntityType,
    pub sub: EntityType,
}

pub fn fixture() -> Fixture {
    let store = Arc::new(RecordingStore::default());
    let mut registry = Registry::new(store.clone());
    let object = registry.register(object_schema()).unwrap();
    let sub = registry.register(sub_schema()).unwrap();
    Fixture { store, object, sub }
}

pub fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

/// Raw stored document, bypassing the mapper.
pub async fn stored(fixture: &Fixture, id: i64) -> Document {
    fixture.store.inner.fetch_one("tests", id, None).await.unwrap()
}
