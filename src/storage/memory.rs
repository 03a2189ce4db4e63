use super::engine::DocumentStore;
use super::persistence::{CollectionSnapshot, SnapshotManager, StoreSnapshot};
use super::query::{Filter, Projection, Query};
use crate::config::{DurabilityMode, StoreConfig};
use crate::core::{DocError, Document, ID_FIELD, Result};
use crate::diff::{UpdateOp, apply_all};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Documents of one collection, keyed by id.
#[derive(Debug, Default)]
struct Collection {
    documents: BTreeMap<i64, Document>,
    /// Last id handed out; ids are never reused.
    last_id: i64,
}

impl Collection {
    fn from_snapshot(snapshot: CollectionSnapshot) -> Self {
        let documents: BTreeMap<i64, Document> = snapshot
            .documents
            .into_iter()
            .filter_map(|doc| {
                let id = doc.get(ID_FIELD).and_then(Value::as_i64)?;
                Some((id, doc))
            })
            .collect();
        let max_id = documents.keys().next_back().copied().unwrap_or(0);
        Self {
            documents,
            last_id: snapshot.next_id.saturating_sub(1).max(max_id),
        }
    }

    fn to_snapshot(&self) -> CollectionSnapshot {
        CollectionSnapshot {
            next_id: self.last_id + 1,
            documents: self.documents.values().cloned().collect(),
        }
    }
}

struct Persistence {
    snapshots: SnapshotManager,
    origin: String,
    durability: DurabilityMode,
    threshold: usize,
    writes_since_checkpoint: AtomicUsize,
}

/// In-memory document store with optional snapshot persistence.
///
/// Each collection sits behind its own lock, so an update to one document is
/// a single atomic step and writers to different collections do not contend.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Arc<RwLock<Collection>>>>,
    persistence: Option<Persistence>,
}

impl MemoryStore {
    /// A store that lives only in memory.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            persistence: None,
        }
    }

    /// Open a store for `config`, restoring its snapshot when one exists.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let origin = config.to_url();
        let Some(path) = config.snapshot_path() else {
            info!("Opened in-memory store {}", origin);
            return Ok(Self::new());
        };

        let snapshots = SnapshotManager::new(&path);
        let mut collections = HashMap::new();
        if let Some(snapshot) = snapshots.load()? {
            info!(
                "Restoring {} from {} ({} documents in {} collections)",
                origin,
                path.display(),
                snapshot.metadata.document_count,
                snapshot.metadata.collection_count
            );
            if snapshot.metadata.source != origin {
                warn!(
                    "Snapshot {} was written by {}, now opened as {}",
                    path.display(),
                    snapshot.metadata.source,
                    origin
                );
            }
            for (name, collection) in snapshot.collections {
                collections.insert(name, Arc::new(RwLock::new(Collection::from_snapshot(collection))));
            }
        } else {
            info!("Opened new store {} at {}", origin, path.display());
        }

        Ok(Self {
            collections: RwLock::new(collections),
            persistence: Some(Persistence {
                snapshots,
                origin,
                durability: config.durability,
                threshold: config.checkpoint_threshold,
                writes_since_checkpoint: AtomicUsize::new(0),
            }),
        })
    }

    /// Write the whole store to its snapshot file. No-op without a data dir.
    pub async fn checkpoint(&self) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };

        let handles: Vec<(String, Arc<RwLock<Collection>>)> = {
            let collections = self.collections.read().await;
            collections
                .iter()
                .map(|(name, handle)| (name.clone(), handle.clone()))
                .collect()
        };

        let mut snapshot = HashMap::new();
        for (name, handle) in handles {
            let collection = handle.read().await;
            snapshot.insert(name, collection.to_snapshot());
        }

        let snapshot = StoreSnapshot::new(snapshot, persistence.origin.as_str());
        persistence.snapshots.save(&snapshot)?;
        persistence.writes_since_checkpoint.store(0, Ordering::SeqCst);
        info!(
            "Checkpoint written to {} ({} documents)",
            persistence.snapshots.path().display(),
            snapshot.metadata.document_count
        );
        Ok(())
    }

    /// Checkpoint according to the durability mode once a write has been
    /// applied. The write stands even if the snapshot cannot be written;
    /// the failure is logged and retried at the next checkpoint.
    async fn after_write(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let due = match persistence.durability {
            DurabilityMode::None => false,
            DurabilityMode::Sync => true,
            DurabilityMode::Async => {
                let writes = persistence.writes_since_checkpoint.fetch_add(1, Ordering::SeqCst) + 1;
                writes >= persistence.threshold
            }
        };
        if due {
            if let Err(err) = self.checkpoint().await {
                warn!(
                    "Checkpoint to {} failed, keeping changes in memory: {}",
                    persistence.snapshots.path().display(),
                    err
                );
            }
        }
    }

    async fn get_collection(&self, name: &str) -> Option<Arc<RwLock<Collection>>> {
        self.collections.read().await.get(name).cloned()
    }

    async fn get_or_create_collection(&self, name: &str) -> Arc<RwLock<Collection>> {
        if let Some(handle) = self.get_collection(name).await {
            return handle;
        }
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Collection::default())))
            .clone()
    }

    fn project(doc: &Document, projection: Option<&Projection>) -> Document {
        match projection {
            Some(projection) => projection.apply(doc),
            None => doc.clone(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch_one(
        &self,
        collection: &str,
        id: i64,
        projection: Option<&Projection>,
    ) -> Result<Document> {
        debug!("fetch {}/{}", collection, id);
        let handle = self
            .get_collection(collection)
            .await
            .ok_or_else(|| DocError::not_found(collection, id))?;
        let docs = handle.read().await;
        docs.documents
            .get(&id)
            .map(|doc| Self::project(doc, projection))
            .ok_or_else(|| DocError::not_found(collection, id))
    }

    async fn fetch_many(
        &self,
        collection: &str,
        ids: &[i64],
        projection: Option<&Projection>,
    ) -> Result<Vec<Document>> {
        debug!("fetch {}/{:?}", collection, ids);
        let Some(handle) = self.get_collection(collection).await else {
            return match ids.first() {
                Some(id) => Err(DocError::not_found(collection, id)),
                None => Ok(Vec::new()),
            };
        };
        let docs = handle.read().await;
        ids.iter()
            .map(|id| {
                docs.documents
                    .get(id)
                    .map(|doc| Self::project(doc, projection))
                    .ok_or_else(|| DocError::not_found(collection, id))
            })
            .collect()
    }

    async fn find(
        &self,
        collection: &str,
        query: &Query,
        projection: Option<&Projection>,
    ) -> Result<Vec<Document>> {
        let Some(handle) = self.get_collection(collection).await else {
            return Ok(Vec::new());
        };
        let docs = handle.read().await;
        let matching = docs
            .documents
            .values()
            .filter(|doc| query.filter.matches(doc))
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|doc| Self::project(doc, projection))
            .collect::<Vec<_>>();
        debug!("find {} -> {} documents", collection, matching.len());
        Ok(matching)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let Some(handle) = self.get_collection(collection).await else {
            return Ok(0);
        };
        let docs = handle.read().await;
        Ok(docs.documents.values().filter(|doc| filter.matches(doc)).count())
    }

    async fn insert(&self, collection: &str, mut document: Document) -> Result<i64> {
        let handle = self.get_or_create_collection(collection).await;
        let id = {
            let mut docs = handle.write().await;
            docs.last_id += 1;
            let id = docs.last_id;
            document.insert(ID_FIELD.to_string(), Value::from(id));
            docs.documents.insert(id, document);
            id
        };
        debug!("insert {}/{}", collection, id);
        self.after_write().await;
        Ok(id)
    }

    async fn update(&self, collection: &str, id: i64, ops: &[UpdateOp]) -> Result<()> {
        if let Some(op) = ops.iter().find(|op| op.path().root() == ID_FIELD) {
            return Err(DocError::InvalidPath(format!("{}: id cannot be modified", op.path())));
        }
        let handle = self
            .get_collection(collection)
            .await
            .ok_or_else(|| DocError::not_found(collection, id))?;
        {
            let mut docs = handle.write().await;
            let doc = docs
                .documents
                .get_mut(&id)
                .ok_or_else(|| DocError::not_found(collection, id))?;
            apply_all(doc, ops)?;
        }
        debug!("update {}/{} ({} ops)", collection, id, ops.len());
        self.after_write().await;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: i64) -> Result<()> {
        let handle = self
            .get_collection(collection)
            .await
            .ok_or_else(|| DocError::not_found(collection, id))?;
        {
            let mut docs = handle.write().await;
            docs.documents
                .remove(&id)
                .ok_or_else(|| DocError::not_found(collection, id))?;
        }
        debug!("delete {}/{}", collection, id);
        self.after_write().await;
        Ok(())
    }

    async fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::FieldPath;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_monotonic_ids() {
        let store = MemoryStore::new();
        let first = store.insert("tests", doc(json!({"id": 0, "meta": "a"}))).await.unwrap();
        let second = store.insert("tests", doc(json!({"meta": "b"}))).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);

        store.delete("tests", second).await.unwrap();
        let third = store.insert("tests", doc(json!({}))).await.unwrap();
        assert_eq!(third, 3);

        let fetched = store.fetch_one("tests", first, None).await.unwrap();
        assert_eq!(fetched["id"], json!(1));
        assert_eq!(fetched["meta"], json!("a"));
    }

    #[tokio::test]
    async fn test_fetch_with_projection() {
        let store = MemoryStore::new();
        let id = store
            .insert("tests", doc(json!({"meta": "onigiri", "delta": "hinkali"})))
            .await
            .unwrap();
        let projection = Projection::of(["delta"]);
        let fetched = store.fetch_one("tests", id, Some(&projection)).await.unwrap();
        assert_eq!(Value::Object(fetched), json!({"id": id, "delta": "hinkali"}));
    }

    #[tokio::test]
    async fn test_fetch_many_keeps_order_and_fails_on_missing() {
        let store = MemoryStore::new();
        let a = store.insert("tests", doc(json!({"name": "a"}))).await.unwrap();
        let b = store.insert("tests", doc(json!({"name": "b"}))).await.unwrap();

        let docs = store.fetch_many("tests", &[b, a], None).await.unwrap();
        assert_eq!(docs[0]["name"], json!("b"));
        assert_eq!(docs[1]["name"], json!("a"));

        let err = store.fetch_many("tests", &[a, 99], None).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.fetch_one("missing", 1, None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rejected_update_leaves_document_untouched() {
        let store = MemoryStore::new();
        let id = store.insert("tests", doc(json!({"meta": "onigiri"}))).await.unwrap();
        let result = store
            .update(
                "tests",
                id,
                &[
                    UpdateOp::set(FieldPath::field("meta"), "ramen"),
                    UpdateOp::set(FieldPath::field("meta").index(0), 1),
                ],
            )
            .await;
        assert!(result.is_err());
        let fetched = store.fetch_one("tests", id, None).await.unwrap();
        assert_eq!(fetched["meta"], json!("onigiri"));

        let result = store
            .update("tests", id, &[UpdateOp::set(FieldPath::field("id"), 5)])
            .await;
        assert!(matches!(result, Err(DocError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_find_and_count() {
        let store = MemoryStore::new();
        for (user, status) in [(1, 1), (2, 1), (2, 2), (2, 3)] {
            store
                .insert("posts", doc(json!({"user": user, "status": status})))
                .await
                .unwrap();
        }

        let filter = Filter::new().eq("user", 2);
        assert_eq!(store.count("posts", &filter).await.unwrap(), 3);

        let page = store
            .find("posts", &Query::new(filter).offset(1).limit(1), Some(&Projection::of(["status"])))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(Value::Object(page[0].clone()), json!({"id": 3, "status": 2}));

        assert!(store.find("nothing", &Query::default(), None).await.unwrap().is_empty());
        assert_eq!(store.collections().await, vec!["posts".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MemoryStore::new();
        let id = store.insert("tests", doc(json!({}))).await.unwrap();
        store.delete("tests", id).await.unwrap();
        assert!(store.delete("tests", id).await.unwrap_err().is_not_found());
    }
}
