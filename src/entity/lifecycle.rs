use super::Entity;
use crate::core::{DocError, Document, ID_FIELD, Result, timestamp_now};
use crate::diff::{FieldPath, TrackedState, UpdateOp, array, diff_attributes};
use crate::schema::EntityType;
use crate::storage::{Filter, Projection, Query};
use serde_json::Value;
use tracing::{Instrument, debug, info_span};

const CREATED_FIELD: &str = "created";
const UPDATED_FIELD: &str = "updated";

impl EntityType {
    /// Fetch one instance by id under an optional projection.
    pub async fn get(&self, id: i64, fields: Option<&[&str]>) -> Result<Entity> {
        let span = info_span!("entity.get", entity = %self.name(), id);
        async {
            let (collection, store) = self.backing()?;
            let projection = self.projection(fields)?;
            let doc = store.fetch_one(collection, id, projection.as_ref()).await?;
            Ok(Entity::hydrate(self.clone(), doc, projection.map(Projection::into_fields)))
        }
        .instrument(span)
        .await
    }

    /// Fetch instances in the order of `ids`; `NotFound` if any is missing.
    pub async fn get_many(&self, ids: &[i64], fields: Option<&[&str]>) -> Result<Vec<Entity>> {
        let span = info_span!("entity.get_many", entity = %self.name(), count = ids.len());
        async {
            let (collection, store) = self.backing()?;
            let projection = self.projection(fields)?;
            let docs = store.fetch_many(collection, ids, projection.as_ref()).await?;
            Ok(self.hydrate_all(docs, projection))
        }
        .instrument(span)
        .await
    }

    /// Instances matching an equality/containment query.
    pub async fn find(&self, query: &Query, fields: Option<&[&str]>) -> Result<Vec<Entity>> {
        let (collection, store) = self.backing()?;
        let projection = self.projection(fields)?;
        let docs = store.find(collection, query, projection.as_ref()).await?;
        Ok(self.hydrate_all(docs, projection))
    }

    pub async fn count(&self, filter: &Filter) -> Result<usize> {
        let (collection, store) = self.backing()?;
        store.count(collection, filter).await
    }

    fn hydrate_all(&self, docs: Vec<Document>, projection: Option<Projection>) -> Vec<Entity> {
        let specified = projection.map(Projection::into_fields);
        docs.into_iter()
            .map(|doc| Entity::hydrate(self.clone(), doc, specified.clone()))
            .collect()
    }

    /// Projection over declared fields; unknown names are rejected.
    fn projection(&self, fields: Option<&[&str]>) -> Result<Option<Projection>> {
        let Some(fields) = fields else {
            return Ok(None);
        };
        for field in fields {
            self.schema().attribute(field)?;
        }
        Ok(Some(Projection::of(fields.iter().copied())))
    }
}

impl Entity {
    /// Persist the instance.
    ///
    /// A fresh root instance is inserted whole and receives its id and
    /// `created` stamp. A persisted one sends only the operations the diff
    /// engine derives from its tracked state. `updated` is stamped on every
    /// call. If the store rejects the write, local state is left as it was
    /// so the save can be retried.
    pub async fn save(&mut self) -> Result<()> {
        let span = info_span!("entity.save", entity = %self.kind.name(), id = %self.id());
        self.save_inner().instrument(span).await
    }

    async fn save_inner(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.settle_lent();
        self.validate_touched()?;
        if self.is_persisted() {
            self.save_diff().await
        } else {
            self.save_insert().await
        }
    }

    async fn save_insert(&mut self) -> Result<()> {
        let (collection, store) = self.kind.backing()?;
        let now = timestamp_now();

        let mut doc = self.values.clone();
        doc.retain(|_, value| !value.is_null());
        if !self.loaded.contains(CREATED_FIELD) {
            doc.insert(CREATED_FIELD.to_string(), now.clone());
        }
        doc.insert(UPDATED_FIELD.to_string(), now);

        let id = store.insert(collection, doc.clone()).await?;
        doc.insert(ID_FIELD.to_string(), Value::from(id));
        debug!(id, fields = doc.len(), "inserted");

        self.loaded = doc.keys().cloned().collect();
        self.baseline = doc.clone();
        self.values = doc;
        self.specified = None;
        self.deleted.clear();
        self.unloaded_lists.clear();
        self.lent.clear();
        Ok(())
    }

    async fn save_diff(&mut self) -> Result<()> {
        let (collection, store) = self.kind.backing()?;
        let id = self.id().as_int().ok_or_else(|| DocError::NotPersisted {
            entity: self.kind.name().to_string(),
        })?;

        let state = TrackedState {
            values: &self.values,
            baseline: &self.baseline,
            loaded: &self.loaded,
            deleted: &self.deleted,
            unloaded_lists: &self.unloaded_lists,
        };
        let order = self
            .kind
            .schema()
            .attribute_names()
            .filter(|name| *name != ID_FIELD && *name != UPDATED_FIELD);
        let mut ops = diff_attributes(order, &state);

        let now = timestamp_now();
        ops.push(UpdateOp::set(FieldPath::field(UPDATED_FIELD), now.clone()));
        debug!(ops = ops.len(), "sending diff");

        store.update(collection, id, &ops).await?;

        self.values.insert(UPDATED_FIELD.to_string(), now);
        self.mark_touched(UPDATED_FIELD);
        self.commit_baseline();
        Ok(())
    }

    /// Make the just-written state the new baseline.
    fn commit_baseline(&mut self) {
        // Lists that were only appended to still don't know the stored
        // contents and go back to being unprojected. Replaced ones are now
        // known in full and stay loaded.
        for (name, start) in std::mem::take(&mut self.unloaded_lists) {
            let appended = self
                .values
                .get(&name)
                .is_some_and(|current| array::appended_tail(&start, current).is_some());
            if appended {
                self.values.remove(&name);
                self.loaded.remove(&name);
                if let Some(specified) = &mut self.specified {
                    specified.remove(&name);
                }
            }
        }

        for name in std::mem::take(&mut self.deleted) {
            self.baseline.remove(&name);
        }

        for name in &self.loaded {
            if let Some(value) = self.values.get(name) {
                self.baseline.insert(name.clone(), value.clone());
            }
        }
    }

    /// Re-hydrate from the store, dropping every unsaved local change.
    pub async fn reload(&mut self, fields: Option<&[&str]>) -> Result<()> {
        let span = info_span!("entity.reload", entity = %self.kind.name(), id = %self.id());
        async {
            self.ensure_usable()?;
            let id = self.persisted_id()?;
            let fresh = self.kind.get(id, fields).await?;
            *self = fresh;
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Delete the backing document. The instance stays in memory but can no
    /// longer be saved or reloaded.
    pub async fn rm(&mut self) -> Result<()> {
        let span = info_span!("entity.rm", entity = %self.kind.name(), id = %self.id());
        async {
            self.ensure_usable()?;
            let id = self.persisted_id()?;
            let (collection, store) = self.kind.backing()?;
            store.delete(collection, id).await?;
            self.removed = true;
            Ok(())
        }
        .instrument(span)
        .await
    }

    fn persisted_id(&self) -> Result<i64> {
        self.kind.backing()?;
        match self.id().as_int() {
            Some(id) if id != 0 => Ok(id),
            _ => Err(DocError::NotPersisted {
                entity: self.kind.name().to_string(),
            }),
        }
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.removed {
            return Err(DocError::Removed {
                entity: self.kind.name().to_string(),
                id: self.id().to_string(),
            });
        }
        Ok(())
    }
}
