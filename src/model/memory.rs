//! In-process model backend. Documents are kept as JSON in insertion order and queried through
//! the same document translation the MongoDB-style filters use.

use super::controller::CrudMethod;
use super::document::{apply_find_options, apply_update, matches, seed_from_filter};
use super::error::ModelError;
use super::paging::PagingOptions;
use super::query::{Query, UpdateQuery, ID_FIELD};
use super::service::{
    to_document, Cursor, DeleteResult, InsertOrUpdateResult, Model, ModelService, ReplaceResult,
    UpdateResult,
};
use super::translate::{translate_find_query, translate_update_query};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;

pub struct MemoryModelService<T> {
    name: String,
    documents: Arc<RwLock<Vec<Value>>>,
    transactions: Arc<Mutex<()>>,
    model: PhantomData<fn() -> T>,
}

impl<T> Clone for MemoryModelService<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            documents: Arc::clone(&self.documents),
            transactions: Arc::clone(&self.transactions),
            model: PhantomData,
        }
    }
}

fn new_id() -> Value {
    Value::String(uuid::Uuid::new_v4().to_string())
}

impl<T: Model> MemoryModelService<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Arc::new(RwLock::new(Vec::new())),
            transactions: Arc::new(Mutex::new(())),
            model: PhantomData,
        }
    }

    /// Runs `f` against this collection, one transaction at a time. When `f` fails the
    /// collection is restored to its state at the start; writes made concurrently outside a
    /// transaction are lost with it.
    pub async fn with_transaction<R, F>(&self, f: F) -> Result<R, ModelError>
    where
        F: for<'s> FnOnce(&'s MemoryModelService<T>) -> BoxFuture<'s, Result<R, ModelError>>,
    {
        let _serialized = self.transactions.lock().await;
        let snapshot = self.read()?.clone();
        let result = f(self).await;
        if result.is_err() {
            *self.write()? = snapshot;
        }
        result
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Value>>, ModelError> {
        self.documents
            .read()
            .map_err(|_| ModelError::Store(format!("collection {} is poisoned", self.name)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Value>>, ModelError> {
        self.documents
            .write()
            .map_err(|_| ModelError::Store(format!("collection {} is poisoned", self.name)))
    }

    fn decode(document: Value) -> Result<T, ModelError> {
        Ok(serde_json::from_value(document)?)
    }

    /// Serializes `model` and assigns a fresh identity when it has none.
    fn prepare(model: &T) -> Result<Map<String, Value>, ModelError> {
        let mut document = to_document(model)?;
        if document.get(ID_FIELD).map_or(true, Value::is_null) {
            document.insert(ID_FIELD.into(), new_id());
        }
        Ok(document)
    }

    fn position_of(documents: &[Value], id: &Value) -> Option<usize> {
        documents.iter().position(|d| d.get(ID_FIELD) == Some(id))
    }

    fn matching(&self, query: &Query<T::Id>) -> Result<Vec<Value>, ModelError> {
        let filter = translate_find_query(query)?;
        Ok(self.read()?.iter().filter(|d| matches(&filter, d)).cloned().collect())
    }

    fn update_matching(
        &self,
        query: &Query<T::Id>,
        update: &UpdateQuery,
        many: bool,
    ) -> Result<UpdateResult, ModelError> {
        let filter = translate_find_query(query)?;
        let operators = translate_update_query(update);
        let mut documents = self.write()?;
        let mut result = UpdateResult::default();
        for document in documents.iter_mut().filter(|d| matches(&filter, d)) {
            result.matched += 1;
            let mut candidate = document.clone();
            if apply_update(&operators, &mut candidate)? {
                *document = candidate;
                result.updated = true;
            }
            if !many {
                break;
            }
        }
        Ok(result)
    }

    fn upsert_matching(
        &self,
        query: &Query<T::Id>,
        update: &UpdateQuery,
        many: bool,
    ) -> Result<InsertOrUpdateResult<T::Id>, ModelError> {
        let updated = self.update_matching(query, update, many)?;
        if updated.matched > 0 {
            return Ok(InsertOrUpdateResult {
                matched: updated.matched,
                updated: updated.updated,
                inserted: false,
                inserted_id: None,
            });
        }
        let mut document = seed_from_filter(&translate_find_query(query)?);
        apply_update(&translate_update_query(update), &mut document)?;
        if document.get(ID_FIELD).map_or(true, Value::is_null) {
            document[ID_FIELD] = new_id();
        }
        let id = document[ID_FIELD].clone();
        self.write()?.push(document);
        Ok(InsertOrUpdateResult {
            matched: 0,
            updated: false,
            inserted: true,
            inserted_id: Some(serde_json::from_value(id)?),
        })
    }
}

#[async_trait]
impl<T: Model> ModelService<T> for MemoryModelService<T> {
    fn collection_name(&self) -> &str {
        &self.name
    }

    async fn select(&self, query: &Query<T::Id>, options: &PagingOptions) -> Result<Box<dyn Cursor<T>>, ModelError> {
        let selected = self.matching(query)?;
        let total = selected.len() as u64;
        let page = apply_find_options(selected, &options.find_options());
        Ok(Box::new(MemoryCursor::<T>::new(page, total)))
    }

    async fn count(&self, query: &Query<T::Id>) -> Result<u64, ModelError> {
        let filter = translate_find_query(query)?;
        Ok(self.read()?.iter().filter(|d| matches(&filter, d)).count() as u64)
    }

    async fn find(&self, query: &Query<T::Id>) -> Result<Option<T>, ModelError> {
        let filter = translate_find_query(query)?;
        let found = self.read()?.iter().find(|d| matches(&filter, d)).cloned();
        found.map(Self::decode).transpose()
    }

    async fn create(&self, model: T) -> Result<T, ModelError> {
        let document = Value::Object(Self::prepare(&model)?);
        let mut documents = self.write()?;
        if Self::position_of(&documents, &document[ID_FIELD]).is_some() {
            return Err(ModelError::Conflict(format!("duplicate {} {}", ID_FIELD, document[ID_FIELD])));
        }
        documents.push(document.clone());
        drop(documents);
        Self::decode(document)
    }

    async fn create_all(&self, models: Vec<T>) -> Result<Vec<T>, ModelError> {
        let prepared = models
            .iter()
            .map(|m| Self::prepare(m).map(Value::Object))
            .collect::<Result<Vec<_>, _>>()?;
        let mut documents = self.write()?;
        for (i, document) in prepared.iter().enumerate() {
            let id = &document[ID_FIELD];
            let duplicate = Self::position_of(&documents, id).is_some()
                || prepared[..i].iter().any(|d| &d[ID_FIELD] == id);
            if duplicate {
                return Err(ModelError::Conflict(format!("duplicate {} {}", ID_FIELD, id)));
            }
        }
        documents.extend(prepared.iter().cloned());
        drop(documents);
        prepared.into_iter().map(Self::decode).collect()
    }

    async fn patch(&self, id: &T::Id, fields: Map<String, Value>) -> Result<Option<T>, ModelError> {
        let id = serde_json::to_value(id)?;
        let mut documents = self.write()?;
        let Some(position) = Self::position_of(&documents, &id) else {
            return Ok(None);
        };
        let mut candidate = documents[position].clone();
        for (field, value) in fields {
            if field != ID_FIELD {
                candidate[field.as_str()] = value;
            }
        }
        let patched = serde_json::from_value(candidate.clone())
            .map_err(|e| ModelError::invalid(CrudMethod::Patch, e.to_string()))?;
        documents[position] = candidate;
        Ok(Some(patched))
    }

    async fn put(&self, model: T) -> Result<Option<T>, ModelError> {
        let document = Value::Object(Self::prepare(&model)?);
        let mut documents = self.write()?;
        match Self::position_of(&documents, &document[ID_FIELD]) {
            Some(position) => documents[position] = document.clone(),
            None => documents.push(document.clone()),
        }
        drop(documents);
        Self::decode(document).map(Some)
    }

    async fn delete_by_id(&self, id: &T::Id) -> Result<DeleteResult, ModelError> {
        let id = serde_json::to_value(id)?;
        let mut documents = self.write()?;
        let before = documents.len();
        documents.retain(|d| d.get(ID_FIELD) != Some(&id));
        let removed = (before - documents.len()) as u64;
        Ok(DeleteResult {
            deleted: removed > 0,
            matched: removed,
        })
    }

    async fn update(&self, query: &Query<T::Id>, update: &UpdateQuery) -> Result<UpdateResult, ModelError> {
        self.update_matching(query, update, false)
    }

    async fn update_all(&self, query: &Query<T::Id>, update: &UpdateQuery) -> Result<UpdateResult, ModelError> {
        self.update_matching(query, update, true)
    }

    async fn update_or_insert(
        &self,
        query: &Query<T::Id>,
        update: &UpdateQuery,
    ) -> Result<InsertOrUpdateResult<T::Id>, ModelError> {
        self.upsert_matching(query, update, false)
    }

    async fn update_or_insert_all(
        &self,
        query: &Query<T::Id>,
        update: &UpdateQuery,
    ) -> Result<InsertOrUpdateResult<T::Id>, ModelError> {
        self.upsert_matching(query, update, true)
    }

    async fn delete_all(&self, query: &Query<T::Id>) -> Result<DeleteResult, ModelError> {
        let filter = translate_find_query(query)?;
        let mut documents = self.write()?;
        let before = documents.len();
        documents.retain(|d| !matches(&filter, d));
        let removed = (before - documents.len()) as u64;
        Ok(DeleteResult {
            deleted: removed > 0,
            matched: removed,
        })
    }

    async fn replace(&self, query: &Query<T::Id>, model: T) -> Result<ReplaceResult<T::Id>, ModelError> {
        let filter = translate_find_query(query)?;
        let mut replacement = to_document(&model)?;
        let mut documents = self.write()?;
        let Some(position) = documents.iter().position(|d| matches(&filter, d)) else {
            return Ok(ReplaceResult {
                ids: Vec::new(),
                replaced: false,
                matched: 0,
            });
        };
        let id = documents[position][ID_FIELD].clone();
        replacement.insert(ID_FIELD.into(), id.clone());
        let replacement = Value::Object(replacement);
        let replaced = documents[position] != replacement;
        documents[position] = replacement;
        drop(documents);
        Ok(ReplaceResult {
            ids: vec![serde_json::from_value(id)?],
            replaced,
            matched: 1,
        })
    }

    async fn clear(&self) -> Result<(), ModelError> {
        self.write()?.clear();
        Ok(())
    }

    async fn drop_collection(&self) -> Result<(), ModelError> {
        self.clear().await
    }
}

/// Cursor over a snapshot taken when the selection was made.
pub struct MemoryCursor<T> {
    pending: VecDeque<Value>,
    total: u64,
    fetched: u64,
    has_next: bool,
    open: bool,
    model: PhantomData<fn() -> T>,
}

impl<T> MemoryCursor<T> {
    fn new(page: Vec<Value>, total: u64) -> Self {
        Self {
            pending: page.into(),
            total,
            fetched: 0,
            has_next: true,
            open: true,
            model: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Model> Cursor<T> for MemoryCursor<T> {
    fn is_open(&self) -> bool {
        self.open
    }

    fn has_next(&self) -> bool {
        self.open && self.has_next
    }

    fn total_fetched(&self) -> u64 {
        self.fetched
    }

    async fn fetch(&mut self, size: usize) -> Result<Vec<T>, ModelError> {
        if !self.open {
            return Err(ModelError::CursorClosed);
        }
        let take = size.min(self.pending.len());
        let batch: Vec<Value> = self.pending.drain(..take).collect();
        if batch.len() < size {
            self.has_next = false;
        }
        self.fetched += batch.len() as u64;
        batch
            .into_iter()
            .map(|d| serde_json::from_value(d).map_err(ModelError::from))
            .collect()
    }

    async fn to_array(&mut self) -> Result<Vec<T>, ModelError> {
        let remaining = self.pending.len();
        let all = self.fetch(remaining).await?;
        self.has_next = false;
        Ok(all)
    }

    async fn count(&mut self) -> Result<u64, ModelError> {
        Ok(self.total)
    }

    async fn close(&mut self) -> Result<(), ModelError> {
        self.open = false;
        self.has_next = false;
        self.pending.clear();
        Ok(())
    }
}
