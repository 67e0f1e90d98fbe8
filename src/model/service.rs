//! Persistence contract shared by every model backend.

use super::error::ModelError;
use super::paging::{PagedData, PagingOptions};
use super::query::{Query, UpdateQuery, ID_FIELD};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A persisted document type. Its identity is stored under `_id`.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    type Id: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
}

impl Model for Value {
    type Id = Value;
}

/// Serializes a model into a JSON object.
pub fn to_document<T: Serialize>(model: &T) -> Result<Map<String, Value>, ModelError> {
    match serde_json::to_value(model)? {
        Value::Object(map) => Ok(map),
        other => Err(ModelError::Incompatible(format!("expected an object, got {}", other))),
    }
}

pub fn document_id<TId: DeserializeOwned>(document: &Map<String, Value>) -> Result<Option<TId>, ModelError> {
    match document.get(ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(id) => Ok(Some(TId::deserialize(id)?)),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub updated: bool,
    pub matched: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted: bool,
    pub matched: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplaceResult<TId> {
    pub ids: Vec<TId>,
    pub replaced: bool,
    pub matched: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOrUpdateResult<TId> {
    pub matched: u64,
    pub updated: bool,
    pub inserted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_id: Option<TId>,
}

/// Forward-only view over a selection. Dropping an open cursor releases its backend resources.
#[async_trait]
pub trait Cursor<T>: Send {
    fn is_open(&self) -> bool;

    /// Whether a later `fetch` may still return results.
    fn has_next(&self) -> bool;

    fn total_fetched(&self) -> u64;

    /// Up to `size` further results. Fewer than `size` means the cursor is exhausted.
    async fn fetch(&mut self, size: usize) -> Result<Vec<T>, ModelError>;

    /// Every remaining result.
    async fn to_array(&mut self) -> Result<Vec<T>, ModelError>;

    /// Number of documents the query matches, ignoring paging.
    async fn count(&mut self) -> Result<u64, ModelError>;

    async fn close(&mut self) -> Result<(), ModelError>;
}

#[async_trait]
pub trait ModelService<T: Model>: Send + Sync {
    fn collection_name(&self) -> &str;

    async fn select(
        &self,
        query: &Query<T::Id>,
        options: &PagingOptions,
    ) -> Result<Box<dyn Cursor<T>>, ModelError>;

    async fn count(&self, query: &Query<T::Id>) -> Result<u64, ModelError>;

    /// First match in backend order.
    async fn find(&self, query: &Query<T::Id>) -> Result<Option<T>, ModelError>;

    async fn get_by_id(&self, id: &T::Id) -> Result<Option<T>, ModelError> {
        self.find(&Query::ById(id.clone())).await
    }

    /// One page of matches. Page defaults to 1 and page size to 50; `total` ignores paging.
    async fn find_all(&self, query: &Query<T::Id>, options: &PagingOptions) -> Result<PagedData<T>, ModelError> {
        let options = options.with_defaults();
        let mut cursor = self.select(query, &options).await?;
        let data = cursor.to_array().await?;
        let total = cursor.count().await?;
        cursor.close().await?;
        Ok(PagedData::new(
            data,
            options.page.unwrap_or_default(),
            options.page_size.unwrap_or_default(),
            total,
        ))
    }

    /// Inserts a model, generating an identity when it has none.
    async fn create(&self, model: T) -> Result<T, ModelError>;

    async fn create_all(&self, models: Vec<T>) -> Result<Vec<T>, ModelError>;

    /// Sets the given top-level fields on the identified model and returns the result.
    async fn patch(&self, id: &T::Id, fields: Map<String, Value>) -> Result<Option<T>, ModelError>;

    /// Replaces the model with the same identity, inserting it when absent.
    async fn put(&self, model: T) -> Result<Option<T>, ModelError>;

    async fn delete_by_id(&self, id: &T::Id) -> Result<DeleteResult, ModelError>;

    async fn update(&self, query: &Query<T::Id>, update: &UpdateQuery) -> Result<UpdateResult, ModelError>;

    async fn update_all(&self, query: &Query<T::Id>, update: &UpdateQuery) -> Result<UpdateResult, ModelError>;

    async fn update_or_insert(
        &self,
        query: &Query<T::Id>,
        update: &UpdateQuery,
    ) -> Result<InsertOrUpdateResult<T::Id>, ModelError>;

    async fn update_or_insert_all(
        &self,
        query: &Query<T::Id>,
        update: &UpdateQuery,
    ) -> Result<InsertOrUpdateResult<T::Id>, ModelError>;

    async fn delete_all(&self, query: &Query<T::Id>) -> Result<DeleteResult, ModelError>;

    /// Replaces the first match, keeping its identity.
    async fn replace(&self, query: &Query<T::Id>, model: T) -> Result<ReplaceResult<T::Id>, ModelError>;

    /// Removes every document; the collection stays.
    async fn clear(&self) -> Result<(), ModelError>;

    /// Removes the collection itself.
    async fn drop_collection(&self) -> Result<(), ModelError>;
}

/// Runs `f` over a cursor for `query` and closes it afterwards, whatever `f` returned.
pub async fn with_cursor<T, S, R, F>(
    service: &S,
    query: &Query<T::Id>,
    options: &PagingOptions,
    f: F,
) -> Result<R, ModelError>
where
    T: Model,
    S: ModelService<T> + ?Sized,
    F: for<'c> FnOnce(&'c mut (dyn Cursor<T> + 'static)) -> BoxFuture<'c, Result<R, ModelError>>,
{
    let mut cursor = service.select(query, options).await?;
    let result = f(cursor.as_mut()).await;
    let closed = cursor.close().await;
    let value = result?;
    closed?;
    Ok(value)
}
