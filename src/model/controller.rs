use super::error::ModelError;
use super::paging::{PagedData, PagingOptions};
use super::query::{Query, ID_FIELD};
use super::service::{Model, ModelService};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrudMethod {
    Count,
    Find,
    Get,
    Create,
    Patch,
    Put,
    Delete,
}

impl fmt::Display for CrudMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrudMethod::Count => "count",
            CrudMethod::Find => "find",
            CrudMethod::Get => "get",
            CrudMethod::Create => "create",
            CrudMethod::Patch => "patch",
            CrudMethod::Put => "put",
            CrudMethod::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Per-model policy: which writes are acceptable and how results are presented.
pub trait ModelRules<T>: Send + Sync {
    fn validate(&self, _document: &Map<String, Value>, _method: CrudMethod) -> Result<(), ModelError> {
        Ok(())
    }

    /// Must return exactly one model per input.
    fn map(&self, models: Vec<T>) -> Result<Vec<T>, ModelError> {
        Ok(models)
    }
}

/// Accepts everything and maps nothing.
pub struct PassThrough;

impl<T> ModelRules<T> for PassThrough {}

/// CRUD operations over a model service with validation and result mapping applied.
pub struct ModelController<T: Model> {
    service: Arc<dyn ModelService<T>>,
    rules: Arc<dyn ModelRules<T>>,
}

impl<T: Model> ModelController<T> {
    pub fn new(service: Arc<dyn ModelService<T>>) -> Self {
        Self::with_rules(service, Arc::new(PassThrough))
    }

    pub fn with_rules(service: Arc<dyn ModelService<T>>, rules: Arc<dyn ModelRules<T>>) -> Self {
        Self { service, rules }
    }

    pub fn service(&self) -> &Arc<dyn ModelService<T>> {
        &self.service
    }

    fn map_all(&self, models: Vec<T>) -> Result<Vec<T>, ModelError> {
        let expected = models.len();
        let mapped = self.rules.map(models)?;
        if mapped.len() != expected {
            return Err(ModelError::Mapping(format!(
                "expected {} mapped models, got {}",
                expected,
                mapped.len()
            )));
        }
        Ok(mapped)
    }

    fn map_one(&self, model: Option<T>) -> Result<Option<T>, ModelError> {
        match model {
            Some(model) => Ok(self.map_all(vec![model])?.pop()),
            None => Ok(None),
        }
    }

    fn document(value: Value, method: CrudMethod) -> Result<Map<String, Value>, ModelError> {
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(ModelError::invalid(method, "expected a JSON object")),
        }
    }

    fn validated(&self, value: Value, method: CrudMethod) -> Result<T, ModelError> {
        let document = Self::document(value, method)?;
        self.rules.validate(&document, method)?;
        serde_json::from_value(Value::Object(document)).map_err(|e| ModelError::invalid(method, e.to_string()))
    }

    pub async fn count(&self, query: &Query<T::Id>) -> Result<u64, ModelError> {
        self.service.count(query).await
    }

    pub async fn find(&self, query: &Query<T::Id>, options: &PagingOptions) -> Result<PagedData<T>, ModelError> {
        let mut page = self.service.find_all(query, options).await?;
        let data = self.map_all(std::mem::take(&mut page.data))?;
        Ok(page.with_data(data))
    }

    pub async fn get(&self, query: &Query<T::Id>) -> Result<Option<T>, ModelError> {
        let found = self.service.find(query).await?;
        self.map_one(found)
    }

    pub async fn create(&self, value: Value) -> Result<T, ModelError> {
        let model = self.validated(value, CrudMethod::Create)?;
        let created = self.service.create(model).await?;
        self.map_one(Some(created))?
            .ok_or_else(|| ModelError::Mapping("mapping dropped the created model".into()))
    }

    pub async fn put(&self, value: Value) -> Result<Option<T>, ModelError> {
        let model = self.validated(value, CrudMethod::Put)?;
        let stored = self.service.put(model).await?;
        self.map_one(stored)
    }

    /// Patches the model identified by the document's `_id` with its remaining fields.
    pub async fn patch(&self, value: Value) -> Result<Option<T>, ModelError> {
        let mut document = Self::document(value, CrudMethod::Patch)?;
        let id = document
            .remove(ID_FIELD)
            .filter(|id| !id.is_null())
            .ok_or_else(|| ModelError::invalid(CrudMethod::Patch, "missing _id"))?;
        self.rules.validate(&document, CrudMethod::Patch)?;
        let id: T::Id = serde_json::from_value(id).map_err(|e| ModelError::invalid(CrudMethod::Patch, e.to_string()))?;
        let patched = self.service.patch(&id, document).await?;
        self.map_one(patched)
    }

    pub async fn delete(&self, id: &T::Id) -> Result<bool, ModelError> {
        Ok(self.service.delete_by_id(id).await?.deleted)
    }
}
