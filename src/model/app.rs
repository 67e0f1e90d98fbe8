//! Exposes a model controller as a fixed set of CRUD endpoints.
//!
//! | operation  | endpoint      | input                       |
//! |------------|---------------|-----------------------------|
//! | count      | `GET /count`  | `where` from the query      |
//! | count-post | `POST /count` | `where` from the JSON body  |
//! | find       | `GET /find`   | `where`, `page`, `pageSize`, `sortBy`, `sortType` |
//! | find-post  | `POST /find`  | same, from the JSON body    |
//! | get        | `GET /get`    | `where`                     |
//! | get-post   | `POST /get`   | `where` from the JSON body  |
//! | create     | `POST /`      | model as the JSON body      |
//! | put        | `PUT /`       | model as the JSON body      |
//! | patch      | `PATCH /`     | partial model with `_id`    |
//! | delete     | `DELETE /`    | `where.$id` from the query  |

use super::controller::ModelController;
use super::error::ModelError;
use super::paging::{PagingKeys, PagingOptions, DEFAULT_PAGE_SIZE};
use super::query::Query;
use super::service::Model;
use crate::app::{
    App, AppProvider, Endpoint, EndpointCallback, EndpointsProvider, HandlerError, Params, RequestReader,
    ResponseBuilder, SharedRequestReader, SimpleAppProvider, Status,
};
use crate::router::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelOperation {
    Count,
    CountPost,
    Find,
    FindPost,
    Get,
    GetPost,
    Create,
    Put,
    Patch,
    Delete,
}

impl ModelOperation {
    pub const ALL: [ModelOperation; 10] = [
        ModelOperation::Count,
        ModelOperation::CountPost,
        ModelOperation::Find,
        ModelOperation::FindPost,
        ModelOperation::Get,
        ModelOperation::GetPost,
        ModelOperation::Create,
        ModelOperation::Put,
        ModelOperation::Patch,
        ModelOperation::Delete,
    ];

    pub fn method(&self) -> Method {
        match self {
            ModelOperation::Count | ModelOperation::Find | ModelOperation::Get => Method::Get,
            ModelOperation::CountPost
            | ModelOperation::FindPost
            | ModelOperation::GetPost
            | ModelOperation::Create => Method::Post,
            ModelOperation::Put => Method::Put,
            ModelOperation::Patch => Method::Patch,
            ModelOperation::Delete => Method::Delete,
        }
    }

    pub fn route(&self) -> &'static str {
        match self {
            ModelOperation::Count | ModelOperation::CountPost => "/count",
            ModelOperation::Find | ModelOperation::FindPost => "/find",
            ModelOperation::Get | ModelOperation::GetPost => "/get",
            _ => "/",
        }
    }

    /// Whether parameters come from the JSON body instead of the query string.
    fn reads_body(&self) -> bool {
        matches!(
            self,
            ModelOperation::CountPost | ModelOperation::FindPost | ModelOperation::GetPost
        )
    }
}

async fn request_params(reader: &dyn RequestReader, from_body: bool) -> Result<Params, HandlerError> {
    if !from_body {
        return Ok(reader.head().params.clone());
    }
    match reader.read().await?.body.json {
        Some(Value::Object(params)) => Ok(params),
        None => Ok(Params::new()),
        Some(_) => Err(HandlerError::bad_request("request body must be a JSON object")),
    }
}

async fn json_body(reader: &dyn RequestReader) -> Result<Value, HandlerError> {
    reader
        .read()
        .await?
        .body
        .json
        .ok_or_else(|| HandlerError::bad_request("expected a JSON body"))
}

/// `where` as an object, or as a JSON string when it came through the query string.
fn where_query<T: Model>(params: &Params) -> Result<Query<T::Id>, HandlerError> {
    let parsed;
    let value = match params.get("where") {
        None | Some(Value::Null) => return Ok(Query::All),
        Some(Value::String(raw)) => {
            parsed = serde_json::from_str::<Value>(raw)
                .map_err(|e| HandlerError::bad_request(format!("invalid where: {}", e)))?;
            &parsed
        }
        Some(value) => value,
    };
    Ok(Query::from_value(value).map_err(ModelError::from)?)
}

pub struct ModelAppProvider<T: Model> {
    base: SimpleAppProvider,
    controller: Arc<ModelController<T>>,
    operations: Vec<ModelOperation>,
    page_size: u64,
}

impl<T: Model> ModelAppProvider<T> {
    pub fn new(controller: Arc<ModelController<T>>) -> Self {
        Self::with_operations(controller, ModelOperation::ALL.to_vec())
    }

    /// An empty list exposes every operation.
    pub fn with_operations(controller: Arc<ModelController<T>>, operations: Vec<ModelOperation>) -> Self {
        let operations = if operations.is_empty() {
            ModelOperation::ALL.to_vec()
        } else {
            operations
        };
        Self {
            base: SimpleAppProvider::new(),
            controller,
            operations,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Page size `find` uses when the request names none.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn operations(&self) -> &[ModelOperation] {
        &self.operations
    }

    pub fn controller(&self) -> &Arc<ModelController<T>> {
        &self.controller
    }

    /// Builds an App exposing only `operations`, plus any endpoints added to this provider.
    pub fn build_with(&self, name: &str, operations: &[ModelOperation]) -> App {
        let mut app = self.base.build(name);
        for operation in operations {
            app.add_endpoint(self.endpoint_for(*operation));
        }
        tracing::debug!(app = %name, operations = ?operations, "model app built");
        app
    }

    fn callback<F, Fut>(&self, handler: F) -> EndpointCallback
    where
        F: Fn(Arc<ModelController<T>>, SharedRequestReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        let controller = self.controller.clone();
        EndpointCallback::new(move |reader| {
            let result = handler(controller.clone(), reader);
            async move { Ok(ResponseBuilder::json(result.await?, Status::OK)) }
        })
    }

    fn endpoint_for(&self, operation: ModelOperation) -> Endpoint {
        let from_body = operation.reads_body();
        let page_size = self.page_size;
        let callback = match operation {
            ModelOperation::Count | ModelOperation::CountPost => self.callback(move |controller, reader| async move {
                let params = request_params(reader.as_ref(), from_body).await?;
                let query = where_query::<T>(&params)?;
                Ok(json!(controller.count(&query).await?))
            }),
            ModelOperation::Find | ModelOperation::FindPost => self.callback(move |controller, reader| async move {
                let params = request_params(reader.as_ref(), from_body).await?;
                let query = where_query::<T>(&params)?;
                let mut options = PagingOptions::from_params(&params, PagingKeys::PLAIN);
                options.page_size = options.page_size.or(Some(page_size));
                Ok(serde_json::to_value(controller.find(&query, &options).await?)?)
            }),
            ModelOperation::Get | ModelOperation::GetPost => self.callback(move |controller, reader| async move {
                let params = request_params(reader.as_ref(), from_body).await?;
                let query = where_query::<T>(&params)?;
                Ok(serde_json::to_value(controller.get(&query).await?)?)
            }),
            ModelOperation::Create => self.callback(|controller, reader| async move {
                let body = json_body(reader.as_ref()).await?;
                Ok(serde_json::to_value(controller.create(body).await?)?)
            }),
            ModelOperation::Put => self.callback(|controller, reader| async move {
                let body = json_body(reader.as_ref()).await?;
                Ok(serde_json::to_value(controller.put(body).await?)?)
            }),
            ModelOperation::Patch => self.callback(|controller, reader| async move {
                let body = json_body(reader.as_ref()).await?;
                Ok(serde_json::to_value(controller.patch(body).await?)?)
            }),
            ModelOperation::Delete => self.callback(|controller, reader| async move {
                let params = request_params(reader.as_ref(), false).await?;
                match where_query::<T>(&params)? {
                    Query::ById(id) => Ok(json!(controller.delete(&id).await?)),
                    _ => Err(HandlerError::bad_request("delete requires where.$id")),
                }
            }),
        };
        Endpoint::new(operation.method(), operation.route(), callback)
    }
}

impl<T: Model> EndpointsProvider for ModelAppProvider<T> {
    fn add_endpoint(&mut self, endpoint: Endpoint) {
        self.base.add_endpoint(endpoint);
    }

    fn responds_to(&self, method: Method, route: &str) -> bool {
        self.base.responds_to(method, route)
            || self
                .operations
                .iter()
                .any(|op| op.method() == method && op.route() == route)
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints = self.base.endpoints();
        endpoints.extend(self.operations.iter().map(|op| self.endpoint_for(*op)));
        endpoints
    }
}

impl<T: Model> AppProvider for ModelAppProvider<T> {
    fn build(&self, name: &str) -> App {
        self.build_with(name, &self.operations)
    }
}
