//! Controller-style endpoints: handlers receive a parsed context (and the payload for body-carrying
//! methods) and return plain data, which is serialized as JSON.

mod context;

pub use context::{Context, Payload};

use crate::app::{
    AppWrapper, BindingRegistry, EndpointCallback, HandlerError, Injector, ResponseBuilder, SharedRequestReader,
    Status,
};
use crate::router::Method;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// What a controller handler produced.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Sent as is.
    Builder(ResponseBuilder),
    /// JSON with 200, or 204 without a body when null.
    Data(Value),
}

impl Reply {
    pub fn data<T: Serialize>(value: T) -> Result<Self, HandlerError> {
        Ok(Reply::Data(serde_json::to_value(value)?))
    }

    pub fn empty() -> Self {
        Reply::Data(Value::Null)
    }

    pub fn into_response_builder(self) -> ResponseBuilder {
        match self {
            Reply::Builder(builder) => builder,
            Reply::Data(Value::Null) => ResponseBuilder::no_content(),
            Reply::Data(value) => ResponseBuilder::json(value, Status::OK),
        }
    }
}

impl From<ResponseBuilder> for Reply {
    fn from(builder: ResponseBuilder) -> Self {
        Reply::Builder(builder)
    }
}

pub type ReplyFuture = BoxFuture<'static, Result<Reply, HandlerError>>;

#[derive(Clone)]
pub enum ControllerCallback {
    /// Context only.
    Params(Arc<dyn Fn(Context) -> ReplyFuture + Send + Sync>),
    /// Context plus the decoded payload, which is empty for GET and DELETE.
    Data(Arc<dyn Fn(Context, Payload) -> ReplyFuture + Send + Sync>),
}

impl ControllerCallback {
    pub fn params<F, Fut>(callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
    {
        ControllerCallback::Params(Arc::new(move |context| Box::pin(callback(context))))
    }

    pub fn data<F, Fut>(callback: F) -> Self
    where
        F: Fn(Context, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
    {
        ControllerCallback::Data(Arc::new(move |context, payload| Box::pin(callback(context, payload))))
    }
}

pub struct Controller;

impl AppWrapper for Controller {
    type Handler = ControllerCallback;

    /// The body is read for POST, PUT and PATCH only, whatever the handler kind.
    fn wrap_endpoint(method: Method, handler: ControllerCallback) -> EndpointCallback {
        let reads_body = method.carries_payload();
        EndpointCallback::new(move |reader: SharedRequestReader| {
            let handler = handler.clone();
            async move {
                let (context, payload) = if reads_body {
                    let request = reader.read().await?;
                    (Context::from_head(request.head), Payload::from_body(request.body))
                } else {
                    (Context::from_head(reader.head().clone()), Payload::Empty)
                };
                let reply = match handler {
                    ControllerCallback::Params(callback) => callback(context).await?,
                    ControllerCallback::Data(callback) => callback(context, payload).await?,
                };
                Ok(reply.into_response_builder())
            }
        })
    }
}

impl Controller {
    /// Declares a context-only handler on `T`.
    pub fn bind_params<T, F, Fut>(registry: &BindingRegistry, method: Method, route: &str, handler: F)
    where
        T: Any + Send + Sync,
        F: Fn(Arc<T>, Context) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
    {
        Self::decorate::<T, _>(registry, method, route, move |target: Arc<T>| {
            let handler = handler.clone();
            ControllerCallback::params(move |context| handler(target.clone(), context))
        });
    }

    /// Declares a payload-receiving handler on `T`.
    pub fn bind_data<T, F, Fut>(registry: &BindingRegistry, method: Method, route: &str, handler: F)
    where
        T: Any + Send + Sync,
        F: Fn(Arc<T>, Context, Payload) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
    {
        Self::decorate::<T, _>(registry, method, route, move |target: Arc<T>| {
            let handler = handler.clone();
            ControllerCallback::data(move |context, payload| handler(target.clone(), context, payload))
        });
    }
}

impl<'a> Injector<'a, Controller> {
    pub fn get<F, Fut>(&mut self, route: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
    {
        self.wrap(Method::Get, route, ControllerCallback::params(handler))
    }

    pub fn delete<F, Fut>(&mut self, route: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
    {
        self.wrap(Method::Delete, route, ControllerCallback::params(handler))
    }

    pub fn post<F, Fut>(&mut self, route: &str, handler: F) -> &mut Self
    where
        F: Fn(Context, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
    {
        self.wrap(Method::Post, route, ControllerCallback::data(handler))
    }

    pub fn put<F, Fut>(&mut self, route: &str, handler: F) -> &mut Self
    where
        F: Fn(Context, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
    {
        self.wrap(Method::Put, route, ControllerCallback::data(handler))
    }

    pub fn patch<F, Fut>(&mut self, route: &str, handler: F) -> &mut Self
    where
        F: Fn(Context, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
    {
        self.wrap(Method::Patch, route, ControllerCallback::data(handler))
    }
}
