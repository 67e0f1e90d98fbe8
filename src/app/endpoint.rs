use super::error::HandlerError;
use super::request::SharedRequestReader;
use super::response::ResponseBuilder;
use crate::router::{Method, Route};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub type EndpointFuture = BoxFuture<'static, Result<ResponseBuilder, HandlerError>>;

/// Shared async callback digesting one request.
#[derive(Clone)]
pub struct EndpointCallback(Arc<dyn Fn(SharedRequestReader) -> EndpointFuture + Send + Sync>);

impl EndpointCallback {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(SharedRequestReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResponseBuilder, HandlerError>> + Send + 'static,
    {
        Self(Arc::new(move |reader| Box::pin(callback(reader))))
    }

    pub fn call(&self, reader: SharedRequestReader) -> EndpointFuture {
        (self.0)(reader)
    }
}

impl fmt::Debug for EndpointCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EndpointCallback")
    }
}

#[derive(Clone, Debug)]
pub struct Endpoint {
    pub method: Method,
    pub route: String,
    pub callback: EndpointCallback,
}

impl Endpoint {
    pub fn new(method: Method, route: impl Into<String>, callback: EndpointCallback) -> Self {
        Self {
            method,
            route: route.into(),
            callback,
        }
    }
}

impl Route for Endpoint {
    fn method(&self) -> Method {
        self.method
    }

    fn route(&self) -> &str {
        &self.route
    }
}

/// Something that collects endpoints: Apps and AppProviders.
pub trait EndpointsProvider: Send + Sync {
    fn add_endpoint(&mut self, endpoint: Endpoint);

    fn responds_to(&self, method: Method, route: &str) -> bool;

    fn endpoints(&self) -> Vec<Endpoint>;

    fn endpoint<F, Fut>(&mut self, method: Method, route: impl Into<String>, callback: F) -> &mut Self
    where
        Self: Sized,
        F: Fn(SharedRequestReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResponseBuilder, HandlerError>> + Send + 'static,
    {
        self.add_endpoint(Endpoint::new(method, route, EndpointCallback::new(callback)));
        self
    }
}

/// Something that turns a request into a response builder.
#[async_trait]
pub trait EndpointsResolver: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, reader: SharedRequestReader) -> Result<ResponseBuilder, HandlerError>;
}
