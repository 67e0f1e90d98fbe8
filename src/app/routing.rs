use super::binding::BindingRegistry;
use super::endpoint::EndpointCallback;
use super::error::HandlerError;
use super::request::SharedRequestReader;
use super::response::ResponseBuilder;
use super::wrapper::{AppWrapper, Injector};
use crate::router::Method;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// Wrapper whose handlers are raw endpoint callbacks.
pub struct Routing;

impl AppWrapper for Routing {
    type Handler = EndpointCallback;

    fn wrap_endpoint(_method: Method, handler: EndpointCallback) -> EndpointCallback {
        handler
    }
}

impl Routing {
    /// Declares an endpoint on `T`; the handler receives the bound instance with each request.
    pub fn bind<T, F, Fut>(registry: &BindingRegistry, method: Method, route: &str, handler: F)
    where
        T: Any + Send + Sync,
        F: Fn(Arc<T>, SharedRequestReader) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<ResponseBuilder, HandlerError>> + Send + 'static,
    {
        Self::decorate::<T, _>(registry, method, route, move |target: Arc<T>| {
            let handler = handler.clone();
            EndpointCallback::new(move |reader| handler(target.clone(), reader))
        });
    }
}

impl<'a> Injector<'a, Routing> {
    fn callback<F, Fut>(&mut self, method: Method, route: &str, callback: F) -> &mut Self
    where
        F: Fn(SharedRequestReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResponseBuilder, HandlerError>> + Send + 'static,
    {
        self.wrap(method, route, EndpointCallback::new(callback))
    }

    pub fn get<F, Fut>(&mut self, route: &str, callback: F) -> &mut Self
    where
        F: Fn(SharedRequestReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResponseBuilder, HandlerError>> + Send + 'static,
    {
        self.callback(Method::Get, route, callback)
    }

    pub fn post<F, Fut>(&mut self, route: &str, callback: F) -> &mut Self
    where
        F: Fn(SharedRequestReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResponseBuilder, HandlerError>> + Send + 'static,
    {
        self.callback(Method::Post, route, callback)
    }

    pub fn put<F, Fut>(&mut self, route: &str, callback: F) -> &mut Self
    where
        F: Fn(SharedRequestReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResponseBuilder, HandlerError>> + Send + 'static,
    {
        self.callback(Method::Put, route, callback)
    }

    pub fn patch<F, Fut>(&mut self, route: &str, callback: F) -> &mut Self
    where
        F: Fn(SharedRequestReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResponseBuilder, HandlerError>> + Send + 'static,
    {
        self.callback(Method::Patch, route, callback)
    }

    pub fn delete<F, Fut>(&mut self, route: &str, callback: F) -> &mut Self
    where
        F: Fn(SharedRequestReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResponseBuilder, HandlerError>> + Send + 'static,
    {
        self.callback(Method::Delete, route, callback)
    }
}
