use super::binding::BindingRegistry;
use super::endpoint::{Endpoint, EndpointCallback, EndpointsProvider};
use crate::router::Method;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Adapts a handler shape into endpoint callbacks.
///
/// Endpoints are added either immediately through an [`Injector`] over a provider, or deferred with
/// [`AppWrapper::decorate`] until an instance of the owning type is bound.
pub trait AppWrapper: Sized + 'static {
    type Handler: Send + Sync + 'static;

    fn wrap_endpoint(method: Method, handler: Self::Handler) -> EndpointCallback;

    fn on(provider: &mut dyn EndpointsProvider) -> Injector<'_, Self> {
        Injector {
            provider,
            wrapper: PhantomData,
        }
    }

    fn decorate<T, F>(registry: &BindingRegistry, method: Method, route: &str, bind: F)
    where
        T: Any + Send + Sync,
        F: Fn(Arc<T>) -> Self::Handler + Send + Sync + 'static,
    {
        registry.register_endpoint::<T, _>(method, route, move |target| {
            Self::wrap_endpoint(method, bind(target))
        });
    }
}

/// Adds wrapped endpoints to a borrowed provider.
pub struct Injector<'a, W> {
    provider: &'a mut dyn EndpointsProvider,
    wrapper: PhantomData<fn() -> W>,
}

impl<'a, W: AppWrapper> Injector<'a, W> {
    pub fn inject_endpoint(&mut self, endpoint: Endpoint) -> &mut Self {
        self.provider.add_endpoint(endpoint);
        self
    }

    pub fn wrap(&mut self, method: Method, route: &str, handler: W::Handler) -> &mut Self {
        let callback = W::wrap_endpoint(method, handler);
        self.inject_endpoint(Endpoint::new(method, route, callback))
    }
}
