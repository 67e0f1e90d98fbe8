//! Deferred endpoint bindings.
//!
//! Endpoints can be declared against a type before any instance of it exists. Once an instance is
//! available, `bind_target_to_app_provider` yields a provider whose Apps carry those endpoints with
//! handlers bound to that instance.

use super::application::App;
use super::endpoint::{Endpoint, EndpointsProvider};
use super::provider::AppProvider;
use crate::router::Method;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use thiserror::Error;

type Instance = Arc<dyn Any + Send + Sync>;
type BindingFn = Arc<dyn Fn(&mut dyn EndpointsProvider, Instance) + Send + Sync>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("incompatible object: no endpoints are declared for {type_name}")]
    IncompatibleObject { type_name: &'static str },
}

/// Pending bindings for one type plus the app name it is provided under, if any.
#[derive(Default)]
pub struct BindingMetadata {
    bindings: RwLock<Vec<BindingFn>>,
    app_name: RwLock<Option<String>>,
}

impl BindingMetadata {
    fn push(&self, binding: BindingFn) {
        self.bindings.write().unwrap_or_else(PoisonError::into_inner).push(binding);
    }

    fn snapshot(&self) -> Vec<BindingFn> {
        self.bindings.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.bindings.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn app_name(&self) -> Option<String> {
        self.app_name.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Per-type binding metadata, keyed by `TypeId`.
#[derive(Default)]
pub struct BindingRegistry {
    types: RwLock<HashMap<TypeId, Arc<BindingMetadata>>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry for declarations made at startup.
    pub fn global() -> &'static BindingRegistry {
        static GLOBAL: OnceLock<BindingRegistry> = OnceLock::new();
        GLOBAL.get_or_init(BindingRegistry::new)
    }

    pub fn metadata<T: Any>(&self) -> Option<Arc<BindingMetadata>> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .cloned()
    }

    fn ensure_metadata<T: Any>(&self) -> Arc<BindingMetadata> {
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(TypeId::of::<T>())
            .or_default()
            .clone()
    }

    /// Queues `binding` to run against every provider built for an instance of `T`.
    pub fn register<T, F>(&self, binding: F)
    where
        T: Any + Send + Sync,
        F: Fn(&mut dyn EndpointsProvider, Arc<T>) + Send + Sync + 'static,
    {
        let erased: BindingFn = Arc::new(move |provider: &mut dyn EndpointsProvider, instance: Instance| {
            if let Ok(target) = instance.downcast::<T>() {
                binding(provider, target);
            }
        });
        self.ensure_metadata::<T>().push(erased);
    }

    /// Queues a plain endpoint whose callback is produced from the bound instance.
    pub fn register_endpoint<T, F>(&self, method: Method, route: &str, make: F)
    where
        T: Any + Send + Sync,
        F: Fn(Arc<T>) -> super::EndpointCallback + Send + Sync + 'static,
    {
        let route = route.to_string();
        self.register::<T, _>(move |provider, target| {
            provider.add_endpoint(Endpoint::new(method, route.clone(), make(target)));
        });
    }

    /// Records the app name instances of `T` are mounted under by default.
    pub fn provided_for<T: Any>(&self, name: impl Into<String>) {
        *self
            .ensure_metadata::<T>()
            .app_name
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(name.into());
    }
}

/// Provider that builds the base provider's Apps and then applies the queued bindings.
pub struct BoundAppProvider<P> {
    base: P,
    target: Instance,
    metadata: Arc<BindingMetadata>,
}

impl<P> BoundAppProvider<P> {
    pub fn app_name(&self) -> Option<String> {
        self.metadata.app_name()
    }
}

pub fn bind_target_to_app_provider<T, P>(
    registry: &BindingRegistry,
    target: Arc<T>,
    base: P,
) -> Result<BoundAppProvider<P>, BindingError>
where
    T: Any + Send + Sync,
    P: AppProvider,
{
    let metadata = registry
        .metadata::<T>()
        .filter(|m| !m.is_empty())
        .ok_or(BindingError::IncompatibleObject {
            type_name: std::any::type_name::<T>(),
        })?;
    Ok(BoundAppProvider {
        base,
        target: target as Instance,
        metadata,
    })
}

impl<P: AppProvider> EndpointsProvider for BoundAppProvider<P> {
    fn add_endpoint(&mut self, endpoint: Endpoint) {
        self.base.add_endpoint(endpoint);
    }

    fn responds_to(&self, method: Method, route: &str) -> bool {
        self.base.responds_to(method, route)
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.base.endpoints()
    }
}

impl<P: AppProvider> AppProvider for BoundAppProvider<P> {
    fn build(&self, name: &str) -> App {
        let mut app = self.base.build(name);
        for binding in self.metadata.snapshot() {
            binding(&mut app, self.target.clone());
        }
        app
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{EndpointCallback, ResponseBuilder, SimpleAppProvider, Status};

    struct Greeter {
        greeting: String,
    }

    struct Unbound;

    #[test]
    fn binds_declared_endpoints_to_instance() {
        let registry = BindingRegistry::new();
        for method in [Method::Get, Method::Post] {
            registry.register_endpoint::<Greeter, _>(method, "/test-endpoint", |greeter| {
                EndpointCallback::new(move |_| {
                    let greeter = greeter.clone();
                    async move { Ok(ResponseBuilder::text(greeter.greeting.clone(), Status::OK)) }
                })
            });
        }

        let base = SimpleAppProvider::new();
        let target = Arc::new(Greeter { greeting: "hi".into() });
        let bound = bind_target_to_app_provider(&registry, target, base.clone()).unwrap();
        let app = bound.build("/");

        assert!(app.responds_to(Method::Get, "/test-endpoint"));
        assert!(app.responds_to(Method::Post, "/test-endpoint"));
        assert!(!base.responds_to(Method::Get, "/test-endpoint"));
        assert!(!base.responds_to(Method::Post, "/test-endpoint"));
    }

    #[test]
    fn rejects_types_without_bindings() {
        let registry = BindingRegistry::new();
        let err = bind_target_to_app_provider(&registry, Arc::new(Unbound), SimpleAppProvider::new())
            .err()
            .unwrap();
        assert!(matches!(err, BindingError::IncompatibleObject { .. }));
    }

    #[test]
    fn remembers_provided_app_name() {
        let registry = BindingRegistry::new();
        registry.provided_for::<Greeter>("/greetings");
        registry.register::<Greeter, _>(|_, _| {});
        let bound =
            bind_target_to_app_provider(&registry, Arc::new(Greeter { greeting: "x".into() }), SimpleAppProvider::new())
                .unwrap();
        assert_eq!(bound.app_name().as_deref(), Some("/greetings"));
    }
}
