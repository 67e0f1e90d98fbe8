//! Multi-app dispatcher. The first path segment names the App, the rest is the route inside it.

use crate::app::{
    bind_target_to_app_provider, App, AppProvider, BeforeHook, BindingError, BindingRegistry,
    BufferedRequestReader, EndpointsResolver, RequestHead, Response, ResponseBuilder, Status,
};
use axum::body::Bytes;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Rewrites a built response before it leaves the server.
pub type AfterHook = Arc<dyn Fn(&RequestHead, Response) -> Response + Send + Sync>;

/// Name of the App serving paths no other App claims.
pub const ROOT_APP: &str = "/";

/// Splits `/users/find/x` into `("/users", "/find/x")`.
pub fn split_path(path: &str) -> (String, String) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((first, rest)) => (format!("/{}", first), format!("/{}", rest)),
        None => (format!("/{}", trimmed), "/".to_string()),
    }
}

fn normalize_name(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

pub struct Server {
    apps: HashMap<String, Arc<App>>,
    empty: Arc<App>,
    before: Vec<BeforeHook>,
    after: Vec<AfterHook>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    pub fn new() -> Self {
        Self {
            apps: HashMap::new(),
            empty: Arc::new(App::new("")),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Registers `app` under its name; a later App with the same name replaces it.
    pub fn app(&mut self, app: App) -> &mut Self {
        let name = normalize_name(app.name());
        tracing::debug!(app = %name, "app registered");
        self.apps.insert(name, Arc::new(app));
        self
    }

    pub fn app_from_provider<P: AppProvider + ?Sized>(&mut self, provider: &P, name: &str) -> &mut Self {
        self.app(provider.build(&normalize_name(name)))
    }

    /// Binds `target`'s decorated endpoints onto `provider` and registers the result. Without
    /// an explicit name the one the target type was provided for is used, else the root App.
    pub fn app_bound_to<T, P>(
        &mut self,
        registry: &BindingRegistry,
        provider: P,
        name: Option<&str>,
        target: Arc<T>,
    ) -> Result<&mut Self, BindingError>
    where
        T: Any + Send + Sync,
        P: AppProvider,
    {
        let bound = bind_target_to_app_provider(registry, target, provider)?;
        let name = name
            .map(str::to_string)
            .or_else(|| bound.app_name())
            .unwrap_or_else(|| ROOT_APP.to_string());
        Ok(self.app_from_provider(&bound, &name))
    }

    pub fn contains_app(&self, name: &str) -> bool {
        self.apps.contains_key(&normalize_name(name))
    }

    pub fn get_app(&self, name: &str) -> Option<&Arc<App>> {
        self.apps.get(&normalize_name(name))
    }

    pub fn before(&mut self, hook: BeforeHook) -> &mut Self {
        self.before.push(hook);
        self
    }

    pub fn after(&mut self, hook: AfterHook) -> &mut Self {
        self.after.push(hook);
        self
    }

    /// The App a path is served by and the route inside it.
    fn locate(&self, path: &str) -> (&Arc<App>, String) {
        let (name, route) = split_path(path);
        if let Some(app) = self.apps.get(&name) {
            return (app, route);
        }
        match self.apps.get(ROOT_APP) {
            Some(root) => (root, format!("/{}", path.trim_start_matches('/'))),
            None => (&self.empty, route),
        }
    }

    /// Serves one request. Failures escaping an App's error hook become a bare 500.
    pub async fn handle(&self, mut head: RequestHead, body: Bytes) -> Response {
        let (app, route) = self.locate(&head.path);
        head.app_name = Some(app.name().to_string());
        head.route = Some(route);
        let reader = BufferedRequestReader::new(head.clone())
            .with_body(body)
            .with_before_hooks(self.before.clone())
            .shared();
        let response = match app.resolve(reader).await {
            Ok(builder) => builder.build(),
            Err(e) => {
                tracing::error!(app = %app.name(), error = %e.trace(app.name()).to_full_string(), "error hook failed");
                ResponseBuilder::for_status(Status::INTERNAL_SERVER_ERROR, None).build()
            }
        };
        self.after.iter().fold(response, |response, hook| hook(&head, response))
    }
}
