use super::application::App;
use super::endpoint::{Endpoint, EndpointsProvider};
use crate::router::{Method, Router};

/// Factory for named Apps. Every built App gets its own snapshot of the provider's endpoints.
pub trait AppProvider: EndpointsProvider {
    fn build(&self, name: &str) -> App;

    fn copy_endpoints_to(&self, target: &mut dyn EndpointsProvider) {
        for endpoint in self.endpoints() {
            target.add_endpoint(endpoint);
        }
    }

    fn copy_endpoints_from(&mut self, source: &dyn EndpointsProvider) {
        for endpoint in source.endpoints() {
            self.add_endpoint(endpoint);
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SimpleAppProvider {
    router: Router<Endpoint>,
}

impl SimpleAppProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EndpointsProvider for SimpleAppProvider {
    fn add_endpoint(&mut self, endpoint: Endpoint) {
        self.router.add(endpoint);
    }

    fn responds_to(&self, method: Method, route: &str) -> bool {
        self.router.contains(method, route)
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.router.routes().cloned().collect()
    }
}

impl AppProvider for SimpleAppProvider {
    fn build(&self, name: &str) -> App {
        let mut app = App::new(name);
        self.copy_endpoints_to(&mut app);
        app
    }
}
