use super::Method;
use std::collections::HashMap;

/// Anything addressable by a method and an exact route string.
pub trait Route {
    fn method(&self) -> Method;
    fn route(&self) -> &str;
}

/// Lookup key shared by every router: `<method>:<route>`.
pub fn route_key(method: Method, route: &str) -> String {
    format!("{}:{}", method, route)
}

/// Exact-match route table. Adding a route under an existing key replaces it.
#[derive(Clone, Debug)]
pub struct Router<T: Route> {
    routes: HashMap<String, T>,
}

impl<T: Route> Default for Router<T> {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }
}

impl<T: Route> Router<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, route: T) {
        let key = route_key(route.method(), route.route());
        if self.routes.insert(key.clone(), route).is_some() {
            tracing::debug!(key = %key, "route replaced");
        }
    }

    pub fn match_route(&self, method: Method, route: &str) -> Option<&T> {
        self.routes.get(&route_key(method, route))
    }

    pub fn contains(&self, method: Method, route: &str) -> bool {
        self.routes.contains_key(&route_key(method, route))
    }

    pub fn routes(&self) -> impl Iterator<Item = &T> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Named {
        method: Method,
        route: String,
        tag: &'static str,
    }

    impl Route for Named {
        fn method(&self) -> Method {
            self.method
        }
        fn route(&self) -> &str {
            &self.route
        }
    }

    fn named(method: Method, route: &str, tag: &'static str) -> Named {
        Named {
            method,
            route: route.to_string(),
            tag,
        }
    }

    #[test]
    fn matches_exact_method_and_route() {
        let mut router = Router::new();
        router.add(named(Method::Get, "/a", "get-a"));
        router.add(named(Method::Post, "/a", "post-a"));

        assert_eq!(router.match_route(Method::Get, "/a").map(|r| r.tag), Some("get-a"));
        assert_eq!(router.match_route(Method::Post, "/a").map(|r| r.tag), Some("post-a"));
        assert!(router.match_route(Method::Put, "/a").is_none());
        assert!(router.match_route(Method::Get, "/a/").is_none());
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn last_registration_wins() {
        let mut router = Router::new();
        router.add(named(Method::Get, "/a", "first"));
        router.add(named(Method::Get, "/a", "second"));

        assert_eq!(router.len(), 1);
        assert_eq!(router.match_route(Method::Get, "/a").map(|r| r.tag), Some("second"));
    }

    #[test]
    fn key_format() {
        assert_eq!(route_key(Method::Delete, "/users"), "delete:/users");
    }
}
