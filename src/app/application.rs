use super::endpoint::{Endpoint, EndpointCallback, EndpointsProvider, EndpointsResolver};
use super::error::{HandlerError, TracedError};
use super::request::{RequestHead, SharedRequestReader};
use super::response::ResponseBuilder;
use super::Status;
use crate::router::{Method, Router};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// Hook invoked with the request and the traced error raised while digesting it.
#[derive(Clone)]
pub struct ErrorCallback(
    Arc<dyn Fn(SharedRequestReader, TracedError) -> BoxFuture<'static, Result<ResponseBuilder, HandlerError>> + Send + Sync>,
);

impl ErrorCallback {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(SharedRequestReader, TracedError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResponseBuilder, HandlerError>> + Send + 'static,
    {
        Self(Arc::new(move |reader, error| Box::pin(callback(reader, error))))
    }

    pub fn call(
        &self,
        reader: SharedRequestReader,
        error: TracedError,
    ) -> BoxFuture<'static, Result<ResponseBuilder, HandlerError>> {
        (self.0)(reader, error)
    }
}

/// Named collection of endpoints with replaceable not-found and error hooks.
///
/// Endpoints are registered through `&mut self` while the App is being set up; hooks can be swapped
/// through `&self` at any time and each request uses whichever hook is installed when it arrives.
pub struct App {
    name: String,
    router: Router<Endpoint>,
    not_found: RwLock<Option<EndpointCallback>>,
    on_error: RwLock<Option<ErrorCallback>>,
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            router: Router::new(),
            not_found: RwLock::new(None),
            on_error: RwLock::new(None),
        }
    }

    /// `None` restores the default not-found response.
    pub fn set_not_found_callback(&self, callback: Option<EndpointCallback>) -> &Self {
        *self.not_found.write().unwrap_or_else(PoisonError::into_inner) = callback;
        self
    }

    /// `None` restores the default error response.
    pub fn set_request_handling_error_callback(&self, callback: Option<ErrorCallback>) -> &Self {
        *self.on_error.write().unwrap_or_else(PoisonError::into_inner) = callback;
        self
    }

    pub fn get_endpoint(&self, head: &RequestHead) -> Option<&Endpoint> {
        let route = head.route.as_deref()?;
        self.router.match_route(head.method, route)
    }

    fn not_found_callback(&self) -> Option<EndpointCallback> {
        self.not_found.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn error_callback(&self) -> Option<ErrorCallback> {
        self.on_error.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn digest(&self, reader: SharedRequestReader) -> Result<ResponseBuilder, HandlerError> {
        match self.get_endpoint(reader.head()) {
            Some(endpoint) => {
                tracing::debug!(app = %self.name, method = %endpoint.method, route = %endpoint.route, "endpoint matched");
                endpoint.callback.call(reader).await
            }
            None => {
                tracing::debug!(app = %self.name, path = %reader.head().path, "no endpoint matched");
                match self.not_found_callback() {
                    Some(callback) => callback.call(reader).await,
                    None => Ok(default_not_found_response(reader.head())),
                }
            }
        }
    }

    /// Digests the request; any failure is traced and handed to the error hook.
    /// Only a failure of the error hook itself escapes.
    pub async fn resolve(&self, reader: SharedRequestReader) -> Result<ResponseBuilder, HandlerError> {
        match self.digest(reader.clone()).await {
            Ok(builder) => Ok(builder),
            Err(error) => {
                let traced = error.trace(&self.name);
                match self.error_callback() {
                    Some(callback) => callback.call(reader, traced).await,
                    None => Ok(default_error_response(&traced)),
                }
            }
        }
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("name", &self.name)
            .field("endpoints", &self.router.len())
            .finish()
    }
}

/// 404 JSON status naming the path that was not found.
pub fn default_not_found_response(head: &RequestHead) -> ResponseBuilder {
    ResponseBuilder::json_status(Status::NOT_FOUND, Some(head.path.clone()))
}

/// JSON status for a traced error. Server errors expose no message to the client.
pub fn default_error_response(error: &TracedError) -> ResponseBuilder {
    let status = error.status().unwrap_or(Status::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %error.to_full_string(), "request handling failed");
        ResponseBuilder::json_status(status, None)
    } else {
        tracing::debug!(error = %error, "request rejected");
        ResponseBuilder::json_status(status, Some(error.message().to_string()))
    }
}

impl EndpointsProvider for App {
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

#[async_trait]
impl EndpointsResolver for App {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, reader: SharedRequestReader) -> Result<ResponseBuilder, HandlerError> {
        App::resolve(self, reader).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{BufferedRequestReader, RequestHandlingError};
    use serde_json::json;

    fn request(method: Method, route: Option<&str>) -> SharedRequestReader {
        BufferedRequestReader::new(
            RequestHead::new(method, "/users/list").with_route(route.map(str::to_string)),
        )
        .shared()
    }

    fn text(body: &'static str) -> EndpointCallback {
        EndpointCallback::new(move |_| async move { Ok(ResponseBuilder::text(body, Status::OK)) })
    }

    #[tokio::test]
    async fn dispatches_to_exact_endpoint() {
        let mut app = App::new("/users");
        app.add_endpoint(Endpoint::new(Method::Get, "/list", text("get")));
        app.add_endpoint(Endpoint::new(Method::Post, "/list", text("post")));

        let response = app.resolve(request(Method::Post, Some("/list"))).await.unwrap().build();
        assert_eq!(response.body_text(), Some("post"));
    }

    #[tokio::test]
    async fn later_endpoint_replaces_earlier() {
        let mut app = App::new("/users");
        app.add_endpoint(Endpoint::new(Method::Get, "/list", text("old")));
        app.add_endpoint(Endpoint::new(Method::Get, "/list", text("new")));

        let response = app.resolve(request(Method::Get, Some("/list"))).await.unwrap().build();
        assert_eq!(response.body_text(), Some("new"));
        assert_eq!(app.endpoints().len(), 1);
    }

    #[tokio::test]
    async fn missing_route_is_not_found() {
        let mut app = App::new("/users");
        app.add_endpoint(Endpoint::new(Method::Get, "/list", text("get")));

        let response = app.resolve(request(Method::Get, None)).await.unwrap().build();
        assert_eq!(response.status, Status::NOT_FOUND);
        assert_eq!(
            response.body_json(),
            Some(json!({"status": 404, "reason": "Not Found", "message": "/users/list"}))
        );

        let response = app.resolve(request(Method::Delete, Some("/list"))).await.unwrap().build();
        assert_eq!(response.status, Status::NOT_FOUND);
    }

    #[tokio::test]
    async fn failing_callback_becomes_internal_error() {
        let mut app = App::new("/users");
        app.endpoint(Method::Get, "/list", |_| async { Err(HandlerError::unhandled("db down")) });

        let response = app.resolve(request(Method::Get, Some("/list"))).await.unwrap().build();
        assert_eq!(response.status, Status::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.body_json(),
            Some(json!({"status": 500, "reason": "Internal Server Error"}))
        );
    }

    #[tokio::test]
    async fn client_errors_keep_their_status_and_message() {
        let mut app = App::new("/users");
        app.endpoint(Method::Get, "/list", |_| async {
            Err(RequestHandlingError::new(Status::FORBIDDEN, "members only").into())
        });

        let response = app.resolve(request(Method::Get, Some("/list"))).await.unwrap().build();
        assert_eq!(response.status, Status::FORBIDDEN);
        assert_eq!(response.body_json().unwrap()["message"], "members only");
    }

    #[tokio::test]
    async fn custom_error_hook_output_is_used_verbatim() {
        let mut app = App::new("/users");
        app.endpoint(Method::Get, "/list", |_| async { Err(HandlerError::unhandled("boom")) });
        app.set_request_handling_error_callback(Some(ErrorCallback::new(|_, error: TracedError| async move {
            Ok(ResponseBuilder::text(format!("handled {}", error.name()), Status::ACCEPTED))
        })));

        let response = app.resolve(request(Method::Get, Some("/list"))).await.unwrap().build();
        assert_eq!(response.status, Status::ACCEPTED);
        assert_eq!(response.body_text(), Some("handled /users"));
    }

    #[tokio::test]
    async fn not_found_hook_failure_reaches_error_hook() {
        let app = App::new("/users");
        app.set_not_found_callback(Some(EndpointCallback::new(|_| async {
            Err(HandlerError::bad_request("unknown route"))
        })));

        let response = app.resolve(request(Method::Get, Some("/nope"))).await.unwrap().build();
        assert_eq!(response.status, Status::BAD_REQUEST);
    }

    #[tokio::test]
    async fn error_hook_failure_propagates() {
        let mut app = App::new("/users");
        app.endpoint(Method::Get, "/list", |_| async { Err(HandlerError::unhandled("first")) });
        app.set_request_handling_error_callback(Some(ErrorCallback::new(|_, _| async {
            Err(HandlerError::unhandled("second"))
        })));

        let err = app.resolve(request(Method::Get, Some("/list"))).await.unwrap_err();
        assert_eq!(err.to_string(), "second");
    }

    #[tokio::test]
    async fn hooks_can_be_reset_to_defaults() {
        let app = App::new("/users");
        app.set_not_found_callback(Some(text("custom")));
        app.set_not_found_callback(None);

        let response = app.resolve(request(Method::Get, Some("/x"))).await.unwrap().build();
        assert_eq!(response.status, Status::NOT_FOUND);
    }
}
