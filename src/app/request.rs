//! Request head, decoded body and the lazy reader handed to endpoint callbacks.

use super::error::{HandlerError, RequestHandlingError};
use super::params::Params;
use super::Status;
use crate::router::Method;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::HeaderMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Streamed bodies are handed out in chunks of at most this many bytes.
pub const STREAM_CHUNK_SIZE: usize = 16 * 1024;

#[derive(Clone, Debug)]
pub struct RequestHead {
    /// Name of the App the request was dispatched to, once known.
    pub app_name: Option<String>,
    pub method: Method,
    /// Full request path as received.
    pub path: String,
    /// Path relative to the App; `None` when the dispatcher could not derive one.
    pub route: Option<String>,
    pub headers: HeaderMap,
    pub params: Params,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub content_encoding: Option<String>,
}

impl RequestHead {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            app_name: None,
            method,
            route: Some(path.clone()),
            path,
            headers: HeaderMap::new(),
            params: Params::new(),
            content_type: None,
            content_length: None,
            content_encoding: None,
        }
    }

    pub fn with_route(mut self, route: Option<String>) -> Self {
        self.route = route;
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Media type without parameters, lowercased (`application/json; charset=utf-8` -> `application/json`).
    pub fn media_type(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
    }
}

/// Body decoded according to the content type. `body` holds the raw bytes whenever one was read.
#[derive(Clone, Debug, Default)]
pub struct RequestBody {
    pub body: Option<Bytes>,
    pub text: Option<String>,
    pub json: Option<Value>,
    pub form: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct Request {
    pub head: RequestHead,
    pub body: RequestBody,
}

/// Transforms a fully read request before the callback sees it.
pub type BeforeHook = Arc<dyn Fn(Request) -> Request + Send + Sync>;

/// Head available up front; the body is only consumed when a callback asks for it.
#[async_trait]
pub trait RequestReader: Send + Sync {
    fn head(&self) -> &RequestHead;

    fn has_body(&self) -> bool;

    async fn read(&self) -> Result<Request, HandlerError>;

    async fn stream(&self, on_chunk: &mut (dyn FnMut(Bytes) + Send)) -> Result<(), HandlerError>;
}

pub type SharedRequestReader = Arc<dyn RequestReader>;

/// Reader over a body that was already collected by the transport.
pub struct BufferedRequestReader {
    head: RequestHead,
    body: Bytes,
    before: Vec<BeforeHook>,
}

impl BufferedRequestReader {
    pub fn new(head: RequestHead) -> Self {
        Self {
            head,
            body: Bytes::new(),
            before: Vec::new(),
        }
    }

    /// Sets the raw body; content length defaults to its size.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        if self.head.content_length.is_none() {
            self.head.content_length = Some(self.body.len() as u64);
        }
        self
    }

    /// JSON body with a matching content type.
    pub fn with_json(mut self, value: &Value) -> Self {
        self.head.content_type = Some("application/json".into());
        self.with_body(value.to_string())
    }

    pub fn with_before_hooks(mut self, hooks: Vec<BeforeHook>) -> Self {
        self.before = hooks;
        self
    }

    pub fn shared(self) -> SharedRequestReader {
        Arc::new(self)
    }

    fn decode(&self) -> Result<RequestBody, HandlerError> {
        let mut decoded = RequestBody::default();
        let length = self.head.content_length.unwrap_or(0);
        let Some(media_type) = self.head.media_type() else {
            return Ok(decoded);
        };
        if length == 0 || self.body.is_empty() {
            return Ok(decoded);
        }
        match media_type.as_str() {
            "application/json" => {
                let json = serde_json::from_slice(&self.body).map_err(|e| {
                    RequestHandlingError::new(Status::BAD_REQUEST, "invalid JSON body").with_cause(e)
                })?;
                decoded.json = Some(json);
            }
            "application/x-www-form-urlencoded" => {
                let mut form = Map::new();
                for (key, value) in url::form_urlencoded::parse(&self.body) {
                    form.entry(key.into_owned())
                        .or_insert_with(|| Value::String(value.into_owned()));
                }
                decoded.form = Some(Value::Object(form));
            }
            t if t.starts_with("text/") => {
                decoded.text = Some(String::from_utf8_lossy(&self.body).into_owned());
            }
            _ => {}
        }
        decoded.body = Some(self.body.clone());
        Ok(decoded)
    }
}

#[async_trait]
impl RequestReader for BufferedRequestReader {
    fn head(&self) -> &RequestHead {
        &self.head
    }

    fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    async fn read(&self) -> Result<Request, HandlerError> {
        let body = self.decode()?;
        let request = Request {
            head: self.head.clone(),
            body,
        };
        Ok(self.before.iter().fold(request, |request, hook| hook(request)))
    }

    async fn stream(&self, on_chunk: &mut (dyn FnMut(Bytes) + Send)) -> Result<(), HandlerError> {
        let mut offset = 0;
        while offset < self.body.len() {
            let end = (offset + STREAM_CHUNK_SIZE).min(self.body.len());
            on_chunk(self.body.slice(offset..end));
            offset = end;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(content_type: &str, body: &'static str) -> BufferedRequestReader {
        BufferedRequestReader::new(RequestHead::new(Method::Post, "/").with_content_type(content_type))
            .with_body(body)
    }

    #[tokio::test]
    async fn decodes_json_body() {
        let request = post("application/json; charset=utf-8", r#"{"a":1}"#).read().await.unwrap();
        assert_eq!(request.body.json, Some(json!({"a": 1})));
        assert!(request.body.body.is_some());
        assert!(request.body.text.is_none());
    }

    #[tokio::test]
    async fn invalid_json_is_a_bad_request() {
        let err = post("application/json", "{nope").read().await.unwrap_err();
        match err {
            HandlerError::RequestHandling(e) => assert_eq!(e.status(), Status::BAD_REQUEST),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn decodes_form_and_text() {
        let form = post("application/x-www-form-urlencoded", "name=Beta&age=17").read().await.unwrap();
        assert_eq!(form.body.form, Some(json!({"name": "Beta", "age": "17"})));

        let text = post("text/plain", "hello").read().await.unwrap();
        assert_eq!(text.body.text.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn missing_content_type_reads_nothing() {
        let reader = BufferedRequestReader::new(RequestHead::new(Method::Post, "/")).with_body("raw");
        let request = reader.read().await.unwrap();
        assert!(request.body.body.is_none());
        assert!(request.body.json.is_none());
    }

    #[tokio::test]
    async fn before_hooks_run_in_order() {
        let hook: BeforeHook = Arc::new(|mut request: Request| {
            request.head.params.insert("seen".into(), json!(true));
            request
        });
        let request = post("text/plain", "x").with_before_hooks(vec![hook]).read().await.unwrap();
        assert_eq!(request.head.params.get("seen"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn streams_in_chunks() {
        let body = vec![7u8; STREAM_CHUNK_SIZE + 10];
        let reader = BufferedRequestReader::new(RequestHead::new(Method::Post, "/")).with_body(body);
        let mut sizes = Vec::new();
        reader.stream(&mut |chunk: Bytes| sizes.push(chunk.len())).await.unwrap();
        assert_eq!(sizes, vec![STREAM_CHUNK_SIZE, 10]);
    }
}
