//! Response builders returned by endpoint callbacks and the finished response they produce.

use super::Status;
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};

pub const TEXT_HTML: &str = "text/html";
pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_JSON: &str = "application/json";

#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Text(String),
    Bytes(Bytes),
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Text(s) => s.as_bytes(),
            Body::Bytes(b) => b,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(s) => Some(s),
            Body::Bytes(b) => std::str::from_utf8(b).ok(),
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Body::Text(s) => Bytes::from(s),
            Body::Bytes(b) => b,
        }
    }
}

/// Transport-neutral response: status, headers, content type and an optional body.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: Status,
    pub headers: HeaderMap,
    pub content_type: Option<String>,
    pub body: Option<Body>,
}

impl Response {
    pub fn body_text(&self) -> Option<&str> {
        self.body.as_ref().and_then(Body::as_text)
    }

    pub fn body_json(&self) -> Option<Value> {
        self.body
            .as_ref()
            .and_then(|b| serde_json::from_slice(b.as_bytes()).ok())
    }
}

/// Variant-specific part of a builder.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseKind {
    Common { content_type: String, body: Option<Body> },
    Text(Option<String>),
    /// `"<code> - <name>"`, suffixed with `": <message>"` when a message is set.
    Status(Option<String>),
    Json(Value),
    /// `{"status": code, "reason": name, "message": message}`.
    JsonStatus(Option<String>),
}

#[derive(Clone, Debug)]
pub struct ResponseBuilder {
    status: Status,
    headers: HeaderMap,
    kind: ResponseKind,
}

impl ResponseBuilder {
    pub fn common(status: Status, content_type: Option<&str>, body: Option<Body>) -> Self {
        Self::with_kind(
            status,
            ResponseKind::Common {
                content_type: content_type.unwrap_or(TEXT_HTML).to_string(),
                body,
            },
        )
    }

    pub fn text(body: impl Into<String>, status: Status) -> Self {
        Self::with_kind(status, ResponseKind::Text(Some(body.into())))
    }

    pub fn for_status(status: Status, message: Option<String>) -> Self {
        Self::with_kind(status, ResponseKind::Status(message))
    }

    pub fn json(body: Value, status: Status) -> Self {
        Self::with_kind(status, ResponseKind::Json(body))
    }

    pub fn json_status(status: Status, message: Option<String>) -> Self {
        Self::with_kind(status, ResponseKind::JsonStatus(message))
    }

    /// JSON with 204; the body is omitted when built.
    pub fn no_content() -> Self {
        Self::json(Value::Null, Status::NO_CONTENT)
    }

    fn with_kind(status: Status, kind: ResponseKind) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            kind,
        }
    }

    /// Adds a header; invalid names or values are skipped with a warning.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(header = %name, "dropping invalid response header"),
        }
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn kind(&self) -> &ResponseKind {
        &self.kind
    }

    pub fn content_type(&self) -> &str {
        match &self.kind {
            ResponseKind::Common { content_type, .. } => content_type,
            ResponseKind::Text(_) | ResponseKind::Status(_) => TEXT_PLAIN,
            ResponseKind::Json(_) | ResponseKind::JsonStatus(_) => APPLICATION_JSON,
        }
    }

    pub fn build(&self) -> Response {
        let body = match &self.kind {
            ResponseKind::Common { body, .. } => body.clone(),
            ResponseKind::Text(body) => Some(Body::Text(body.clone().unwrap_or_default())),
            ResponseKind::Status(message) => Some(Body::Text(match message {
                Some(m) if !m.is_empty() => format!("{}: {}", self.status, m),
                _ => self.status.to_string(),
            })),
            ResponseKind::Json(_) if self.status == Status::NO_CONTENT => None,
            ResponseKind::Json(value) => Some(Body::Text(value.to_string())),
            ResponseKind::JsonStatus(message) => {
                let mut body = json!({"status": self.status.code, "reason": self.status.name});
                if let Some(m) = message {
                    body["message"] = Value::String(m.clone());
                }
                Some(Body::Text(body.to_string()))
            }
        };
        Response {
            status: self.status,
            headers: self.headers.clone(),
            content_type: Some(self.content_type().to_string()),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_body_includes_optional_message() {
        let bare = ResponseBuilder::for_status(Status::NOT_FOUND, None).build();
        assert_eq!(bare.body_text(), Some("404 - Not Found"));
        assert_eq!(bare.content_type.as_deref(), Some(TEXT_PLAIN));

        let detailed = ResponseBuilder::for_status(Status::FORBIDDEN, Some("nope".into())).build();
        assert_eq!(detailed.body_text(), Some("403 - Forbidden: nope"));
    }

    #[test]
    fn json_status_body() {
        let response = ResponseBuilder::json_status(Status::BAD_REQUEST, Some("bad".into())).build();
        assert_eq!(
            response.body_json(),
            Some(json!({"status": 400, "reason": "Bad Request", "message": "bad"}))
        );
        let bare = ResponseBuilder::json_status(Status::INTERNAL_SERVER_ERROR, None).build();
        assert_eq!(
            bare.body_json(),
            Some(json!({"status": 500, "reason": "Internal Server Error"}))
        );
    }

    #[test]
    fn common_defaults_to_html() {
        let builder = ResponseBuilder::common(Status::OK, None, Some(Body::Text("<p/>".into())));
        assert_eq!(builder.content_type(), TEXT_HTML);
        let text = ResponseBuilder::text("", Status::OK).build();
        assert_eq!(text.body_text(), Some(""));
    }

    #[test]
    fn no_content_has_no_body() {
        let response = ResponseBuilder::no_content().build();
        assert_eq!(response.status, Status::NO_CONTENT);
        assert!(response.body.is_none());
    }

    #[test]
    fn headers_are_carried() {
        let response = ResponseBuilder::text("x", Status::OK)
            .with_header("x-trace", "abc")
            .with_header("bad header", "v")
            .build();
        assert_eq!(response.headers.get("x-trace").unwrap(), "abc");
        assert_eq!(response.headers.len(), 1);
    }
}
