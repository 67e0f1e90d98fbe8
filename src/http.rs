//! axum transport for a [`Server`]: every request not claimed by another route is converted into
//! a buffered request and dispatched; the built response is converted back.

use crate::app::{parse_params, RequestHead, Response, ResponseBuilder, Status};
use crate::config::Settings;
use crate::router::Method;
use crate::server::Server;
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use axum::{routing::get, Json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

fn header_text(headers: &HeaderMap, name: axum::http::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Request head from the transport's request parts.
pub fn request_head(parts: &axum::http::request::Parts) -> Result<RequestHead, Status> {
    let method = Method::try_from(&parts.method).map_err(|_| Status::METHOD_NOT_ALLOWED)?;
    let mut head = RequestHead::new(method, parts.uri.path())
        .with_params(parse_params(parts.uri.query().unwrap_or("")));
    head.content_type = header_text(&parts.headers, CONTENT_TYPE);
    head.content_length = header_text(&parts.headers, CONTENT_LENGTH).and_then(|v| v.parse().ok());
    head.content_encoding = header_text(&parts.headers, CONTENT_ENCODING);
    head.headers = parts.headers.clone();
    Ok(head)
}

pub fn into_axum_response(response: Response) -> axum::response::Response {
    let body = response
        .body
        .map(|b| axum::body::Body::from(b.into_bytes()))
        .unwrap_or_else(axum::body::Body::empty);
    let mut out = axum::response::Response::new(body);
    *out.status_mut() = response.status.into();
    *out.headers_mut() = response.headers;
    if let Some(content_type) = response.content_type {
        match HeaderValue::from_str(&content_type) {
            Ok(value) => {
                out.headers_mut().insert(CONTENT_TYPE, value);
            }
            Err(_) => tracing::warn!(content_type = %content_type, "dropping invalid content type"),
        }
    }
    out
}

async fn dispatch(server: Arc<Server>, request: axum::extract::Request, body_limit: usize) -> axum::response::Response {
    let (parts, body) = request.into_parts();
    let head = match request_head(&parts) {
        Ok(head) => head,
        Err(status) => return into_axum_response(ResponseBuilder::json_status(status, None).build()),
    };
    let body = match axum::body::to_bytes(body, body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, path = %head.path, "request body rejected");
            return into_axum_response(ResponseBuilder::json_status(Status::PAYLOAD_TOO_LARGE, None).build());
        }
    };
    into_axum_response(server.handle(head, body).await)
}

/// axum router serving `server` for every path, bodies capped at `settings.body_limit`.
pub fn router(server: Arc<Server>, settings: &Settings) -> axum::Router {
    let body_limit = settings.body_limit;
    axum::Router::new()
        .fallback(move |request: axum::extract::Request| dispatch(server.clone(), request, body_limit))
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(body_limit)))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health, GET /version.
pub fn common_routes() -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}
