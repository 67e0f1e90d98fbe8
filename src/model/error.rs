use super::controller::CrudMethod;
use super::query::QueryError;
use crate::app::{HandlerError, RequestHandlingError, Status, TraceableError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("the provided model is invalid for {method}: {reason}")]
    InvalidModel { method: CrudMethod, reason: String },
    #[error("model mapping failed: {0}")]
    Mapping(String),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("incompatible document: {0}")]
    Incompatible(String),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("cursor is closed")]
    CursorClosed,
    #[error("transaction {0}")]
    Transaction(&'static str),
    #[error("store: {0}")]
    Store(String),
}

impl ModelError {
    pub fn invalid(method: CrudMethod, reason: impl Into<String>) -> Self {
        ModelError::InvalidModel {
            method,
            reason: reason.into(),
        }
    }
}

/// Invalid models and queries are client errors, mapping failures are server errors and
/// everything else is traced as an endpoint resolution failure.
impl From<ModelError> for HandlerError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidModel { .. } | ModelError::Query(_) => {
                HandlerError::RequestHandling(RequestHandlingError::new(Status::BAD_REQUEST, err.to_string()))
            }
            ModelError::Conflict(_) => {
                HandlerError::RequestHandling(RequestHandlingError::new(Status::CONFLICT, err.to_string()))
            }
            ModelError::Mapping(_) => HandlerError::RequestHandling(
                RequestHandlingError::new(Status::INTERNAL_SERVER_ERROR, "model mapping failed").with_cause(err),
            ),
            other => HandlerError::Traceable(
                TraceableError::new("ModelService", "endpoint resolution error").with_cause(other),
            ),
        }
    }
}
