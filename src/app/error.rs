//! Errors raised while digesting a request.
//!
//! `TraceableError` carries a name, a message and an optional cause chain. `RequestHandlingError`
//! additionally knows the HTTP status it should surface as. Anything else a callback returns is
//! `HandlerError::Unhandled` and gets traced by the owning App before reaching the error hook.

use super::Status;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// What caused a traceable error: a real error value or a plain description.
#[derive(Debug)]
pub enum Cause {
    Error(BoxError),
    Value(String),
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Error(e) => write!(f, "{}", e),
            Cause::Value(v) => f.write_str(v),
        }
    }
}

#[derive(Debug)]
pub struct TraceableError {
    name: String,
    message: String,
    cause: Option<Cause>,
}

impl TraceableError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(Cause::Error(cause.into()));
        self
    }

    pub fn with_cause_value(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(Cause::Value(cause.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    /// `name: message` followed by one `Caused by` line per link of the cause chain.
    pub fn to_full_string(&self) -> String {
        let mut out = format!("{}: {}", self.name, self.message);
        let Some(cause) = &self.cause else {
            return out;
        };
        out.push_str(&format!("\n\tCaused by {}", cause));
        if let Cause::Error(err) = cause {
            let mut source = err.source();
            while let Some(link) = source {
                out.push_str(&format!("\n\tCaused by {}", link));
                source = link.source();
            }
        }
        out
    }
}

impl fmt::Display for TraceableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl StdError for TraceableError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.cause {
            Some(Cause::Error(e)) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// A traceable error that maps onto an HTTP status. Its name is the status reason phrase.
#[derive(Debug)]
pub struct RequestHandlingError {
    status: Status,
    inner: TraceableError,
}

impl RequestHandlingError {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            inner: TraceableError::new(status.name, message),
        }
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.inner = self.inner.with_cause(cause);
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn message(&self) -> &str {
        self.inner.message()
    }

    pub fn to_full_string(&self) -> String {
        self.inner.to_full_string()
    }
}

impl fmt::Display for RequestHandlingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for RequestHandlingError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

/// The error an App hands to its error hook: always named, always traceable.
#[derive(Error, Debug)]
pub enum TracedError {
    #[error(transparent)]
    Traceable(TraceableError),
    #[error(transparent)]
    RequestHandling(RequestHandlingError),
}

impl TracedError {
    pub fn status(&self) -> Option<Status> {
        match self {
            TracedError::Traceable(_) => None,
            TracedError::RequestHandling(e) => Some(e.status()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TracedError::Traceable(e) => e.name(),
            TracedError::RequestHandling(e) => e.name(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            TracedError::Traceable(e) => e.message(),
            TracedError::RequestHandling(e) => e.message(),
        }
    }

    pub fn to_full_string(&self) -> String {
        match self {
            TracedError::Traceable(e) => e.to_full_string(),
            TracedError::RequestHandling(e) => e.to_full_string(),
        }
    }
}

/// Failure of an endpoint callback or hook.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Traceable(#[from] TraceableError),
    #[error(transparent)]
    RequestHandling(#[from] RequestHandlingError),
    #[error("{0}")]
    Unhandled(#[source] BoxError),
}

impl HandlerError {
    pub fn unhandled(err: impl Into<BoxError>) -> Self {
        HandlerError::Unhandled(err.into())
    }

    pub fn status(status: Status, message: impl Into<String>) -> Self {
        HandlerError::RequestHandling(RequestHandlingError::new(status, message))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::status(Status::BAD_REQUEST, message)
    }

    /// Normalises into a traced error; unhandled failures are wrapped under `origin`.
    pub fn trace(self, origin: &str) -> TracedError {
        match self {
            HandlerError::Traceable(e) => TracedError::Traceable(e),
            HandlerError::RequestHandling(e) => TracedError::RequestHandling(e),
            HandlerError::Unhandled(cause) => TracedError::Traceable(
                TraceableError::new(origin, "request digestion failed").with_cause(cause),
            ),
        }
    }
}

impl From<TracedError> for HandlerError {
    fn from(err: TracedError) -> Self {
        match err {
            TracedError::Traceable(e) => HandlerError::Traceable(e),
            TracedError::RequestHandling(e) => HandlerError::RequestHandling(e),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Unhandled(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("disk on fire")]
    struct Fire;

    #[derive(Debug, Error)]
    #[error("write failed")]
    struct WriteFailed(#[source] Fire);

    #[test]
    fn full_string_walks_cause_chain() {
        let err = TraceableError::new("Store", "cannot persist").with_cause(WriteFailed(Fire));
        assert_eq!(
            err.to_full_string(),
            "Store: cannot persist\n\tCaused by write failed\n\tCaused by disk on fire"
        );
        assert_eq!(err.to_string(), "Store: cannot persist");
    }

    #[test]
    fn request_handling_error_is_named_after_status() {
        let err = RequestHandlingError::new(Status::FORBIDDEN, "no access");
        assert_eq!(err.name(), "Forbidden");
        assert_eq!(err.to_string(), "Forbidden: no access");
    }

    #[test]
    fn unhandled_errors_are_traced_under_origin() {
        let traced = HandlerError::unhandled("boom").trace("/users");
        assert_eq!(traced.name(), "/users");
        assert_eq!(traced.message(), "request digestion failed");
        assert_eq!(traced.status(), None);
        assert!(traced.to_full_string().ends_with("Caused by boom"));
    }
}
