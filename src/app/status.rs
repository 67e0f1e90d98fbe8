use serde::Serialize;
use std::fmt;

/// HTTP status paired with its reason phrase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Status {
    pub code: u16,
    pub name: &'static str,
}

impl Status {
    pub const OK: Status = Status::new(200, "Ok");
    pub const CREATED: Status = Status::new(201, "Created");
    pub const ACCEPTED: Status = Status::new(202, "Accepted");
    pub const NO_CONTENT: Status = Status::new(204, "No Content");
    pub const MOVED_PERMANENTLY: Status = Status::new(301, "Moved Permanently");
    pub const FOUND: Status = Status::new(302, "Found");
    pub const SEE_OTHER: Status = Status::new(303, "See Other");
    pub const NOT_MODIFIED: Status = Status::new(304, "Not Modified");
    pub const TEMPORARY_REDIRECT: Status = Status::new(307, "Temporary Redirect");
    pub const BAD_REQUEST: Status = Status::new(400, "Bad Request");
    pub const UNAUTHORIZED: Status = Status::new(401, "Unauthorized");
    pub const FORBIDDEN: Status = Status::new(403, "Forbidden");
    pub const NOT_FOUND: Status = Status::new(404, "Not Found");
    pub const METHOD_NOT_ALLOWED: Status = Status::new(405, "Method Not Allowed");
    pub const NOT_ACCEPTABLE: Status = Status::new(406, "Not Acceptable");
    pub const CONFLICT: Status = Status::new(409, "Conflict");
    pub const PRECONDITION_FAILED: Status = Status::new(412, "Precondition Failed");
    pub const PAYLOAD_TOO_LARGE: Status = Status::new(413, "Payload Too Large");
    pub const UNSUPPORTED_MEDIA_TYPE: Status = Status::new(415, "Unsupported Media Type");
    pub const INTERNAL_SERVER_ERROR: Status = Status::new(500, "Internal Server Error");
    pub const NOT_IMPLEMENTED: Status = Status::new(501, "Not Implemented");

    const KNOWN: [Status; 21] = [
        Status::OK,
        Status::CREATED,
        Status::ACCEPTED,
        Status::NO_CONTENT,
        Status::MOVED_PERMANENTLY,
        Status::FOUND,
        Status::SEE_OTHER,
        Status::NOT_MODIFIED,
        Status::TEMPORARY_REDIRECT,
        Status::BAD_REQUEST,
        Status::UNAUTHORIZED,
        Status::FORBIDDEN,
        Status::NOT_FOUND,
        Status::METHOD_NOT_ALLOWED,
        Status::NOT_ACCEPTABLE,
        Status::CONFLICT,
        Status::PRECONDITION_FAILED,
        Status::PAYLOAD_TOO_LARGE,
        Status::UNSUPPORTED_MEDIA_TYPE,
        Status::INTERNAL_SERVER_ERROR,
        Status::NOT_IMPLEMENTED,
    ];

    pub const fn new(code: u16, name: &'static str) -> Self {
        Status { code, name }
    }

    pub fn from_code(code: u16) -> Option<Status> {
        Self::KNOWN.iter().copied().find(|s| s.code == code)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code)
    }

    pub fn is_server_error(&self) -> bool {
        self.code >= 500
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.code, self.name)
    }
}

impl From<Status> for axum::http::StatusCode {
    fn from(status: Status) -> Self {
        axum::http::StatusCode::from_u16(status.code)
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}
