//! Error kinds raised while translating a request or normalizing a response.
//!
//! Every validation error is raised before the index engine is contacted, so
//! the engine never sees a request that is known to be malformed.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A time, geo, gap, or numeric parameter did not match its grammar or bounds.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Both ends of a range were given but the start comes after the end.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// A parameter needs another parameter that was not supplied.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// The requested time facet would produce more buckets than the hard cap.
    #[error("gap {gap} is too small for range {range} ({buckets} buckets, at most {max})")]
    GapTooSmall {
        gap: String,
        range: String,
        buckets: i64,
        max: i64,
    },

    /// The engine returned a document field whose value is neither a string nor a number.
    #[error("field {field} has unexpected value type {kind}")]
    UnexpectedFieldType { field: String, kind: &'static str },

    /// Writing a response body to its sink failed.
    #[error("output failed: {0}")]
    Io(#[from] std::io::Error),

    /// A server-side invariant broke; the request itself may be fine.
    #[error("internal error: {0}")]
    Internal(String),

    /// The index engine reported a failure or could not be reached.
    #[error("index engine error: {message}")]
    Engine {
        status: Option<u16>,
        message: String,
    },
}

impl QueryError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        QueryError::MalformedInput(msg.into())
    }

    pub fn engine(status: Option<u16>, msg: impl Into<String>) -> Self {
        QueryError::Engine {
            status,
            message: msg.into(),
        }
    }

    /// HTTP status reported to the client.
    ///
    /// Engine failures keep the engine's own status when it is a valid error
    /// status; anything else collapses to 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            QueryError::MalformedInput(_)
            | QueryError::InvalidRange(_)
            | QueryError::MissingDependency(_)
            | QueryError::GapTooSmall { .. } => StatusCode::BAD_REQUEST,
            QueryError::UnexpectedFieldType { .. }
            | QueryError::Io(_)
            | QueryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            QueryError::Engine { status, .. } => status
                .and_then(|code| StatusCode::from_u16(code).ok())
                .filter(|code| code.is_client_error() || code.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

/// JSON body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() || matches!(self, QueryError::Engine { .. }) {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_bad_requests() {
        let errors = [
            QueryError::malformed("q.geo"),
            QueryError::InvalidRange("[2 TO 1]".to_string()),
            QueryError::MissingDependency("distance sort needs q.geo".to_string()),
            QueryError::GapTooSmall {
                gap: "PT1S".to_string(),
                range: "[* TO *]".to_string(),
                buckets: 7_776_000,
                max: 1000,
            },
        ];
        for err in errors {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "{err}");
        }
    }

    #[test]
    fn test_unexpected_field_type_is_internal() {
        let err = QueryError::UnexpectedFieldType {
            field: "coord".to_string(),
            kind: "array",
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_server_side_failures_are_internal() {
        let io: QueryError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "client went away").into();
        assert_eq!(io.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(io.to_string(), "output failed: client went away");
        assert_eq!(
            QueryError::Internal("bad pattern".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_engine_status_is_preserved() {
        assert_eq!(
            QueryError::engine(Some(503), "down").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            QueryError::engine(Some(400), "undefined field").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            QueryError::engine(None, "connection refused").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        // A success code is never reported as a failure status.
        assert_eq!(
            QueryError::engine(Some(200), "odd").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
