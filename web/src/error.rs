//! Error types for web handlers.
//!
//! [`AppError`] carries the HTTP status, a stable machine-readable code and a
//! user-facing message. Every [`BookingError`] kind maps onto exactly one status:
//!
//! | Kind | Status | Code |
//! |---|---|---|
//! | `Validation` | 422 | `VALIDATION_ERROR` |
//! | `Conflict` | 409 | `CONFLICT` |
//! | `InvalidState` | 409 | `INVALID_STATE` |
//! | `Timeout` | 408 | `TIMEOUT` |
//! | `Authorization` | 403 | `FORBIDDEN` |
//! | `NotFound` | 404 | `NOT_FOUND` |
//! | `Internal` | 500 | `INTERNAL_SERVER_ERROR` |
//!
//! Bodies, paths and query strings that fail to deserialize are validation
//! errors too, reported with the offending field where serde names one.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use roaman_core::error::{BookingError, FieldError};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Booking>, AppError> {
///     let booking = state.engine.lookup(&reference).await?;
///     Ok(Json(booking))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
    fields: Vec<FieldError>,
    retryable: bool,
    /// Logged, never sent to the client.
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            fields: Vec::new(),
            retryable: false,
            source: None,
        }
    }

    /// Attach an internal error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{resource} {id} not found"),
        )
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            message,
        )
    }

    /// 503 Service Unavailable.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Client-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let retryable = err.is_retryable();
        let mut app = match &err {
            BookingError::Validation(fields) => {
                let mut app = Self::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "VALIDATION_ERROR",
                    err.to_string(),
                );
                app.fields.clone_from(fields);
                app
            }
            BookingError::Conflict { .. } => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", err.to_string())
            }
            BookingError::InvalidState { .. } => {
                Self::new(StatusCode::CONFLICT, "INVALID_STATE", err.to_string())
            }
            BookingError::Timeout(_) => {
                Self::new(StatusCode::REQUEST_TIMEOUT, "TIMEOUT", err.to_string())
            }
            BookingError::Authorization(_) => {
                Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", err.to_string())
            }
            BookingError::NotFound { .. } => {
                Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
            }
            BookingError::Internal(_) => {
                Self::internal("An internal error occurred")
                    .with_source(anyhow::Error::new(err.clone()))
            }
        };
        app.retryable = retryable;
        app
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => {
                let detail = deserialize_detail(&err.body_text());
                let field = field_of(&detail).unwrap_or("body").to_string();
                BookingError::invalid(field, detail).into()
            }
            JsonRejection::JsonSyntaxError(_) => {
                BookingError::invalid("body", "must be valid JSON").into()
            }
            JsonRejection::MissingJsonContentType(_) => {
                BookingError::invalid("content-type", "must be application/json").into()
            }
            other => Self::new(other.status(), "BAD_REQUEST", other.body_text()),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::FailedToDeserializePathParams(err) => {
                let detail = deserialize_detail(&err.body_text());
                BookingError::invalid("path", detail).into()
            }
            other => Self::internal(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        let detail = deserialize_detail(&rejection.body_text());
        let field = field_of(&detail).unwrap_or("query").to_string();
        BookingError::invalid(field, detail).into()
    }
}

/// Drop axum's "Failed to deserialize ...: " prefix.
fn deserialize_detail(body_text: &str) -> String {
    body_text
        .split_once(": ")
        .filter(|(prefix, _)| prefix.starts_with("Failed to deserialize"))
        .map_or(body_text, |(_, detail)| detail)
        .to_string()
}

/// Field named by a serde error: ``missing field `x` `` or a `path: ...` prefix.
fn field_of(detail: &str) -> Option<&str> {
    if let Some(rest) = detail.split_once("missing field `").map(|(_, rest)| rest) {
        return rest.split_once('`').map(|(field, _)| field);
    }
    detail
        .split_once(": ")
        .map(|(path, _)| path)
        .filter(|path| !path.is_empty() && *path != "." && !path.contains(' '))
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldError>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            fields: self.fields,
            retryable: self.retryable,
        };
        (self.status, Json(body)).into_response()
    }
}
