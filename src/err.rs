use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

use crate::auth::SessionError;

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

/// A single failed field from the student validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct ErrorBody<'a> {
    error: String,
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [FieldError]>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("{message}")]
    InvalidPayload { message: String },
    #[error("Username and password are required")]
    MissingCredentials,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Validation failed")]
    Validation { errors: Vec<FieldError> },
    #[error("Email must be unique")]
    DuplicateEmail,
    #[error(transparent)]
    Unauthorized(#[from] SessionError),
    #[error("{message}")]
    NotFound { message: String },
    #[error("{kind}: {message}")]
    InternalError { kind: &'static str, message: String },
    #[error("Internal server error during authentication: {message}")]
    AuthInternal { message: String },
}

impl Error {
    pub fn student_not_found() -> Error {
        Error::NotFound {
            message: "Student not found".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidPayload { .. }
            | Error::MissingCredentials
            | Error::Validation { .. }
            | Error::DuplicateEmail => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials | Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InternalError { .. } | Error::AuthInternal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidPayload { .. } => "INVALID_PAYLOAD",
            Error::MissingCredentials => "MISSING_CREDENTIALS",
            Error::InvalidCredentials => "INVALID_CREDENTIALS",
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::DuplicateEmail => "DUPLICATE_EMAIL",
            Error::Unauthorized(reason) => reason.code(),
            Error::NotFound { .. } => "NOT_FOUND",
            Error::InternalError { .. } => "INTERNAL_ERROR",
            Error::AuthInternal { .. } => "AUTH_INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // internal detail stays in the log
        let error = match &self {
            Error::InternalError { .. } => {
                log::error!("{}", self);
                "Internal server error".to_string()
            }
            Error::AuthInternal { .. } => {
                log::error!("{}", self);
                "Internal server error during authentication".to_string()
            }
            other => other.to_string(),
        };
        let errors = match &self {
            Error::Validation { errors } => Some(errors.as_slice()),
            _ => None,
        };
        let body = ErrorBody {
            error,
            code: self.code(),
            errors,
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::InternalError {
            kind: "IOError",
            message: io.to_string(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::InternalError {
            kind: "DatabaseError",
            message: err.to_string(),
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::InternalError {
            kind: "PasswordHashError",
            message: err.to_string(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::InternalError {
            kind: "TokenError",
            message: err.to_string(),
        }
    }
}
