use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

use crate::archive::ArchiveError;
use crate::store::StoreError;

pub const MIGRATION_HINT: &str = "Run migrations/001_kiosk_schema.sql against the database \
                                  or start the server with KIOSK_RUN_MIGRATIONS=true.";

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

/// Error body returned by every handler: `{"kind": "...", "error": "..."}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum Error {
    NotFound {
        #[serde(rename = "error")]
        message: String,
    },
    InvalidPayload {
        #[serde(rename = "error")]
        message: String,
    },
    AlreadySignedOut {
        #[serde(rename = "error")]
        message: String,
    },
    AuthenticationFailure {
        #[serde(rename = "error")]
        message: String,
    },
    SetupRequired {
        #[serde(rename = "error")]
        message: String,
    },
    InternalError {
        source: &'static str,
        #[serde(rename = "error")]
        message: String,
    },
    Unknown {
        #[serde(rename = "error")]
        message: String,
    },
}

impl Error {
    pub fn unknown<S: Into<String>>(msg: S) -> Error {
        Error::Unknown {
            message: msg.into(),
        }
    }

    pub fn invalid<S: Into<String>>(msg: S) -> Error {
        Error::InvalidPayload {
            message: msg.into(),
        }
    }

    pub fn setup_required<S: AsRef<str>>(cause: S) -> Error {
        Error::SetupRequired {
            message: format!("{}. {}", cause.as_ref(), MIGRATION_HINT),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidPayload { .. } | Error::AlreadySignedOut { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::AuthenticationFailure { .. } => StatusCode::UNAUTHORIZED,
            Error::SetupRequired { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::InternalError { .. } | Error::Unknown { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingRelation(cause) => Error::setup_required(cause),
            other => Self::InternalError {
                source: "DatabaseError",
                message: other.to_string(),
            },
        }
    }
}

impl From<ArchiveError> for Error {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::MissingTable(cause) => Error::setup_required(cause),
            ArchiveError::Failed(message) => Self::InternalError {
                source: "ArchiveError",
                message,
            },
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::InternalError {
            source: "PasswordHashError",
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError {
            source: "SerializationError",
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Unknown {
            message: err.to_string(),
        }
    }
}
