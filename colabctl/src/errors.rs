use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

use crate::api::models::bookings::BookingResponse;
use crate::bookings::BookingError;
use crate::runtime::ContainerError;
use crate::sessions::SessionError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Requested time slot intersects existing bookings
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        conflicts: Vec<BookingResponse>,
    },

    /// A scarce resource such as GPUs has run out
    #[error("No {resource} available")]
    ResourceExhausted { resource: String },

    /// Container runtime failure
    #[error(transparent)]
    Runtime(#[from] ContainerError),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::ResourceExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Runtime(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Conflict { .. } => "Time slot conflict".to_string(),
            Error::ResourceExhausted { resource } => format!("No {resource} available"),
            Error::Runtime(_) => "Container runtime error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Runtime(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::ResourceExhausted { .. } | Error::Conflict { .. } => {
                tracing::warn!("Request rejected: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = match &self {
            Error::Conflict { conflicts, .. } => json!({
                "error": self.user_message(),
                "conflicts": conflicts,
            }),
            _ => json!({ "error": self.user_message() }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<BookingError> for Error {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(message) => Error::BadRequest { message },
            BookingError::NotFound(id) => Error::NotFound {
                resource: "Booking".to_string(),
                id: id.to_string(),
            },
            BookingError::Conflict(bookings) => Error::Conflict {
                message: format!("Time slot conflicts with {} existing booking(s)", bookings.len()),
                conflicts: bookings.into_iter().map(Into::into).collect(),
            },
        }
    }
}

impl From<SessionError> for Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Validation(message) => Error::BadRequest { message },
            SessionError::NotFound(id) => Error::NotFound {
                resource: "Session".to_string(),
                id: id.to_string(),
            },
            SessionError::NotebookNotFound(id) => Error::NotFound {
                resource: "Notebook for session".to_string(),
                id: id.to_string(),
            },
            SessionError::ResourceExhausted(resource) => Error::ResourceExhausted {
                resource: resource.to_string(),
            },
            SessionError::Runtime(e) => Error::Runtime(e),
        }
    }
}

/// Malformed JSON bodies, missing fields and wrong field types are client errors
impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::BadRequest {
            message: rejection.body_text(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
