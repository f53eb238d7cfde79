// ============================
// crates/backend-lib/src/error.rs
// ============================
//! Central error type + Axum integration.
//!
//! Channel-level failures are the exception here: gateway errors never reach
//! this type (the pipeline degrades to an unknown ETA), and a single bad
//! message is answered with an `error` reply, not a close.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("User is not a participant of event {0}")]
    ParticipantNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Location sharing is disabled for event {0}")]
    LocationSharingDisabled(String),

    #[error("Coordinates out of range: ({lat}, {lng})")]
    InvalidCoordinates { lat: f64, lng: f64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error when it surfaces on a REST route.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::EventNotFound(_)
            | AppError::ParticipantNotFound(_)
            | AppError::UserNotFound(_) => StatusCode::NOT_FOUND,
            AppError::LocationSharingDisabled(_) => StatusCode::FORBIDDEN,
            AppError::InvalidCoordinates { .. } => StatusCode::BAD_REQUEST,
            AppError::Storage(_) | AppError::Json(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable code carried in `error` replies on the channel.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "auth_failed",
            AppError::EventNotFound(_) => "event_not_found",
            AppError::ParticipantNotFound(_) => "not_a_participant",
            AppError::UserNotFound(_) => "user_not_found",
            AppError::LocationSharingDisabled(_) => "location_sharing_disabled",
            AppError::InvalidCoordinates { .. } => "invalid_coordinates",
            AppError::Storage(_) => "storage_error",
            AppError::Json(_) => "malformed_message",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            AppError::Auth("bad token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::EventNotFound("evt".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::LocationSharingDisabled("evt".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::InvalidCoordinates { lat: 99.0, lng: 0.0 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_codes_are_wire_safe() {
        assert_eq!(
            AppError::ParticipantNotFound("evt".into()).error_code(),
            "not_a_participant"
        );
        assert_eq!(
            AppError::InvalidCoordinates { lat: 0.0, lng: 200.0 }.error_code(),
            "invalid_coordinates"
        );
    }

    #[test]
    fn into_response_uses_status() {
        let response = AppError::EventNotFound("evt-1".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
