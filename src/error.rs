use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::config::ConfigError;

/// Host-side error taxonomy.
///
/// Every variant is terminal for the operation that raised it; nothing here is
/// retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Input failed the sanitize + allow-list gate. No network call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A caller handed the room API client a value that does not satisfy its
    /// preconditions. Nothing was sent.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Connection failure, DNS failure or request timeout.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server replied with something that is not the agreed envelope.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server explicitly declined the request (`success: false`).
    #[error("Room rejected: {0}")]
    RoomRejected(String),

    /// A navigation or bridge message failed the content policy.
    #[error("Bridge violation: {0}")]
    BridgeViolation(String),

    #[error("Invalid state: cannot {action} while {state}")]
    InvalidState {
        state: &'static str,
        action: &'static str,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Stable, serializable classification of [`AppError`] for UI consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InvalidInput,
    Transport,
    Protocol,
    RoomRejected,
    BridgeViolation,
    InvalidState,
    Storage,
    Config,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::InvalidInput(_) => ErrorKind::InvalidInput,
            AppError::Transport(_) => ErrorKind::Transport,
            AppError::Protocol(_) => ErrorKind::Protocol,
            AppError::RoomRejected(_) => ErrorKind::RoomRejected,
            AppError::BridgeViolation(_) => ErrorKind::BridgeViolation,
            AppError::InvalidState { .. } => ErrorKind::InvalidState,
            AppError::Storage(_) => ErrorKind::Storage,
            AppError::Config(_) => ErrorKind::Config,
        }
    }

    /// Text shown to the user when this error ends an operation.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::RoomRejected(msg)
            | AppError::BridgeViolation(msg) => msg.clone(),
            AppError::Transport(msg) => format!("Network error: {}", msg),
            AppError::Protocol(_) => "Unexpected reply from the room server".to_string(),
            AppError::InvalidState { .. } => "Please wait for the current request".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Transport(format!("request timed out: {}", err))
        } else {
            AppError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Protocol(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Errors returned by the development room server.
///
/// Rendered as the same `{success: false, message}` envelope the production
/// room API uses, so the client exercises identical parsing paths.
#[derive(Debug, thiserror::Error)]
pub enum DevApiError {
    #[error("Authorization required")]
    Unauthorized,

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),
}

impl IntoResponse for DevApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            DevApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            DevApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            DevApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DevApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            DevApiError::NotFound(_) => StatusCode::NOT_FOUND,
            DevApiError::Conflict(_) => StatusCode::CONFLICT,
        };

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_passes_rejection_reason_through() {
        let err = AppError::RoomRejected("Room not found".to_string());
        assert_eq!(err.user_message(), "Room not found");
        assert_eq!(err.kind(), ErrorKind::RoomRejected);
    }

    #[test]
    fn test_protocol_error_hides_details_from_user() {
        let err = AppError::Protocol("expected value at line 1".to_string());
        assert_eq!(err.user_message(), "Unexpected reply from the room server");
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::BridgeViolation).unwrap();
        assert_eq!(json, "\"bridge_violation\"");
    }

    #[test]
    fn test_dev_api_error_status() {
        let response = DevApiError::Conflict("taken".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = DevApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
