// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payment gateway error: {message}")]
    Gateway { message: String, retryable: bool },

    #[error("{entity} {id} is {actual}, expected {expected}")]
    StateConflict {
        entity: &'static str,
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unauthorized access")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation failed"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            AppError::Gateway { retryable: true, .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "Payment gateway unavailable")
            }
            AppError::Gateway { .. } => (StatusCode::BAD_GATEWAY, "Payment gateway error"),
            AppError::StateConflict { .. } => (StatusCode::CONFLICT, "State conflict"),
            AppError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            AppError::Configuration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error")
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized access"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
            "retryable": self.is_retryable(),
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}

impl From<bson::ser::Error> for AppError {
    fn from(err: bson::ser::Error) -> Self {
        AppError::Persistence(format!("BSON conversion failed: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let retryable = err.is_timeout()
            || err.is_connect()
            || err.is_request()
            || err.status().map(|s| s.is_server_error()).unwrap_or(false);
        AppError::Gateway {
            message: format!("HTTP request failed: {}", err),
            retryable,
        }
    }
}

// Helper conversion functions
impl AppError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn gateway(msg: impl Into<String>, retryable: bool) -> Self {
        AppError::Gateway {
            message: msg.into(),
            retryable,
        }
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        AppError::Persistence(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::Configuration(msg.into())
    }

    /// Only gateway failures are worth re-polling; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Gateway { retryable: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_retryable_gateway_errors_are_retryable() {
        assert!(AppError::gateway("timeout", true).is_retryable());
        assert!(!AppError::gateway("declined token", false).is_retryable());
        assert!(!AppError::invalid_data("bad").is_retryable());
        assert!(!AppError::persistence("down").is_retryable());
    }

    #[test]
    fn state_conflict_message_names_both_states() {
        let err = AppError::StateConflict {
            entity: "order",
            id: "abc".to_string(),
            expected: "ReadyForDelivery".to_string(),
            actual: "Pending".to_string(),
        };
        assert_eq!(err.to_string(), "order abc is Pending, expected ReadyForDelivery");
    }

    #[test]
    fn error_statuses_map_to_http_codes() {
        assert_eq!(
            AppError::invalid_data("x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::not_found("x").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::gateway("x", true).into_response().status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::gateway("x", false).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
