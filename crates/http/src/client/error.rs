//! Client error types
//!
//! Every variant renders as one user-readable sentence, so callers can show
//! `error.to_string()` without looking at status codes.

use crate::session::StorageError;
use reqwest::StatusCode;
use thiserror::Error;

pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";
pub const UNAUTHORIZED_MESSAGE: &str = "Authentication required. Please log in.";
pub const BAD_REQUEST_MESSAGE: &str = "Invalid request. Please check your input and try again.";
pub const FORBIDDEN_MESSAGE: &str = "You do not have permission to perform this action.";
pub const NOT_FOUND_MESSAGE: &str = "The requested resource was not found.";
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please wait a moment and try again.";
pub const SERVER_ERROR_MESSAGE: &str = "Something went wrong on our end. Please try again.";
pub const UNAVAILABLE_MESSAGE: &str =
    "Service is temporarily unavailable. Please try again later.";
pub const GENERIC_MESSAGE: &str = "An error occurred";

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// The session could not be recovered; the user has been logged out
    #[error("{0}")]
    SessionExpired(String),

    /// Authentication failed and no refresh applies
    #[error("{0}")]
    Unauthorized(String),

    /// Validation failure (400, 422)
    #[error("{0}")]
    BadRequest(String),

    /// Permission denied
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found
    #[error("{0}")]
    NotFound(String),

    /// Rate limited
    #[error("{0}")]
    RateLimited(String),

    /// A 2xx response whose envelope reported `success: false`
    #[error("{0}")]
    Rejected(String),

    /// Any other 4xx
    #[error("{message}")]
    Request { status: u16, message: String },

    /// Server failure
    #[error("{message}")]
    Server { status: u16, message: String },

    /// Gateway or maintenance failure (502, 503, 504)
    #[error("{message}")]
    Unavailable { status: u16, message: String },

    /// No response was received
    #[error("{0}")]
    Network(String),

    /// Serialization/deserialization error
    #[error("Unexpected response from server: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Session storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ClientError {
    /// Create error from HTTP status code
    ///
    /// A server-supplied message is kept verbatim; otherwise the status
    /// picks a stable fallback.
    pub fn from_status(status: StatusCode, message: Option<String>) -> Self {
        let code = status.as_u16();
        let message = message.filter(|m| !m.trim().is_empty());
        let or = |fallback: &str| message.clone().unwrap_or_else(|| fallback.to_string());

        match code {
            400 | 422 => Self::BadRequest(or(BAD_REQUEST_MESSAGE)),
            401 => Self::Unauthorized(or(UNAUTHORIZED_MESSAGE)),
            403 => Self::Forbidden(or(FORBIDDEN_MESSAGE)),
            404 => Self::NotFound(or(NOT_FOUND_MESSAGE)),
            429 => Self::RateLimited(or(RATE_LIMITED_MESSAGE)),
            502..=504 => Self::Unavailable {
                status: code,
                message: or(UNAVAILABLE_MESSAGE),
            },
            500..=599 => Self::Server {
                status: code,
                message: or(SERVER_ERROR_MESSAGE),
            },
            _ => Self::Request {
                status: code,
                message: or(GENERIC_MESSAGE),
            },
        }
    }

    /// Error returned once the refresh protocol has given up
    pub fn session_expired() -> Self {
        Self::SessionExpired(SESSION_EXPIRED_MESSAGE.to_string())
    }

    /// Transport failure without a response
    pub(crate) fn network(error: &reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            "The request timed out. Please check your connection and try again.".to_string()
        } else if error.is_connect() {
            "Unable to reach the server. Please check your connection.".to_string()
        } else {
            error.to_string()
        };
        Self::Network(message)
    }

    /// HTTP status, when the error came from a response
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized(_) => Some(401),
            Self::BadRequest(_) => Some(400),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::RateLimited(_) => Some(429),
            Self::Request { status, .. }
            | Self::Server { status, .. }
            | Self::Unavailable { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Credentials were rejected
    pub const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::SessionExpired(_))
    }

    /// The user has been logged out
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }

    /// Worth re-attempting later
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Server { .. } | Self::Unavailable { .. } | Self::RateLimited(_)
        )
    }

    /// Errors the user should see through the notification surface
    ///
    /// Authentication failures are excluded; the refresh flow reports them
    /// once per burst.
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::BadRequest(_)
                | Self::Rejected(_)
                | Self::Forbidden(_)
                | Self::NotFound(_)
                | Self::RateLimited(_)
                | Self::Request { .. }
                | Self::Server { .. }
                | Self::Unavailable { .. }
                | Self::Network(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_is_kept_verbatim() {
        let error = ClientError::from_status(
            StatusCode::NOT_FOUND,
            Some("Order not found".to_string()),
        );
        assert!(matches!(error, ClientError::NotFound(_)));
        assert_eq!(error.to_string(), "Order not found");
    }

    #[test]
    fn test_fallback_messages() {
        let cases = [
            (400, BAD_REQUEST_MESSAGE),
            (422, BAD_REQUEST_MESSAGE),
            (403, FORBIDDEN_MESSAGE),
            (404, NOT_FOUND_MESSAGE),
            (429, RATE_LIMITED_MESSAGE),
            (500, SERVER_ERROR_MESSAGE),
            (501, SERVER_ERROR_MESSAGE),
            (503, UNAVAILABLE_MESSAGE),
            (409, GENERIC_MESSAGE),
        ];

        for (code, expected) in cases {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(
                ClientError::from_status(status, None).to_string(),
                expected,
                "status {code}"
            );
        }
    }

    #[test]
    fn test_blank_server_message_uses_fallback() {
        let error =
            ClientError::from_status(StatusCode::INTERNAL_SERVER_ERROR, Some("  ".to_string()));
        assert_eq!(error.to_string(), SERVER_ERROR_MESSAGE);
        assert_eq!(error.status(), Some(500));
    }

    #[test]
    fn test_classification() {
        assert!(ClientError::session_expired().is_session_expired());
        assert!(ClientError::Unauthorized("no".into()).is_auth_expired());
        assert!(!ClientError::Unauthorized("no".into()).is_user_facing());
        assert!(ClientError::Network("down".into()).is_retryable());
        assert!(!ClientError::NotFound("gone".into()).is_retryable());
        assert!(ClientError::NotFound("gone".into()).is_user_facing());
    }

    #[test]
    fn test_rejected_envelope_has_no_status() {
        let error = ClientError::Rejected("Order already cancelled".into());
        assert_eq!(error.status(), None);
        assert!(error.is_user_facing());
        assert!(!error.is_retryable());
        assert!(!error.is_auth_expired());
        assert_eq!(error.to_string(), "Order already cancelled");
    }
}
