//! Error types for the Volley client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to a service under test
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response arrived (connect, timeout, ...)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Service answered with a status the call does not accept
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Response body, or a placeholder when it could not be read
        message: String,
    },

    /// Response arrived but its body could not be decoded
    #[error("Failed to parse response (status {status}): {message}")]
    ParseError {
        /// HTTP status the unreadable body came with
        status: u16,
        message: String,
    },

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Create a parse error for a body received with `status`
    pub fn parse_error(status: u16, message: impl Into<String>) -> Self {
        Self::ParseError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || matches!(self, Self::ApiError { status: 404, .. })
    }

    /// HTTP status carried by the error, if a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } | Self::ParseError { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            Self::RequestFailed(e) => e.status().map(|s| s.as_u16()),
            Self::InvalidRequest(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(ClientError::NotFound("task T1".into()).is_not_found());
        assert!(ClientError::api_error(404, "gone").is_not_found());
        assert!(!ClientError::api_error(500, "boom").is_not_found());
    }

    #[test]
    fn test_status_carried_by_errors() {
        assert_eq!(ClientError::api_error(409, "conflict").status(), Some(409));
        assert_eq!(ClientError::NotFound("task".into()).status(), Some(404));
        assert_eq!(ClientError::InvalidRequest("x".into()).status(), None);
    }

    #[test]
    fn test_parse_error_keeps_received_status() {
        let err = ClientError::parse_error(202, "expected value at line 1 column 1");
        assert_eq!(err.status(), Some(202));
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("status 202"));
    }
}
