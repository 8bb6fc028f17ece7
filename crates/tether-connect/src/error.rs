//! Error types for traffic manager sessions and intercepts

use std::time::Duration;
use tether_core::TimeoutClass;
use thiserror::Error;

use crate::rpc::InterceptErrorCode;

/// Message shown whenever there is no live session
pub const NOT_CONNECTED_MESSAGE: &str =
    "Not connected to the traffic manager. Start a session and retry";

#[derive(Debug, Error)]
pub enum ConnectError {
    // ============ Session Errors ============
    #[error("{}", NOT_CONNECTED_MESSAGE)]
    NotConnected,

    #[error("Session cache error: {message}")]
    SessionCache { message: String },

    // ============ Intercept Errors ============
    /// The manager rejected an intercept operation
    #[error("{message}")]
    Intercept {
        code: InterceptErrorCode,
        message: String,
    },

    // ============ Network Errors ============
    #[error("Unable to reach the traffic manager: {message}")]
    Communication { message: String },

    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("the operation exceeded its {class} limit of {limit:?}; raise {class} in config.yml to allow more time")]
    Timeout { class: TimeoutClass, limit: Duration },

    #[error("Invalid manager URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for session and intercept operations
pub type Result<T> = std::result::Result<T, ConnectError>;

impl ConnectError {
    pub fn is_not_connected(&self) -> bool {
        matches!(self, ConnectError::NotConnected)
    }

    /// Intercept error code, if the manager rejected the operation
    pub fn intercept_code(&self) -> Option<InterceptErrorCode> {
        match self {
            ConnectError::Intercept { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ConnectError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            ConnectError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            ConnectError::Serialization(e.to_string())
        } else {
            ConnectError::Communication {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for ConnectError {
    fn from(e: serde_json::Error) -> Self {
        ConnectError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for ConnectError {
    fn from(e: url::ParseError) -> Self {
        ConnectError::InvalidUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}
