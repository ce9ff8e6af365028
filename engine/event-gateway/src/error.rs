//! Error types for the EventGateway

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the EventGateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Server error: {0}")]
    Server(#[from] warp::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for EventGateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error codes returned in [`ErrorDetail::code`]
pub mod codes {
    pub const INVALID_EVENT: &str = "INVALID_EVENT";
    pub const PAYLOAD_TOO_LARGE: &str = "PAYLOAD_TOO_LARGE";
    pub const BACKPRESSURE: &str = "BACKPRESSURE";
    pub const SHUTTING_DOWN: &str = "SHUTTING_DOWN";
    pub const INTERNAL: &str = "INTERNAL";
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    pub timestamp: String,
}

/// Error detail
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail { code: code.to_string(), message: message.into(), details: None },
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
