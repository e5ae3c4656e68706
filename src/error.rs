//! Error types for stp-client

use std::time::Duration;
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, StpError>;

#[derive(Error, Debug)]
pub enum StpError {
    #[error("Failed to connect: {0}")]
    ConnectFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not connected to the STP service")]
    NotConnected,

    #[error("Operation timed out: {operation} did not complete within {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Reconnection failed: {0}")]
    ReconnectFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The service answered `success: false`; holds the service's own result payload.
    #[error("Request rejected by service: {0}")]
    Application(serde_json::Value),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StpError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StpError::Timeout { .. })
    }
}
