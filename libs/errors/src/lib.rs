//! Unified error handling for the plcsrv agent
//!
//! One error type covers the whole agent so that every layer can propagate
//! with `?` and the scheduler can classify failures for statistics without
//! downcasting.

use thiserror::Error;

/// Main error type for the agent
#[derive(Debug, Error)]
pub enum AgentError {
    // ======================================
    // Configuration Errors
    // ======================================
    /// No remote configuration and no usable local cache
    #[error("Configuration unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Connection & Transport Errors
    // ======================================
    #[error("Connection failed: {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    // ======================================
    // Data Point Errors
    // ======================================
    /// Wire-level read failed for a single data point
    #[error("Read failed at {address}: {reason}")]
    ReadFailed { address: String, reason: String },

    /// Malformed address or type mismatch in a data-point spec
    #[error("Decode error at {address}: {reason}")]
    Decode { address: String, reason: String },

    /// Manufacturer adapter exists only as a stub
    #[error("Protocol not implemented: {0}")]
    NotImplemented(String),

    // ======================================
    // Telemetry Sink Errors
    // ======================================
    #[error("Telemetry sink unavailable: {0}")]
    SinkUnavailable(String),

    // ======================================
    // Ambient Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Whether this error should be booked as a connection failure
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            AgentError::ConnectionFailed { .. } | AgentError::Transport(_)
        )
    }

    /// Whether this error should be booked as a per-point read failure
    ///
    /// Decode errors are configuration-authoring mistakes and are treated
    /// identically to read failures: isolated, logged, never fatal.
    pub fn is_point_read(&self) -> bool {
        matches!(
            self,
            AgentError::ReadFailed { .. }
                | AgentError::Decode { .. }
                | AgentError::NotImplemented(_)
                | AgentError::Timeout(_)
        )
    }

    /// Shorthand for a decode failure at a given address
    pub fn decode(address: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::Decode {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a read failure at a given address
    pub fn read_failed(address: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::ReadFailed {
            address: address.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used across the agent
pub type AgentResult<T> = std::result::Result<T, AgentError>;
