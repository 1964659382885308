//! Error types for mudgate.

use thiserror::Error;

/// Main error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No transport is open for the session.
    #[error("not connected")]
    NotConnected,

    /// I/O error from the remote transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// Credential store failure.
    #[error("credential store error: {0}")]
    Store(String),

    /// Delivery to the chat platform failed.
    #[error("chat delivery failed: {0}")]
    Delivery(String),
}

/// Convenience Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
