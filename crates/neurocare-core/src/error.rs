//! Error types for neurocare-core.

use thiserror::Error;

/// Result type alias using neurocare-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for therapy session operations
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Validation error: {field} {message}")]
    Validation { field: String, message: String },

    // Device errors
    #[error("Device not connected: connect your device to {operation}")]
    DeviceNotConnected { operation: String },

    // Session state errors
    #[error("Invalid state transition: cannot {operation} while session is {phase}")]
    InvalidStateTransition { operation: String, phase: String },

    // Persistence errors
    #[error("Persistence error while trying to {operation}: {message}")]
    Persistence { operation: String, message: String },

    #[error("Unsaved session pending: retry or discard it before you {operation}")]
    UnsavedSessionPending { operation: String },

    #[cfg(feature = "db")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // Auth errors
    #[error("Not signed in: {operation} requires an authenticated user")]
    MissingAuth { operation: String },

    #[error("Permission denied")]
    PermissionDenied,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a validation error for a named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a device-not-connected error for the attempted operation
    pub fn device_not_connected(operation: impl Into<String>) -> Self {
        Self::DeviceNotConnected {
            operation: operation.into(),
        }
    }

    /// Create a persistence error from any underlying failure
    pub fn persistence(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Persistence {
            operation: operation.into(),
            message: cause.to_string(),
        }
    }

    /// Create an invalid state transition error
    pub fn invalid_transition(operation: impl Into<String>, phase: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            operation: operation.into(),
            phase: phase.to_string(),
        }
    }

    /// Create a missing-auth error
    pub fn missing_auth(operation: impl Into<String>) -> Self {
        Self::MissingAuth {
            operation: operation.into(),
        }
    }

    /// Create an error for an operation blocked by an unsaved session
    pub fn unsaved_session_pending(operation: impl Into<String>) -> Self {
        Self::UnsavedSessionPending {
            operation: operation.into(),
        }
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this is a device-not-connected error
    pub fn is_device_not_connected(&self) -> bool {
        matches!(self, Self::DeviceNotConnected { .. })
    }

    /// Check if this is a persistence error
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}
