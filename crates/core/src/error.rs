// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for CastKit.
//!
//! Errors are categorized by recovery strategy rather than by origin. Transient
//! queue conditions (empty, full, not connected) are deliberately *not* errors:
//! queue operations report them through `Option` returns and the caller retries,
//! sleeps or forces a slot.

use thiserror::Error;

/// Main error type for CastKit operations.
#[derive(Debug, Error)]
pub enum CastError {
    /// Configuration or parameter validation error.
    ///
    /// Examples: duplicate filter id, arity exceeded, invalid path definition.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Runtime processing error during normal operation.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Network-related error (control socket, adapters).
    #[error("Network error: {0}")]
    Network(String),

    /// Codec-specific error (encoding, format negotiation).
    #[error("Codec error: {0}")]
    Codec(String),

    /// I/O error (sockets, files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource exhaustion or limit exceeded.
    ///
    /// Examples: slave capacity reached, worker already assigned.
    #[error("Resource exhaustion: {0}")]
    ResourceExhausted(String),
}

/// Convenience type alias for Results using `CastError`.
pub type Result<T> = std::result::Result<T, CastError>;

impl From<CastError> for String {
    fn from(err: CastError) -> Self {
        err.to_string()
    }
}

// Generic string errors default to Runtime.
impl From<String> for CastError {
    fn from(s: String) -> Self {
        Self::Runtime(s)
    }
}

impl From<&str> for CastError {
    fn from(s: &str) -> Self {
        Self::Runtime(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CastError::Configuration("duplicate filter id 3".to_string());
        assert_eq!(err.to_string(), "Configuration error: duplicate filter id 3");

        let err = CastError::Network("connection reset".to_string());
        assert_eq!(err.to_string(), "Network error: connection reset");
    }

    #[test]
    fn string_conversions() {
        let err: CastError = "something went wrong".into();
        assert_eq!(err.to_string(), "Runtime error: something went wrong");

        let s: String = CastError::Codec("unsupported codec: aac".to_string()).into();
        assert_eq!(s, "Codec error: unsupported codec: aac");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err: CastError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("port taken"));
    }
}
