//! Error types for the DevTools client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use chrome_debugger::{Error, Result};
//!
//! async fn example(target: &Target) -> Result<()> {
//!     match target.send("Page.enable", None).await {
//!         Err(Error::TargetClosed { .. }) => Ok(()),
//!         other => other.map(|_| ()),
//!     }
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::ConnectionFailed`], [`Error::ConnectionClosed`] |
//! | Calls | [`Error::RequestTimeout`], [`Error::Protocol`], [`Error::TooManyPendingCalls`] |
//! | Wire | [`Error::MalformedFrame`] |
//! | Targets | [`Error::TargetClosed`], [`Error::TargetNotFound`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{RequestId, TargetId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when builder configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Handshake or discovery failed.
    ///
    /// Fatal to the attempted open; nothing was established.
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Connection closed before or while the operation was running.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Call Errors
    // ========================================================================
    /// No response arrived within the call deadline.
    ///
    /// The pending call has been removed; the caller may retry.
    #[error("Request {request_id} ({method}) timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Method of the timed-out command.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Browser answered the command with an error object.
    #[error("Protocol error {code}: {message}")]
    Protocol {
        /// Error code reported by the browser.
        code: i64,
        /// Error message reported by the browser.
        message: String,
        /// Optional extra detail.
        data: Option<String>,
    },

    /// Too many in-flight calls on one connection.
    #[error("Too many pending calls: {pending}/{max}")]
    TooManyPendingCalls {
        /// Calls currently in flight.
        pending: usize,
        /// Configured maximum.
        max: usize,
    },

    // ========================================================================
    // Wire Errors
    // ========================================================================
    /// Incoming frame could not be decoded.
    ///
    /// Logged and skipped by the receive loop, never fatal to the connection.
    #[error("Malformed frame: {message}")]
    MalformedFrame {
        /// Description of the decoding failure.
        message: String,
    },

    // ========================================================================
    // Target Errors
    // ========================================================================
    /// Operation on a target past its terminal state.
    #[error("Target closed: {target_id}")]
    TargetClosed {
        /// The closed target.
        target_id: TargetId,
    },

    /// Target is not tracked by the manager.
    #[error("Target not found: {target_id}")]
    TargetNotFound {
        /// The missing target.
        target_id: TargetId,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP error during discovery.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection failed error.
    #[inline]
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            method: method.into(),
            timeout_ms,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(code: i64, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Creates a malformed frame error.
    #[inline]
    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Creates a target closed error.
    #[inline]
    pub fn target_closed(target_id: TargetId) -> Self {
        Self::TargetClosed { target_id }
    }

    /// Creates a target not found error.
    #[inline]
    pub fn target_not_found(target_id: TargetId) -> Self {
        Self::TargetNotFound { target_id }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the operation targeted a closed target.
    #[inline]
    #[must_use]
    pub fn is_target_closed(&self) -> bool {
        matches!(self, Self::TargetClosed { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry. Retrying is left to the caller.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. } | Self::Protocol { .. } | Self::TooManyPendingCalls { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection_failed("handshake refused");
        assert_eq!(err.to_string(), "Connection failed: handshake refused");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = Error::protocol(-32601, "'Foo.bar' wasn't found");
        assert_eq!(err.to_string(), "Protocol error -32601: 'Foo.bar' wasn't found");
    }

    #[test]
    fn test_request_timeout_display() {
        let err = Error::request_timeout(RequestId::new(7), "Page.navigate", 500);
        assert_eq!(
            err.to_string(),
            "Request 7 (Page.navigate) timed out after 500ms"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection_failed("x").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("x").is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        let timeout_err = Error::request_timeout(RequestId::new(1), "A.b", 10);
        let protocol_err = Error::protocol(-32000, "nope");
        let closed_err = Error::ConnectionClosed;

        assert!(timeout_err.is_recoverable());
        assert!(protocol_err.is_recoverable());
        assert!(!closed_err.is_recoverable());
    }

    #[test]
    fn test_target_closed() {
        let err = Error::target_closed(TargetId::from("T1"));
        assert!(err.is_target_closed());
        assert_eq!(err.to_string(), "Target closed: T1");
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
