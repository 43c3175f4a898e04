//! Request and Response message types.
//!
//! Defines the command envelope sent to the browser and the response
//! envelope that answers it.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, SessionId};

// ============================================================================
// Request
// ============================================================================

/// A command request from local end to browser.
///
/// # Format
///
/// ```json
/// {
///   "id": 1,
///   "method": "Domain.methodName",
///   "params": { ... },
///   "sessionId": "optional"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Identifier for request/response correlation.
    pub id: RequestId,

    /// Method in `Domain.methodName` format.
    pub method: String,

    /// Command parameters, always an object on the wire.
    pub params: Value,

    /// Flat-mode session the command is addressed to.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl Request {
    /// Creates a new request.
    ///
    /// A `None` or `null` payload is normalized to an empty object.
    #[must_use]
    pub fn new(
        id: RequestId,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Self {
        let params = match params {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(value) => value,
        };

        Self {
            id,
            method: method.into(),
            params,
            session_id,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from browser to local end.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 1, "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// { "id": 1, "error": { "code": -32601, "message": "..." } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Matches the command `id`.
    pub id: RequestId,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error object (if error).
    #[serde(default)]
    pub error: Option<ResponseError>,

    /// Session the answered command was addressed to.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

impl Response {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, returning error if response was error.
    ///
    /// A missing result becomes an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the response carries an error object.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.result.unwrap_or_else(|| Value::Object(Map::new()))),
        }
    }
}

// ============================================================================
// ResponseError
// ============================================================================

/// Error object of a failed command.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    /// Error code (JSON-RPC style).
    pub code: i64,

    /// Human readable message.
    pub message: String,

    /// Optional extra detail, usually a string.
    #[serde(default)]
    pub data: Option<Value>,
}

impl From<ResponseError> for Error {
    fn from(error: ResponseError) -> Self {
        let data = error.data.map(|data| match data {
            Value::String(text) => text,
            other => other.to_string(),
        });

        Error::Protocol {
            code: error.code,
            message: error.message,
            data,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
