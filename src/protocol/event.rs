//! Event message types.
//!
//! Events are notifications sent from the browser without a matching
//! command. Each decoded event becomes an immutable [`EventFrame`] shared
//! by every subscriber.

// ============================================================================
// Imports
// ============================================================================

use std::time::SystemTime;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;
use crate::identifiers::SessionId;

// ============================================================================
// Event
// ============================================================================

/// A typed protocol event.
pub trait Event: DeserializeOwned + Send + 'static {
    /// Event name in `Domain.eventName` format.
    const METHOD: &'static str;
}

// ============================================================================
// EventFrame
// ============================================================================

/// An event notification from browser to local end.
///
/// # Format
///
/// ```json
/// {
///   "method": "Domain.eventName",
///   "params": { ... },
///   "sessionId": "optional"
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Event-specific data.
    pub params: Value,

    /// Session the event was emitted on (flat mode only).
    pub session_id: Option<SessionId>,

    /// When the receive loop decoded the frame.
    pub received_at: SystemTime,
}

impl EventFrame {
    /// Creates a frame stamped with the current time.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value, session_id: Option<SessionId>) -> Self {
        Self {
            method: method.into(),
            params,
            session_id,
            received_at: SystemTime::now(),
        }
    }

    /// Returns the domain name from the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let frame = EventFrame::new("Page.loadEventFired", json!({}), None);
    /// assert_eq!(frame.domain(), "Page");
    /// ```
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let frame = EventFrame::new("Page.loadEventFired", json!({}), None);
    /// assert_eq!(frame.event_name(), "loadEventFired");
    /// ```
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split_once('.').map(|(_, name)| name).unwrap_or_default()
    }

    /// Returns `true` if this frame carries the event `E`.
    #[inline]
    #[must_use]
    pub fn is<E: Event>(&self) -> bool {
        self.method == E::METHOD
    }

    /// Deserializes the params into a typed event.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the params do not match `E`.
    pub fn parse<E: Event>(&self) -> Result<E> {
        Ok(E::deserialize(&self.params)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
