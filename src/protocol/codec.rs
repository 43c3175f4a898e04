//! Wire codec for CDP text frames.
//!
//! Outgoing: [`encode`] a [`Request`] into a JSON text frame.
//! Incoming: [`decode`] a text frame into a [`Frame`], classifying it as a
//! response (carries `id`), an event (carries `method`, no `id`), or
//! [`Frame::Either`] when it carries both. Only the call registry can tell
//! whether such an `id` answers a command this side sent.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::{Value, from_str, to_string};

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, SessionId};

use super::event::EventFrame;
use super::request::{Request, Response, ResponseError};

// ============================================================================
// Frame
// ============================================================================

/// A decoded incoming frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Answer to a previously sent command.
    Response(Response),
    /// Unsolicited notification.
    Event(EventFrame),
    /// Carries both `id` and `method`: a response if `id` is pending,
    /// otherwise an event.
    Either(Response, EventFrame),
}

/// Superset of both incoming shapes, classified after parsing.
#[derive(Deserialize)]
struct IncomingFrame {
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ResponseError>,
    #[serde(rename = "sessionId", default)]
    session_id: Option<SessionId>,
}

// ============================================================================
// Encode / Decode
// ============================================================================

/// Serializes a command envelope into a text frame.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn encode(request: &Request) -> Result<String> {
    Ok(to_string(request)?)
}

/// Parses a text frame.
///
/// # Errors
///
/// Returns [`Error::MalformedFrame`] if the text is not JSON or matches
/// neither the response nor the event shape.
pub fn decode(text: &str) -> Result<Frame> {
    let incoming: IncomingFrame =
        from_str(text).map_err(|e| Error::malformed_frame(e.to_string()))?;

    match (incoming.id, incoming.method) {
        (Some(id), None) => Ok(Frame::Response(Response {
            id,
            result: incoming.result,
            error: incoming.error,
            session_id: incoming.session_id,
        })),
        (Some(id), Some(method)) => {
            let event = EventFrame::new(
                method,
                incoming.params.unwrap_or(Value::Null),
                incoming.session_id.clone(),
            );
            let response = Response {
                id,
                result: incoming.result,
                error: incoming.error,
                session_id: incoming.session_id,
            };
            Ok(Frame::Either(response, event))
        }
        (None, Some(method)) => Ok(Frame::Event(EventFrame::new(
            method,
            incoming.params.unwrap_or(Value::Null),
            incoming.session_id,
        ))),
        (None, None) => Err(Error::malformed_frame("frame has neither id nor method")),
    }
}

// ============================================================================
// Tests
// ============================================================================
