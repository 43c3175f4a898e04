//! WebSocket transport layer.
//!
//! This module handles communication between the local end (Rust) and the
//! browser's debugger endpoint via WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐                      ┌─────────────────┐
//! │  Connection (Rust)      │                      │  Browser        │
//! │                         │      WebSocket       │                 │
//! │  CallRegistry  ◄────────┼──── responses ───────┤  /devtools/...  │
//! │  EventHub      ◄────────┼──── events ──────────┤                 │
//! │  send() ────────────────┼──── commands ───────►│                 │
//! └─────────────────────────┘                      └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::open` - Handshake within a bounded timeout
//! 2. `Connection::send` / `Connection::events` - Commands and subscriptions
//! 3. `Connection::close` - Fail pending calls, end streams, release the socket
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `hub` | Event fan-out with replay |
//! | `registry` | In-flight call correlation |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// Event fan-out with a bounded replay window.
pub mod hub;

/// Pending-call correlation.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionOptions, MalformedFrame};
pub use hub::{EventFilter, EventHub, EventStream};
pub use registry::CallRegistry;
