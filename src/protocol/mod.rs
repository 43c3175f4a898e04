//! CDP wire protocol message types.
//!
//! This module defines the message format exchanged with the browser over
//! the debugger websocket.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Browser | Command request |
//! | `Response` | Browser → Local | Command result or error |
//! | `EventFrame` | Browser → Local | Notification |
//!
//! # Method Naming
//!
//! Commands and events follow `Domain.methodName` format:
//!
//! - `Target.createTarget`
//! - `Security.enable`
//! - `Page.loadEventFired`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Text frame encoding and classification |
//! | `command` | Command contract for domain bindings |
//! | `event` | Event frames and the typed event contract |
//! | `request` | Request and Response envelopes |
//! | `target` | `Target` domain bindings |
//! | `browser` | `Browser` domain bindings |

// ============================================================================
// Submodules
// ============================================================================

/// `Browser` domain bindings.
pub mod browser;

/// Text frame codec.
pub mod codec;

/// Command contract.
pub mod command;

/// Event message types.
pub mod event;

/// Request and Response message types.
pub mod request;

/// `Target` domain bindings.
pub mod target;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{Frame, decode, encode};
pub use command::{Command, Empty};
pub use event::{Event, EventFrame};
pub use request::{Request, Response, ResponseError};
pub use target::TargetInfo;
