//! Chrome DevTools Protocol client with session multiplexing.
//!
//! This library connects to a running Chromium-based browser over its
//! remote debugging websocket and provides the transport core that any
//! protocol domain binding builds on.
//!
//! # Architecture
//!
//! The client follows a single-reader model:
//!
//! - **Connection**: one websocket, one receive loop task, request/response
//!   correlation by numeric ID
//! - **Event Hub**: every decoded event is broadcast to subscribers, with a
//!   bounded replay window for late subscribers
//! - **Target Manager**: targets either share the root connection through
//!   flat session IDs or get a dedicated connection each
//!
//! Key design principles:
//!
//! - Protocol methods use `Domain.methodName` format
//! - Domain bindings are plain types implementing [`Command`] or [`Event`]
//! - Nothing blocks the receive loop; slow subscribers lose their oldest
//!   frames instead
//! - Closing is idempotent and never leaves a caller hanging
//!
//! # Quick Start
//!
//! ```no_run
//! use chrome_debugger::{Browser, EventFilter, Result};
//! use futures_util::StreamExt;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Browser started with --remote-debugging-port=9222
//!     let browser = Browser::builder()
//!         .address("localhost:9222")
//!         .multiplex_connections(true)
//!         .connect()
//!         .await?;
//!
//!     let target = browser.target().await?;
//!     let mut loads = target.events(EventFilter::new().method("Page.loadEventFired"))?;
//!
//!     target.send("Page.enable", None).await?;
//!     target
//!         .send("Page.navigate", Some(json!({ "url": "https://example.com" })))
//!         .await?;
//!     loads.next().await;
//!
//!     browser.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`browser`] | [`Browser`] facade and [`BrowserBuilder`] |
//! | [`discovery`] | HTTP `/json/version` and `/json/list` |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire messages, codec and `Target` domain bindings |
//! | [`target`] | [`Manager`] and [`Target`] handles |
//! | [`transport`] | [`Connection`], call registry and event hub |

// ============================================================================
// Modules
// ============================================================================

/// Browser facade and configuration.
///
/// Use [`Browser::builder()`] to configure and connect.
pub mod browser;

/// HTTP discovery against the debugging port.
pub mod discovery;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for protocol entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// CDP wire protocol message types.
pub mod protocol;

/// Session and target management.
pub mod target;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Browser types
pub use browser::{Browser, BrowserBuilder, BrowserConfig, TargetOptions};

// Discovery types
pub use discovery::{BrowserVersion, Discovery, InspectablePage};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{BrowserContextId, RequestId, SessionId, TargetId};

// Protocol types
pub use protocol::{Command, Event, EventFrame, TargetInfo};

// Target types
pub use target::{CreateOptions, Manager, ManagerOptions, Session, Target};

// Transport types
pub use transport::{Connection, ConnectionOptions, EventFilter, EventStream, MalformedFrame};
