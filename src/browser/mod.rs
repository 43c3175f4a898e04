//! Browser facade and configuration.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Browser`] | Connected browser: discovery + root connection + targets |
//! | [`BrowserBuilder`] | Fluent configuration |
//! | [`BrowserConfig`] | Validated configuration |
//! | [`TargetOptions`] | Per-target overrides |
//!
//! # Example
//!
//! ```no_run
//! use chrome_debugger::{Browser, Result};
//!
//! # async fn example() -> Result<()> {
//! let browser = Browser::builder()
//!     .address("localhost:9222")
//!     .incognito(true)
//!     .connect()
//!     .await?;
//!
//! let target = browser.target().await?;
//! target.send("Page.navigate", Some(serde_json::json!({"url": "https://example.com"}))).await?;
//! target.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Builder for browser configuration.
pub mod builder;

/// Configuration types.
pub mod config;

/// Browser facade.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::BrowserBuilder;
pub use config::{BrowserConfig, TargetOptions};
pub use core::Browser;
