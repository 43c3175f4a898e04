//! Browser configuration and per-target options.
//!
//! # Example
//!
//! ```ignore
//! use chrome_debugger::TargetOptions;
//!
//! let options = TargetOptions::new()
//!     .url("https://example.com")
//!     .incognito(true)
//!     .viewport(1280, 800);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::target::CreateOptions;
use crate::transport::ConnectionOptions;
use crate::transport::connection::{
    DEFAULT_EVENT_BUFFER_SIZE, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};

// ============================================================================
// Constants
// ============================================================================

/// Default debugging address.
pub const DEFAULT_ADDRESS: &str = "localhost:9222";

/// Default URL of new targets.
pub const DEFAULT_BLANK_PAGE: &str = "about:blank";

/// Default viewport width.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1024;

/// Default viewport height.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 768;

/// Smallest accepted viewport dimension.
pub const MIN_VIEWPORT_DIMENSION: u32 = 100;

// ============================================================================
// BrowserConfig
// ============================================================================

/// Validated browser configuration.
///
/// Produced by [`BrowserBuilder::build`](super::BrowserBuilder::build).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserConfig {
    /// Debugging address (`host:port`).
    pub address: String,

    /// URL new targets open by default.
    pub blank_page: String,

    /// Replay window per connection (at least 1).
    pub event_buffer_size: usize,

    /// Default viewport width (at least 100).
    pub viewport_width: u32,

    /// Default viewport height (at least 100).
    pub viewport_height: u32,

    /// Share one connection across all targets.
    pub multiplex_connections: bool,

    /// Create new targets in a fresh browser context by default.
    pub incognito: bool,

    /// Default per-call timeout.
    pub request_timeout: Duration,

    /// Timeout for discovery and websocket handshakes.
    pub connect_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            blank_page: DEFAULT_BLANK_PAGE.to_string(),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            multiplex_connections: false,
            incognito: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl BrowserConfig {
    /// Connection options derived from this configuration.
    #[must_use]
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions::new()
            .with_event_buffer_size(self.event_buffer_size)
            .with_request_timeout(self.request_timeout)
            .with_handshake_timeout(self.connect_timeout)
    }

    /// Resolves per-target options against these defaults.
    #[must_use]
    pub fn resolve(&self, options: &TargetOptions) -> CreateOptions {
        CreateOptions {
            url: options
                .url
                .clone()
                .unwrap_or_else(|| self.blank_page.clone()),
            incognito: options.incognito.unwrap_or(self.incognito),
            width: options
                .width
                .unwrap_or(self.viewport_width)
                .max(MIN_VIEWPORT_DIMENSION),
            height: options
                .height
                .unwrap_or(self.viewport_height)
                .max(MIN_VIEWPORT_DIMENSION),
        }
    }
}

// ============================================================================
// TargetOptions
// ============================================================================

/// Overrides for one new target. Unset fields use the browser defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetOptions {
    /// Initial URL.
    pub url: Option<String>,
    /// Fresh browser context.
    pub incognito: Option<bool>,
    /// Viewport width.
    pub width: Option<u32>,
    /// Viewport height.
    pub height: Option<u32>,
}

impl TargetOptions {
    /// Creates options with every field unset.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial URL.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets whether the target gets a fresh browser context.
    #[inline]
    #[must_use]
    pub fn incognito(mut self, incognito: bool) -> Self {
        self.incognito = Some(incognito);
        self
    }

    /// Sets the viewport, clamped to at least 100 in each dimension.
    #[inline]
    #[must_use]
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width.max(MIN_VIEWPORT_DIMENSION));
        self.height = Some(height.max(MIN_VIEWPORT_DIMENSION));
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrowserConfig::default();
        assert_eq!(config.address, "localhost:9222");
        assert_eq!(config.blank_page, "about:blank");
        assert_eq!(config.event_buffer_size, 128);
        assert_eq!((config.viewport_width, config.viewport_height), (1024, 768));
        assert!(!config.multiplex_connections);
        assert!(!config.incognito);
        assert_eq!(config.connection_options(), ConnectionOptions::default());
    }

    #[test]
    fn test_resolve_uses_defaults() {
        let config = BrowserConfig::default();
        let create = config.resolve(&TargetOptions::new());
        assert_eq!(create.url, "about:blank");
        assert!(!create.incognito);
        assert_eq!((create.width, create.height), (1024, 768));
    }

    #[test]
    fn test_resolve_applies_overrides() {
        let config = BrowserConfig::default();
        let create = config.resolve(
            &TargetOptions::new()
                .url("https://example.com")
                .incognito(true)
                .viewport(10, 2000),
        );
        assert_eq!(create.url, "https://example.com");
        assert!(create.incognito);
        assert_eq!((create.width, create.height), (100, 2000));
    }

    #[test]
    fn test_connection_options() {
        let config = BrowserConfig {
            event_buffer_size: 7,
            request_timeout: Duration::from_secs(3),
            ..BrowserConfig::default()
        };
        let options = config.connection_options();
        assert_eq!(options.event_buffer_size, 7);
        assert_eq!(options.request_timeout, Duration::from_secs(3));
    }
}
