//! Builder pattern for browser configuration.
//!
//! Provides a fluent API for configuring and connecting a [`Browser`].
//!
//! # Example
//!
//! ```no_run
//! use chrome_debugger::Browser;
//!
//! # async fn example() -> chrome_debugger::Result<()> {
//! let browser = Browser::builder()
//!     .address("127.0.0.1:9222")
//!     .multiplex_connections(true)
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

use super::config::{BrowserConfig, MIN_VIEWPORT_DIMENSION};
use super::core::Browser;

// ============================================================================
// BrowserBuilder
// ============================================================================

/// Builder for configuring a [`Browser`].
///
/// Use [`Browser::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct BrowserBuilder {
    config: BrowserConfig,
}

// ============================================================================
// BrowserBuilder Implementation
// ============================================================================

impl BrowserBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the debugging address.
    ///
    /// # Arguments
    ///
    /// * `address` - `host:port` of `--remote-debugging-port` (e.g. "localhost:9222")
    #[inline]
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = address.into();
        self
    }

    /// Sets the URL new targets open by default.
    #[inline]
    #[must_use]
    pub fn blank_page(mut self, url: impl Into<String>) -> Self {
        self.config.blank_page = url.into();
        self
    }

    /// Sets the event replay window, clamped to at least 1.
    #[inline]
    #[must_use]
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size.max(1);
        self
    }

    /// Sets the default viewport width, clamped to at least 100.
    #[inline]
    #[must_use]
    pub fn viewport_width(mut self, width: u32) -> Self {
        self.config.viewport_width = width.max(MIN_VIEWPORT_DIMENSION);
        self
    }

    /// Sets the default viewport height, clamped to at least 100.
    #[inline]
    #[must_use]
    pub fn viewport_height(mut self, height: u32) -> Self {
        self.config.viewport_height = height.max(MIN_VIEWPORT_DIMENSION);
        self
    }

    /// Shares one connection across all targets.
    #[inline]
    #[must_use]
    pub fn multiplex_connections(mut self, multiplex: bool) -> Self {
        self.config.multiplex_connections = multiplex;
        self
    }

    /// Creates new targets in a fresh browser context by default.
    #[inline]
    #[must_use]
    pub fn incognito(mut self, incognito: bool) -> Self {
        self.config.incognito = incognito;
        self
    }

    /// Sets the default per-call timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the discovery and handshake timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the address, blank page or a timeout is invalid.
    pub fn build(self) -> Result<BrowserConfig> {
        self.validate_address()?;
        self.validate_blank_page()?;
        self.validate_timeouts()?;
        Ok(self.config)
    }

    /// Validates, discovers the browser and connects.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] on invalid settings
    /// - [`Error::ConnectionFailed`] if discovery or the handshake fails
    pub async fn connect(self) -> Result<Browser> {
        Browser::connect(self.build()?).await
    }
}

// ============================================================================
// Validation
// ============================================================================

impl BrowserBuilder {
    /// Validates the debugging address.
    fn validate_address(&self) -> Result<()> {
        let address = self.config.address.trim();
        if address.is_empty() {
            return Err(Error::config(
                "Debugger address is required.\n\
                 Example: Browser::builder().address(\"localhost:9222\")",
            ));
        }

        let candidate = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };

        match Url::parse(&candidate) {
            Ok(url) if url.host_str().is_some() && url.scheme() == "http" => Ok(()),
            _ => Err(Error::config(format!(
                "Invalid debugger address: {address}\n\
                 Expected host:port or an http:// URL, e.g. localhost:9222"
            ))),
        }
    }

    /// Validates the default page URL.
    fn validate_blank_page(&self) -> Result<()> {
        if self.config.blank_page.trim().is_empty() {
            return Err(Error::config("Blank page URL must not be empty"));
        }
        Ok(())
    }

    /// Validates timeouts.
    fn validate_timeouts(&self) -> Result<()> {
        if self.config.request_timeout.is_zero() {
            return Err(Error::config("Request timeout must be non-zero"));
        }
        if self.config.connect_timeout.is_zero() {
            return Err(Error::config("Connect timeout must be non-zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_build() {
        let config = BrowserBuilder::new().build().expect("config");
        assert_eq!(config, BrowserConfig::default());
    }

    #[test]
    fn test_setters() {
        let config = BrowserBuilder::new()
            .address("127.0.0.1:9333")
            .blank_page("https://example.com")
            .multiplex_connections(true)
            .incognito(true)
            .request_timeout(Duration::from_secs(5))
            .build()
            .expect("config");

        assert_eq!(config.address, "127.0.0.1:9333");
        assert_eq!(config.blank_page, "https://example.com");
        assert!(config.multiplex_connections);
        assert!(config.incognito);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_clamps() {
        let config = BrowserBuilder::new()
            .event_buffer_size(0)
            .viewport_width(10)
            .viewport_height(99)
            .build()
            .expect("config");

        assert_eq!(config.event_buffer_size, 1);
        assert_eq!(config.viewport_width, 100);
        assert_eq!(config.viewport_height, 100);
    }

    #[test]
    fn test_build_fails_with_empty_address() {
        let err = BrowserBuilder::new().address("").build().expect_err("empty");
        assert!(err.to_string().contains("address"));
    }

    #[test]
    fn test_build_fails_with_bad_address() {
        let result = BrowserBuilder::new().address("::::").build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_build_fails_with_tls_address() {
        let result = BrowserBuilder::new().address("https://localhost:9222").build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_build_fails_with_zero_timeout() {
        let result = BrowserBuilder::new()
            .request_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_is_clone() {
        let builder = BrowserBuilder::new().address("localhost:1");
        let cloned = builder.clone();
        assert_eq!(builder.config, cloned.config);
    }
}
