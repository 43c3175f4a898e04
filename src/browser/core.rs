//! Browser facade.
//!
//! The [`Browser`] ties discovery, the root connection and the target
//! manager together behind one handle.
//!
//! # Example
//!
//! ```no_run
//! use chrome_debugger::{Browser, TargetOptions};
//!
//! # async fn example() -> chrome_debugger::Result<()> {
//! let browser = Browser::builder().connect().await?;
//!
//! let target = browser
//!     .target_with(TargetOptions::new().url("https://example.com"))
//!     .await?;
//! target.send("Page.enable", None).await?;
//!
//! browser.close().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::discovery::{BrowserVersion, Discovery, InspectablePage};
use crate::error::Result;
use crate::protocol::TargetInfo;
use crate::protocol::browser::{GetVersion, GetVersionResponse};
use crate::target::{Manager, ManagerOptions, Target};
use crate::transport::Connection;

use super::builder::BrowserBuilder;
use super::config::{BrowserConfig, TargetOptions};

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the browser.
struct BrowserInner {
    config: BrowserConfig,
    version: BrowserVersion,
    discovery: Discovery,
    manager: Manager,
}

// ============================================================================
// Browser
// ============================================================================

/// Connected browser.
///
/// Cheap to clone; clones share one root connection and one target table.
#[derive(Clone)]
pub struct Browser {
    inner: Arc<BrowserInner>,
}

// ============================================================================
// Browser - Display
// ============================================================================

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Browser")
            .field("address", &self.inner.config.address)
            .field("browser", &self.inner.version.browser)
            .field("targets", &self.inner.manager.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Browser - Construction
// ============================================================================

impl Browser {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> BrowserBuilder {
        BrowserBuilder::new()
    }

    /// Discovers the browser at `config.address` and connects to it.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::ConnectionFailed`] if discovery or the handshake fails
    /// - Any error of the manager's start-up commands
    pub async fn connect(config: BrowserConfig) -> Result<Self> {
        let discovery = Discovery::with_timeout(&config.address, config.connect_timeout)?;
        let version = discovery.version().await?;
        debug!(
            browser = %version.browser,
            protocol = %version.protocol_version,
            "Browser discovered"
        );

        let connection_options = config.connection_options();
        let root = Connection::open(&version.web_socket_debugger_url, connection_options.clone())
            .await?;

        let manager_options = ManagerOptions::new(version.web_socket_debugger_url.clone())
            .multiplex(config.multiplex_connections)
            .connection(connection_options);

        let manager = match Manager::new(root.clone(), manager_options).await {
            Ok(manager) => manager,
            Err(e) => {
                root.close();
                return Err(e);
            }
        };

        info!(
            address = %config.address,
            browser = %version.browser,
            multiplex = config.multiplex_connections,
            "Connected to browser"
        );

        Ok(Self {
            inner: Arc::new(BrowserInner {
                config,
                version,
                discovery,
                manager,
            }),
        })
    }
}

// ============================================================================
// Browser - Targets
// ============================================================================

impl Browser {
    /// Creates a target with the configured defaults.
    ///
    /// # Errors
    ///
    /// See [`Manager::create`].
    pub async fn target(&self) -> Result<Target> {
        self.target_with(TargetOptions::default()).await
    }

    /// Creates a target with per-target overrides.
    ///
    /// # Errors
    ///
    /// See [`Manager::create`].
    pub async fn target_with(&self, options: TargetOptions) -> Result<Target> {
        let create = self.inner.config.resolve(&options);
        self.inner.manager.create(create).await
    }

    /// Lists every target the browser knows.
    ///
    /// # Errors
    ///
    /// See [`Manager::list`].
    pub async fn targets(&self) -> Result<Vec<TargetInfo>> {
        self.inner.manager.list().await
    }

    /// Returns the targets this browser handle tracks.
    #[must_use]
    pub fn tracked(&self) -> Vec<Target> {
        self.inner.manager.targets()
    }

    /// Lists inspectable pages over HTTP.
    ///
    /// # Errors
    ///
    /// See [`Discovery::pages`].
    pub async fn pages(&self) -> Result<Vec<InspectablePage>> {
        self.inner.discovery.pages().await
    }

    /// Attaches to an existing target.
    ///
    /// # Errors
    ///
    /// See [`Manager::attach`].
    pub async fn attach(&self, info: &TargetInfo) -> Result<Target> {
        self.inner.manager.attach(info).await
    }

    /// Closes a target.
    ///
    /// # Errors
    ///
    /// See [`Manager::close`].
    pub async fn close_target(&self, target: &Target) -> Result<()> {
        self.inner.manager.close(target).await
    }
}

// ============================================================================
// Browser - Accessors
// ============================================================================

impl Browser {
    /// Returns the metadata reported by `/json/version` at connect time.
    #[inline]
    #[must_use]
    pub fn version(&self) -> &BrowserVersion {
        &self.inner.version
    }

    /// Queries `Browser.getVersion` over the root connection.
    ///
    /// # Errors
    ///
    /// See [`Connection::call`].
    pub async fn protocol_version(&self) -> Result<GetVersionResponse> {
        self.connection().call(&GetVersion {}, None).await
    }

    /// Returns the root connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        self.inner.manager.root()
    }

    /// Returns the target manager.
    #[inline]
    #[must_use]
    pub fn manager(&self) -> &Manager {
        &self.inner.manager
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BrowserConfig {
        &self.inner.config
    }

    /// Returns `true` once closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.manager.is_closed()
    }

    /// Closes every tracked target and the root connection. Idempotent.
    ///
    /// The browser process keeps running.
    pub async fn close(&self) {
        self.inner.manager.close_all().await;
    }
}
