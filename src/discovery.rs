//! HTTP discovery against the browser's debugging port.
//!
//! A browser started with `--remote-debugging-port` serves two JSON
//! endpoints next to its websocket:
//!
//! | Endpoint | Returns |
//! |----------|---------|
//! | `/json/version` | Browser metadata and the browser-level websocket URL |
//! | `/json/list` | Inspectable pages, each with its own websocket URL |
//!
//! # Example
//!
//! ```no_run
//! use chrome_debugger::discovery::Discovery;
//!
//! # async fn example() -> chrome_debugger::Result<()> {
//! let discovery = Discovery::new("localhost:9222")?;
//! let version = discovery.version().await?;
//! println!("{} at {}", version.browser, version.web_socket_debugger_url);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::TargetId;
use crate::transport::{Connection, ConnectionOptions};

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP timeout for discovery requests.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Types
// ============================================================================

/// Response of `/json/version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserVersion {
    /// Product (`Chrome/120.0.6099.71`).
    #[serde(rename = "Browser")]
    pub browser: String,

    /// Protocol version (`1.3`).
    #[serde(rename = "Protocol-Version")]
    pub protocol_version: String,

    /// User agent.
    #[serde(rename = "User-Agent")]
    pub user_agent: String,

    /// V8 version.
    #[serde(rename = "V8-Version", default, skip_serializing_if = "Option::is_none")]
    pub v8_version: Option<String>,

    /// WebKit version.
    #[serde(rename = "WebKit-Version", default, skip_serializing_if = "Option::is_none")]
    pub webkit_version: Option<String>,

    /// Browser-level websocket endpoint.
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

/// One entry of `/json/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectablePage {
    /// Target ID.
    pub id: TargetId,

    /// Target type (`page`, `service_worker`, ...).
    #[serde(rename = "type")]
    pub page_type: String,

    /// Current title.
    #[serde(default)]
    pub title: String,

    /// Current URL.
    #[serde(default)]
    pub url: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// DevTools frontend link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devtools_frontend_url: Option<String>,

    /// Page-level websocket endpoint; absent while another client is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_socket_debugger_url: Option<String>,
}

impl InspectablePage {
    /// Returns `true` for top-level pages.
    #[inline]
    #[must_use]
    pub fn is_page(&self) -> bool {
        self.page_type == "page"
    }

    /// Opens a dedicated connection to this page.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the page exposes no websocket URL
    /// - [`Error::ConnectionFailed`] if the handshake fails
    pub async fn connect(&self, options: ConnectionOptions) -> Result<Connection> {
        let url = self.web_socket_debugger_url.as_deref().ok_or_else(|| {
            Error::config(format!(
                "Page {} exposes no websocket URL; another client may be attached",
                self.id
            ))
        })?;

        Connection::open(url, options).await
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// HTTP client bound to one debugging address.
#[derive(Debug, Clone)]
pub struct Discovery {
    client: Client,
    base: Url,
}

impl Discovery {
    /// Creates a discovery client for `address`.
    ///
    /// `address` is `host:port` or a full `http://` URL. Debugging ports serve
    /// plain HTTP, so `https://` is rejected.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the address does not parse
    /// - [`Error::Config`] if the scheme is not `http`
    /// - [`Error::Http`] if the HTTP client cannot be built
    pub fn new(address: &str) -> Result<Self> {
        Self::with_timeout(address, DEFAULT_HTTP_TIMEOUT)
    }

    /// Creates a discovery client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_timeout(address: &str, timeout: Duration) -> Result<Self> {
        let base = http_base(address)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    /// Returns the HTTP base URL.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Fetches `/json/version`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionFailed`] on transport failure, non-success status
    ///   or a body that is not the expected JSON
    pub async fn version(&self) -> Result<BrowserVersion> {
        self.get_json("json/version").await
    }

    /// Fetches `/json/list`.
    ///
    /// # Errors
    ///
    /// Same as [`version`](Self::version).
    pub async fn pages(&self) -> Result<Vec<InspectablePage>> {
        self.get_json("json/list").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base.join(path)?;
        debug!(%url, "Discovery request");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| Error::connection_failed(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::connection_failed(format!(
                "GET {url} returned HTTP {status}"
            )));
        }

        response.json().await.map_err(|e| {
            Error::connection_failed(format!("GET {url} returned an unexpected body: {e}"))
        })
    }
}

// ============================================================================
// Free Functions
// ============================================================================

/// Fetches `/json/version` from `address`.
///
/// # Errors
///
/// See [`Discovery::version`].
pub async fn fetch_version(address: &str) -> Result<BrowserVersion> {
    Discovery::new(address)?.version().await
}

/// Fetches `/json/list` from `address`.
///
/// # Errors
///
/// See [`Discovery::pages`].
pub async fn fetch_pages(address: &str) -> Result<Vec<InspectablePage>> {
    Discovery::new(address)?.pages().await
}

/// Normalizes `host:port` or an HTTP URL into a base URL ending in `/`.
fn http_base(address: &str) -> Result<Url> {
    let mut url = if address.contains("://") {
        Url::parse(address)?
    } else {
        Url::parse(&format!("http://{address}"))?
    };

    if url.scheme() != "http" {
        return Err(Error::config(format!(
            "Expected host:port or an http:// URL, got {address}"
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

// ============================================================================
// Tests
// ============================================================================
