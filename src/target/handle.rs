//! Target handle and its session state.
//!
//! A [`Target`] is a cheap, cloneable handle to one debuggable surface. It
//! moves through `Created → Attached → Closed`; `Closed` is terminal and
//! every operation on a closed target fails with [`Error::TargetClosed`]
//! before anything is written to the wire.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::stream::BoxStream;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{BrowserContextId, SessionId, TargetId};
use crate::protocol::target::GetTargetInfo;
use crate::protocol::{Command, Event, TargetInfo};
use crate::transport::{Connection, EventFilter, EventStream};

use super::manager::{Manager, ManagerInner};

// ============================================================================
// Session
// ============================================================================

/// An attached conversation with a target.
#[derive(Debug, Clone)]
pub struct Session {
    /// Connection the session's traffic flows over.
    pub connection: Connection,
    /// Flat-mode session ID; `None` on a dedicated connection.
    pub session_id: Option<SessionId>,
}

impl Session {
    /// A session sharing the root connection through a session ID.
    #[inline]
    #[must_use]
    pub fn multiplexed(connection: Connection, session_id: SessionId) -> Self {
        Self {
            connection,
            session_id: Some(session_id),
        }
    }

    /// A session owning its own connection.
    #[inline]
    #[must_use]
    pub fn dedicated(connection: Connection) -> Self {
        Self {
            connection,
            session_id: None,
        }
    }

    /// Returns `true` if the session has its own connection.
    #[inline]
    #[must_use]
    pub fn is_dedicated(&self) -> bool {
        self.session_id.is_none()
    }
}

// ============================================================================
// TargetState
// ============================================================================

/// Lifecycle of a target.
#[derive(Debug, Clone)]
pub(crate) enum TargetState {
    /// Known to the browser, no session yet.
    Created,
    /// Session established.
    Attached(Session),
    /// Terminal.
    Closed,
}

// ============================================================================
// Target
// ============================================================================

/// Internal shared state for a target.
struct TargetInner {
    id: TargetId,
    browser_context_id: Option<BrowserContextId>,
    /// The context was created for this target and is disposed with it.
    owns_context: bool,
    state: Mutex<TargetState>,
    /// Browser-level connection for `Target.*` commands.
    root: Connection,
    manager: Weak<ManagerInner>,
}

/// Handle to a debuggable browser surface.
///
/// Commands and subscriptions are routed through the target's session:
/// tagged with its session ID on the shared connection, or sent on its
/// dedicated connection.
///
/// # Example
///
/// ```ignore
/// let target = browser.target().await?;
/// target.send("Page.enable", None).await?;
/// target.send("Page.navigate", Some(json!({"url": "https://example.com"}))).await?;
/// target.close().await?;
/// ```
#[derive(Clone)]
pub struct Target {
    inner: Arc<TargetInner>,
}

impl Target {
    /// Creates a target in the `Created` state.
    pub(crate) fn new(
        id: TargetId,
        browser_context_id: Option<BrowserContextId>,
        owns_context: bool,
        root: Connection,
        manager: Weak<ManagerInner>,
    ) -> Self {
        Self {
            inner: Arc::new(TargetInner {
                id,
                browser_context_id,
                owns_context,
                state: Mutex::new(TargetState::Created),
                root,
                manager,
            }),
        }
    }

    // ========================================================================
    // State Transitions
    // ========================================================================

    /// `Created → Attached`. Fails on any other state.
    pub(crate) fn bind(&self, session: Session) -> Result<()> {
        let mut state = self.inner.state.lock();
        match *state {
            TargetState::Created => {
                *state = TargetState::Attached(session);
                Ok(())
            }
            TargetState::Attached(_) | TargetState::Closed => {
                Err(Error::target_closed(self.inner.id.clone()))
            }
        }
    }

    /// Moves to `Closed` and returns the previous state.
    ///
    /// Returns `None` if already closed, so exactly one caller wins.
    pub(crate) fn mark_closed(&self) -> Option<TargetState> {
        let mut state = self.inner.state.lock();
        match std::mem::replace(&mut *state, TargetState::Closed) {
            TargetState::Closed => None,
            previous => Some(previous),
        }
    }

    /// Returns the active session.
    ///
    /// # Errors
    ///
    /// - [`Error::TargetClosed`] once closed
    /// - [`Error::TargetNotFound`] before a session is bound
    pub fn session(&self) -> Result<Session> {
        match &*self.inner.state.lock() {
            TargetState::Attached(session) => Ok(session.clone()),
            TargetState::Closed => Err(Error::target_closed(self.inner.id.clone())),
            TargetState::Created => Err(Error::target_not_found(self.inner.id.clone())),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the target ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &TargetId {
        &self.inner.id
    }

    /// Returns the flat-mode session ID, if multiplexed and attached.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        match &*self.inner.state.lock() {
            TargetState::Attached(session) => session.session_id.clone(),
            TargetState::Created | TargetState::Closed => None,
        }
    }

    /// Returns the browser context the target lives in.
    #[inline]
    #[must_use]
    pub fn browser_context_id(&self) -> Option<&BrowserContextId> {
        self.inner.browser_context_id.as_ref()
    }

    /// Returns `true` if the browser context was created for this target.
    #[inline]
    #[must_use]
    pub fn owns_context(&self) -> bool {
        self.inner.owns_context
    }

    /// Returns `true` once closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(*self.inner.state.lock(), TargetState::Closed)
    }

    /// Returns the connection carrying this target's traffic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TargetClosed`] once closed.
    pub fn connection(&self) -> Result<Connection> {
        Ok(self.session()?.connection)
    }

    /// Returns the browser-level connection.
    #[inline]
    pub(crate) fn root(&self) -> &Connection {
        &self.inner.root
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Sends a command on this target's session.
    ///
    /// # Errors
    ///
    /// [`Error::TargetClosed`] if closed, otherwise as [`Connection::send`].
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let session = self.session()?;
        session
            .connection
            .send(method, params, session.session_id)
            .await
    }

    /// Sends a command with a per-call timeout.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        request_timeout: Duration,
    ) -> Result<Value> {
        let session = self.session()?;
        session
            .connection
            .send_with_timeout(method, params, session.session_id, request_timeout)
            .await
    }

    /// Sends a typed command on this target's session.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send), plus [`Error::Json`] on a shape mismatch.
    pub async fn call<C: Command>(&self, command: &C) -> Result<C::Response> {
        let session = self.session()?;
        session.connection.call(command, session.session_id).await
    }

    /// Fetches the current description from the browser.
    ///
    /// # Errors
    ///
    /// [`Error::TargetClosed`] if closed, otherwise as [`Connection::call`].
    pub async fn info(&self) -> Result<TargetInfo> {
        if self.is_closed() {
            return Err(Error::target_closed(self.inner.id.clone()));
        }

        let command = GetTargetInfo {
            target_id: self.inner.id.clone(),
        };
        Ok(self.inner.root.call(&command, None).await?.target_info)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Subscribes to this target's events.
    ///
    /// On a shared connection the filter is narrowed to this target's
    /// session.
    ///
    /// # Errors
    ///
    /// [`Error::TargetClosed`] if closed, [`Error::ConnectionClosed`] if the
    /// connection is gone.
    pub fn events(&self, filter: EventFilter) -> Result<EventStream> {
        let session = self.session()?;
        let filter = match session.session_id {
            Some(session_id) => filter.session(session_id),
            None => filter,
        };
        session.connection.events(filter)
    }

    /// Subscribes to one typed event of this target.
    ///
    /// # Errors
    ///
    /// Same as [`events`](Self::events).
    pub fn subscribe<E: Event>(&self) -> Result<BoxStream<'static, E>> {
        let session = self.session()?;
        session.connection.subscribe::<E>(session.session_id)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Closes the target through its manager.
    ///
    /// # Errors
    ///
    /// - [`Error::TargetClosed`] if already closed
    /// - [`Error::ConnectionClosed`] if the manager is gone
    pub async fn close(&self) -> Result<()> {
        let manager = self
            .inner
            .manager
            .upgrade()
            .map(Manager::from_inner)
            .ok_or(Error::ConnectionClosed)?;

        debug!(target_id = %self.inner.id, "Closing target");
        manager.close(self).await
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Target {}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.inner.id)
            .field("session_id", &self.session_id())
            .field("browser_context_id", &self.inner.browser_context_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
