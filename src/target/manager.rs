//! Registry of live targets over one root connection.
//!
//! The manager creates, attaches and closes targets, and keeps its table in
//! step with the browser by watching `Target.*` lifecycle events on the root
//! connection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Manager                     │
//! │         root Connection (browser)            │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ TargetId=A → Session(root, S1)         │  │  multiplexed
//! │  │ TargetId=B → Session(root, S2)         │  │
//! │  │ TargetId=C → Session(ws://…/page/C)    │  │  dedicated
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{BrowserContextId, TargetId};
use crate::protocol::EventFrame;
use crate::protocol::target::{
    AttachToTarget, CloseTarget, CreateBrowserContext, CreateTarget, DetachFromTarget,
    DetachedFromTarget, DisposeBrowserContext, GetTargets, SetDiscoverTargets, TargetCrashed,
    TargetDestroyed, TargetInfo,
};
use crate::transport::{Connection, ConnectionOptions, EventFilter, EventStream};

use super::handle::{Session, Target, TargetState};

// ============================================================================
// Constants
// ============================================================================

/// Untracked destroyed target IDs remembered for in-flight `create`/`attach`.
const DESTROYED_MEMORY: usize = 64;

// ============================================================================
// Options
// ============================================================================

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Share the root connection across targets via session IDs.
    pub multiplex: bool,
    /// Browser websocket URL, used to derive per-target page URLs.
    pub browser_url: String,
    /// Options for dedicated per-target connections.
    pub connection: ConnectionOptions,
}

impl ManagerOptions {
    /// Creates options for the browser at `browser_url`.
    #[must_use]
    pub fn new(browser_url: impl Into<String>) -> Self {
        Self {
            multiplex: false,
            browser_url: browser_url.into(),
            connection: ConnectionOptions::default(),
        }
    }

    /// Sets multiplexed mode.
    #[inline]
    #[must_use]
    pub fn multiplex(mut self, multiplex: bool) -> Self {
        self.multiplex = multiplex;
        self
    }

    /// Sets options for dedicated connections.
    #[inline]
    #[must_use]
    pub fn connection(mut self, options: ConnectionOptions) -> Self {
        self.connection = options;
        self
    }
}

/// Parameters of [`Manager::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    /// Initial URL.
    pub url: String,
    /// Create the target in a fresh browser context.
    pub incognito: bool,
    /// Viewport width.
    pub width: u32,
    /// Viewport height.
    pub height: u32,
}

// ============================================================================
// Manager
// ============================================================================

/// Internal shared state for a manager.
pub(crate) struct ManagerInner {
    root: Connection,
    options: ManagerOptions,
    targets: RwLock<FxHashMap<TargetId, Target>>,
    /// Destroyed targets that were not tracked yet. Guarded by `targets`.
    destroyed: Mutex<VecDeque<TargetId>>,
    closed: AtomicBool,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

/// Creates, tracks and tears down targets.
///
/// Cheap to clone; clones share one registry.
///
/// # Thread Safety
///
/// All operations may be called concurrently. Closing a target is an
/// atomic transition observed by exactly one caller.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

// ============================================================================
// Manager - Constructor
// ============================================================================

impl Manager {
    /// Creates a manager on `root` and enables target discovery.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `options.browser_url` does not parse
    /// - Any error of `Target.setDiscoverTargets`
    pub async fn new(root: Connection, options: ManagerOptions) -> Result<Self> {
        Url::parse(&options.browser_url)?;

        // Subscribed first so lifecycle events racing the call are replayed.
        let events = root.events(EventFilter::new().domain("Target"))?;
        root.call(&SetDiscoverTargets { discover: true }, None).await?;

        let inner = Arc::new(ManagerInner {
            root,
            options,
            targets: RwLock::new(FxHashMap::default()),
            destroyed: Mutex::new(VecDeque::with_capacity(DESTROYED_MEMORY)),
            closed: AtomicBool::new(false),
            watcher: Mutex::new(None),
        });

        let handle = tokio::spawn(watch(events, Arc::downgrade(&inner)));
        *inner.watcher.lock() = Some(handle);

        debug!(multiplex = inner.options.multiplex, "Target manager started");

        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    fn downgrade(&self) -> Weak<ManagerInner> {
        Arc::downgrade(&self.inner)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) || self.inner.root.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }
}

// ============================================================================
// Manager - Accessors
// ============================================================================

impl Manager {
    /// Returns the root connection.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Connection {
        &self.inner.root
    }

    /// Returns `true` if targets share the root connection.
    #[inline]
    #[must_use]
    pub fn is_multiplexed(&self) -> bool {
        self.inner.options.multiplex
    }

    /// Returns `true` once [`close_all`](Self::close_all) ran.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns a tracked target.
    #[must_use]
    pub fn get(&self, target_id: &TargetId) -> Option<Target> {
        self.inner.targets.read().get(target_id).cloned()
    }

    /// Returns all tracked targets.
    #[must_use]
    pub fn targets(&self) -> Vec<Target> {
        self.inner.targets.read().values().cloned().collect()
    }

    /// Returns the number of tracked targets.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.targets.read().len()
    }

    /// Returns `true` if no target is tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Manager - Operations
// ============================================================================

impl Manager {
    /// Creates a target and attaches to it.
    ///
    /// With `incognito`, the target gets a fresh browser context that is
    /// disposed when the target closes.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the manager is closed
    /// - Any error of the `Target.*` commands or of the dedicated connection
    pub async fn create(&self, options: CreateOptions) -> Result<Target> {
        self.ensure_open()?;
        let root = &self.inner.root;

        let context = if options.incognito {
            let created = root.call(&CreateBrowserContext::default(), None).await?;
            Some(created.browser_context_id)
        } else {
            None
        };

        let mut command = CreateTarget::new(options.url.clone());
        command.width = Some(options.width);
        command.height = Some(options.height);
        command.browser_context_id = context.clone();

        let created = match root.call(&command, None).await {
            Ok(created) => created,
            Err(e) => {
                if let Some(context) = context {
                    self.dispose_context(context).await;
                }
                return Err(e);
            }
        };

        let owns_context = context.is_some();
        let target = Target::new(
            created.target_id,
            context,
            owns_context,
            root.clone(),
            self.downgrade(),
        );

        if let Err(e) = self.bind(&target).await {
            warn!(target_id = %target.id(), error = %e, "Attach failed, closing created target");
            let _ = self.teardown(&target, TargetState::Created).await;
            return Err(e);
        }

        let target = self.track(target).await?;
        info!(target_id = %target.id(), url = %options.url, "Target created");
        Ok(target)
    }

    /// Attaches to an existing target.
    ///
    /// Attaching to a target that is already tracked returns the tracked
    /// handle.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the manager is closed
    /// - Any error of `Target.attachToTarget` or of the dedicated connection
    pub async fn attach(&self, info: &TargetInfo) -> Result<Target> {
        self.ensure_open()?;

        if let Some(existing) = self.get(&info.target_id) {
            return Ok(existing);
        }

        let target = Target::new(
            info.target_id.clone(),
            info.browser_context_id.clone(),
            false,
            self.inner.root.clone(),
            self.downgrade(),
        );
        self.bind(&target).await?;

        let target = self.track(target).await?;
        debug!(target_id = %target.id(), "Attached to target");
        Ok(target)
    }

    /// Lists every target the browser knows. Does not touch the registry.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the manager is closed
    /// - Any error of `Target.getTargets`
    pub async fn list(&self) -> Result<Vec<TargetInfo>> {
        self.ensure_open()?;
        let targets = self.inner.root.call(&GetTargets::default(), None).await?;
        Ok(targets.target_infos)
    }

    /// Closes a target.
    ///
    /// The target becomes `Closed` before any wire traffic, so concurrent
    /// closers observe [`Error::TargetClosed`].
    ///
    /// # Errors
    ///
    /// - [`Error::TargetClosed`] if already closed
    /// - [`Error::ConnectionClosed`] if the manager is closed
    /// - Transport errors of `Target.closeTarget`
    pub async fn close(&self, target: &Target) -> Result<()> {
        if target.is_closed() {
            return Err(Error::target_closed(target.id().clone()));
        }
        self.ensure_open()?;
        self.close_target(target).await
    }

    /// Closes every tracked target, then the root connection. Idempotent.
    ///
    /// Afterwards every operation fails with [`Error::ConnectionClosed`].
    pub async fn close_all(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let targets = self.targets();
        let count = targets.len();
        for target in targets {
            if let Err(e) = self.close_target(&target).await
                && !e.is_target_closed()
            {
                warn!(target_id = %target.id(), error = %e, "Failed to close target");
            }
        }

        if let Some(watcher) = self.inner.watcher.lock().take() {
            watcher.abort();
        }

        self.inner.root.close();
        info!(count, "Target manager closed");
    }
}

// ============================================================================
// Manager - Internals
// ============================================================================

impl Manager {
    /// Establishes a session for a `Created` target.
    async fn bind(&self, target: &Target) -> Result<()> {
        let session = if self.inner.options.multiplex {
            let command = AttachToTarget {
                target_id: target.id().clone(),
                flatten: Some(true),
            };
            let attached = self.inner.root.call(&command, None).await?;
            Session::multiplexed(self.inner.root.clone(), attached.session_id)
        } else {
            let url = page_url(&self.inner.options.browser_url, target.id())?;
            let connection = Connection::open(&url, self.inner.options.connection.clone()).await?;
            Session::dedicated(connection)
        };

        if let Err(e) = target.bind(session.clone()) {
            self.release(target.id(), session).await;
            return Err(e);
        }
        Ok(())
    }

    /// Inserts an attached target, resolving races with concurrent callers
    /// and with the browser destroying it before it could be tracked.
    async fn track(&self, target: Target) -> Result<Target> {
        enum Outcome {
            Inserted,
            Existing(Target),
            Destroyed,
            Closed,
        }

        let outcome = {
            let mut targets = self.inner.targets.write();
            if self.inner.closed.load(Ordering::Acquire) {
                Outcome::Closed
            } else if let Some(existing) = targets.get(target.id()) {
                Outcome::Existing(existing.clone())
            } else if self.inner.destroyed.lock().contains(target.id()) {
                Outcome::Destroyed
            } else {
                targets.insert(target.id().clone(), target.clone());
                Outcome::Inserted
            }
        };

        match outcome {
            Outcome::Inserted => Ok(target),
            Outcome::Existing(existing) => {
                debug!(target_id = %target.id(), "Target attached concurrently, keeping first");
                if let Some(TargetState::Attached(session)) = target.mark_closed() {
                    self.release(target.id(), session).await;
                }
                Ok(existing)
            }
            Outcome::Destroyed => {
                debug!(target_id = %target.id(), "Target destroyed before it was tracked");
                if let Some(TargetState::Attached(session)) = target.mark_closed() {
                    invalidate(target.id(), &session);
                }
                if target.owns_context()
                    && let Some(context) = target.browser_context_id()
                {
                    self.dispose_context(context.clone()).await;
                }
                Err(Error::target_closed(target.id().clone()))
            }
            Outcome::Closed => {
                if let Some(state) = target.mark_closed() {
                    let _ = self.teardown(&target, state).await;
                }
                Err(Error::ConnectionClosed)
            }
        }
    }

    /// Closes a target that may still be open; shared by `close` and `close_all`.
    async fn close_target(&self, target: &Target) -> Result<()> {
        let previous = target
            .mark_closed()
            .ok_or_else(|| Error::target_closed(target.id().clone()))?;

        let result = self.teardown(target, previous).await;
        self.inner.targets.write().remove(target.id());

        info!(target_id = %target.id(), "Target closed");
        result
    }

    /// Closes the target in the browser and releases local resources.
    async fn teardown(&self, target: &Target, previous: TargetState) -> Result<()> {
        let root = target.root();
        let command = CloseTarget {
            target_id: target.id().clone(),
        };

        let result = match root.call(&command, None).await {
            Ok(_) => Ok(()),
            Err(Error::Protocol { message, .. }) => {
                debug!(target_id = %target.id(), %message, "Target already gone");
                Ok(())
            }
            Err(e) => Err(e),
        };

        if target.owns_context()
            && let Some(context) = target.browser_context_id()
        {
            self.dispose_context(context.clone()).await;
        }

        if let TargetState::Attached(session) = previous {
            invalidate(target.id(), &session);
        }

        result
    }

    /// Drops a session that lost a race or failed to bind.
    async fn release(&self, target_id: &TargetId, session: Session) {
        match &session.session_id {
            Some(session_id) => {
                let command = DetachFromTarget {
                    session_id: session_id.clone(),
                };
                if let Err(e) = self.inner.root.call(&command, None).await {
                    debug!(%target_id, error = %e, "Detach failed");
                }
            }
            None => session.connection.close(),
        }
    }

    /// Disposes a browser context, logging failures.
    async fn dispose_context(&self, browser_context_id: BrowserContextId) {
        let command = DisposeBrowserContext {
            browser_context_id: browser_context_id.clone(),
        };
        if let Err(e) = self.inner.root.call(&command, None).await {
            warn!(%browser_context_id, error = %e, "Failed to dispose browser context");
        }
    }
}

impl ManagerInner {
    /// Applies a browser-side `Target.*` lifecycle event.
    async fn reconcile(self: &Arc<Self>, frame: &EventFrame) {
        let target_id = if frame.is::<TargetDestroyed>() {
            frame.parse::<TargetDestroyed>().ok().map(|e| e.target_id)
        } else if frame.is::<TargetCrashed>() {
            frame.parse::<TargetCrashed>().ok().map(|e| {
                warn!(target_id = %e.target_id, status = %e.status, "Target crashed");
                e.target_id
            })
        } else if frame.is::<DetachedFromTarget>() {
            frame
                .parse::<DetachedFromTarget>()
                .ok()
                .and_then(|e| self.target_for_session(&e))
        } else {
            None
        };

        let Some(target_id) = target_id else {
            return;
        };

        let removed = {
            let mut targets = self.targets.write();
            let removed = targets.remove(&target_id);
            if removed.is_none() && !frame.is::<DetachedFromTarget>() {
                self.remember_destroyed(target_id.clone());
            }
            removed
        };
        let Some(target) = removed else {
            return;
        };

        let Some(previous) = target.mark_closed() else {
            return;
        };

        info!(%target_id, event = %frame.method, "Target closed by browser");

        if let TargetState::Attached(session) = previous {
            invalidate(&target_id, &session);
        }

        if target.owns_context()
            && let Some(context) = target.browser_context_id()
        {
            Manager::from_inner(Arc::clone(self))
                .dispose_context(context.clone())
                .await;
        }
    }

    /// Records an untracked destroyed target. Callers hold the `targets` lock.
    fn remember_destroyed(&self, target_id: TargetId) {
        let mut destroyed = self.destroyed.lock();
        if destroyed.contains(&target_id) {
            return;
        }
        if destroyed.len() == DESTROYED_MEMORY {
            destroyed.pop_front();
        }
        destroyed.push_back(target_id);
    }

    /// Finds the tracked target a detach event refers to.
    fn target_for_session(&self, event: &DetachedFromTarget) -> Option<TargetId> {
        let targets = self.targets.read();
        targets
            .values()
            .find(|target| target.session_id().as_ref() == Some(&event.session_id))
            .map(|target| target.id().clone())
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.get_mut().take() {
            watcher.abort();
        }
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("multiplex", &self.inner.options.multiplex)
            .field("targets", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Watches root-connection `Target.*` events until the stream or manager ends.
async fn watch(mut events: EventStream, manager: Weak<ManagerInner>) {
    while let Some(frame) = events.next().await {
        let Some(inner) = manager.upgrade() else {
            break;
        };
        inner.reconcile(&frame).await;
    }
    debug!("Target watcher stopped");
}

/// Fails a closed target's in-flight calls and releases its connection.
fn invalidate(target_id: &TargetId, session: &Session) {
    match &session.session_id {
        Some(session_id) => {
            session.connection.detach_session(session_id, target_id);
        }
        None => session.connection.close(),
    }
}

/// Derives a target's page endpoint from the browser endpoint.
///
/// `ws://host:9222/devtools/browser/<id>` → `ws://host:9222/devtools/page/<target>`
pub(crate) fn page_url(browser_url: &str, target_id: &TargetId) -> Result<String> {
    let mut url = Url::parse(browser_url)?;
    url.set_path(&format!("/devtools/page/{target_id}"));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.into())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use futures_util::SinkExt;
    use serde_json::{Value, json};
    use tokio::io::{DuplexStream, duplex};
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use crate::identifiers::SessionId;

    const BROWSER_URL: &str = "ws://127.0.0.1:9222/devtools/browser/test";

    type Peer = WebSocketStream<DuplexStream>;

    async fn root_pair() -> (Connection, Peer) {
        let (client, server) = duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
        (Connection::from_stream(client, ConnectionOptions::default()), server)
    }

    async fn next_request(peer: &mut Peer) -> Value {
        loop {
            match peer.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).expect("request json");
                }
                Some(Ok(_)) => continue,
                other => panic!("unexpected peer read: {other:?}"),
            }
        }
    }

    async fn reply(peer: &mut Peer, frame: Value) {
        peer.send(Message::Text(frame.to_string().into()))
            .await
            .expect("peer send");
    }

    /// Starts a manager, answering `Target.setDiscoverTargets` with `answer`.
    async fn start(answer: Value) -> (Connection, Result<Manager>, Peer) {
        let (root, mut peer) = root_pair().await;
        let starting = tokio::spawn(Manager::new(root.clone(), ManagerOptions::new(BROWSER_URL)));

        let request = next_request(&mut peer).await;
        assert_eq!(request["method"], "Target.setDiscoverTargets");
        let mut frame = answer;
        frame["id"] = request["id"].clone();
        reply(&mut peer, frame).await;

        (root, starting.await.expect("join"), peer)
    }

    async fn started() -> (Manager, Peer) {
        let (_, manager, peer) = start(json!({"result": {}})).await;
        (manager.expect("manager"), peer)
    }

    #[tokio::test]
    async fn test_failed_start_leaves_no_watcher() {
        let (root, manager, _peer) =
            start(json!({"error": {"code": -32000, "message": "Not allowed"}})).await;

        assert!(matches!(manager, Err(Error::Protocol { .. })));
        assert_eq!(root.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_manager_stops_watcher() {
        let (manager, _peer) = started().await;
        let root = manager.root().clone();
        assert_eq!(root.subscriber_count(), 1);

        drop(manager);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while root.subscriber_count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(root.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_destroyed_before_tracking_is_refused() {
        let (manager, _peer) = started().await;
        let root = manager.root().clone();

        let destroyed = EventFrame::new(
            "Target.targetDestroyed",
            json!({"targetId": "T9"}),
            None,
        );
        manager.inner.reconcile(&destroyed).await;

        let target = Target::new(TargetId::from("T9"), None, false, root.clone(), manager.downgrade());
        target
            .bind(Session::multiplexed(root, SessionId::from("S9")))
            .expect("bind");

        let err = manager.track(target.clone()).await.expect_err("destroyed");
        assert!(matches!(err, Error::TargetClosed { ref target_id } if target_id.as_str() == "T9"));
        assert!(target.is_closed());
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_destroyed_memory_is_bounded() {
        let (manager, _peer) = started().await;

        for n in 0..DESTROYED_MEMORY + 10 {
            let frame = EventFrame::new(
                "Target.targetDestroyed",
                json!({"targetId": format!("T{n}")}),
                None,
            );
            manager.inner.reconcile(&frame).await;
        }

        let destroyed = manager.inner.destroyed.lock();
        assert_eq!(destroyed.len(), DESTROYED_MEMORY);
        assert!(!destroyed.contains(&TargetId::from("T0")));
    }

    #[test]
    fn test_page_url() {
        let url = page_url(
            "ws://127.0.0.1:9222/devtools/browser/4b1f-aa",
            &TargetId::from("ABCDEF"),
        )
        .expect("url");
        assert_eq!(url, "ws://127.0.0.1:9222/devtools/page/ABCDEF");
    }

    #[test]
    fn test_page_url_invalid() {
        assert!(matches!(
            page_url("not a url", &TargetId::from("T")),
            Err(Error::Url(_))
        ));
    }

    #[test]
    fn test_manager_options() {
        let options = ManagerOptions::new("ws://localhost:9222/devtools/browser/x").multiplex(true);
        assert!(options.multiplex);
        assert_eq!(options.connection, ConnectionOptions::default());
    }

    #[test]
    fn test_manager_is_clone_send_sync() {
        fn assert_clone<T: Clone>() {}
        fn assert_send_sync<T: Send + Sync>() {}
        assert_clone::<Manager>();
        assert_send_sync::<Manager>();
    }
}
