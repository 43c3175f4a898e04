//! WebSocket connection and receive loop.
//!
//! A [`Connection`] owns one websocket to a debugger endpoint. It correlates
//! command responses with their callers and fans decoded events out through
//! the [`EventHub`].
//!
//! # Event Loop
//!
//! The connection spawns one tokio task that handles:
//!
//! - Outgoing command frames queued by callers
//! - Incoming responses, resolved through the [`CallRegistry`]
//! - Incoming events, published to the hub
//! - Malformed frames, logged and reported on a diagnostics channel
//!
//! Callers never block the loop. When the loop exits, for any reason, every
//! pending call fails with [`Error::ConnectionClosed`] and every event
//! stream ends.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, RequestIdGenerator, SessionId, TargetId};
use crate::protocol::target::DetachedFromTarget;
use crate::protocol::{Command, Event, EventFrame, Frame, Request, decode, encode};

use super::hub::{EventFilter, EventHub, EventStream};
use super::registry::{CallRegistry, PendingGuard};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the websocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default replay window of the event hub.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 128;

/// Default per-subscriber backlog before the oldest frames are dropped.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// Default cap on concurrently pending calls.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Backlog of the malformed-frame diagnostics channel.
const MALFORMED_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Tuning for a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Frames replayed to late event subscribers (at least 1).
    pub event_buffer_size: usize,
    /// Frames a subscriber may lag before losing the oldest.
    pub subscriber_capacity: usize,
    /// Deadline applied by [`Connection::send`].
    pub request_timeout: Duration,
    /// Deadline for the websocket handshake in [`Connection::open`].
    pub handshake_timeout: Duration,
    /// Cap on concurrently pending calls.
    pub max_pending: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl ConnectionOptions {
    /// Creates options with defaults.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the replay window, clamped to at least 1.
    #[inline]
    #[must_use]
    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size.max(1);
        self
    }

    /// Sets the per-subscriber backlog.
    #[inline]
    #[must_use]
    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the pending-call cap.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max: usize) -> Self {
        self.max_pending = max.max(1);
        self
    }
}

// ============================================================================
// MalformedFrame
// ============================================================================

/// An inbound frame the receive loop could not decode.
#[derive(Debug, Clone)]
pub struct MalformedFrame {
    /// Raw frame text.
    pub text: String,
    /// Why decoding failed.
    pub reason: String,
    /// When the frame was read.
    pub received_at: SystemTime,
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write an encoded command frame.
    Send { id: RequestId, text: String },
    /// Close the socket and stop.
    Shutdown,
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between handles and the event loop.
///
/// The loop holds only this, not the command sender, so dropping every
/// handle ends the loop.
struct Shared {
    registry: CallRegistry,
    hub: EventHub,
    malformed_tx: broadcast::Sender<MalformedFrame>,
    closed: AtomicBool,
}

impl Shared {
    /// Marks the connection closed and releases everyone waiting on it.
    ///
    /// Returns `true` for the first caller only.
    fn shut(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        self.registry.fail_all(|| Error::ConnectionClosed);
        self.hub.close();
        first
    }
}

/// Handle-side state.
struct ConnectionInner {
    url: Option<String>,
    ids: RequestIdGenerator,
    request_timeout: Duration,
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    shared: Arc<Shared>,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to a debugger endpoint.
///
/// Cheap to clone; clones share one socket, one registry and one hub.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Opens a connection to a `ws://` endpoint.
    ///
    /// Debugging endpoints speak plain websocket; `wss://` is rejected. Use
    /// [`from_stream`](Self::from_stream) to run over a transport set up
    /// elsewhere.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `url` does not parse
    /// - [`Error::Config`] if the scheme is not `ws`
    /// - [`Error::ConnectionFailed`] if the handshake fails or exceeds
    ///   `options.handshake_timeout`
    pub async fn open(url: &str, options: ConnectionOptions) -> Result<Self> {
        let parsed = Url::parse(url)?;
        if parsed.scheme() != "ws" {
            return Err(Error::config(format!("Expected a ws:// URL, got {url}")));
        }

        let handshake_ms = options.handshake_timeout.as_millis() as u64;
        let (ws_stream, _) = timeout(options.handshake_timeout, connect_async(url))
            .await
            .map_err(|_| {
                Error::connection_failed(format!(
                    "Handshake with {url} timed out after {handshake_ms}ms"
                ))
            })?
            .map_err(|e| Error::connection_failed(format!("Handshake with {url} failed: {e}")))?;

        debug!(%url, "WebSocket connected");

        Ok(Self::spawn(ws_stream, options, Some(url.to_string())))
    }

    /// Wraps an established websocket.
    ///
    /// Spawns the event loop, so this must run inside a tokio runtime.
    pub fn from_stream<S>(ws_stream: WebSocketStream<S>, options: ConnectionOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn(ws_stream, options, None)
    }

    fn spawn<S>(ws_stream: WebSocketStream<S>, options: ConnectionOptions, url: Option<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (malformed_tx, _) = broadcast::channel(MALFORMED_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            registry: CallRegistry::new(options.max_pending),
            hub: EventHub::new(options.event_buffer_size, options.subscriber_capacity),
            malformed_tx,
            closed: AtomicBool::new(false),
        });

        tokio::spawn(run_event_loop(ws_stream, command_rx, Arc::clone(&shared)));

        Self {
            inner: Arc::new(ConnectionInner {
                url,
                ids: RequestIdGenerator::default(),
                request_timeout: options.request_timeout,
                command_tx,
                shared,
            }),
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Sends a command with the connection's default timeout.
    ///
    /// A `None` payload is sent as an empty object.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is or becomes closed
    /// - [`Error::RequestTimeout`] if no response arrives in time
    /// - [`Error::Protocol`] if the browser answers with an error object
    /// - [`Error::TargetClosed`] if the session is detached while pending
    /// - [`Error::TooManyPendingCalls`] if the pending-call cap is reached
    pub async fn send(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Result<Value> {
        self.send_with_timeout(method, params, session_id, self.inner.request_timeout)
            .await
    }

    /// Sends a command with a per-call timeout.
    ///
    /// Dropping the returned future releases the pending slot; a response
    /// arriving afterwards is discarded.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<SessionId>,
        request_timeout: Duration,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let shared = &self.inner.shared;
        let id = self.inner.ids.next_id();
        let text = encode(&Request::new(id, method, params, session_id.clone()))?;

        let receiver = shared.registry.register(id, method, session_id)?;
        let _guard = PendingGuard::new(&shared.registry, id);

        self.inner
            .command_tx
            .send(ConnectionCommand::Send { id, text })
            .map_err(|_| Error::ConnectionClosed)?;

        trace!(%id, method, "Request queued");

        match timeout(request_timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                debug!(%id, method, "Request timed out");
                Err(Error::request_timeout(
                    id,
                    method,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Sends a typed command and deserializes its response.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send), plus [`Error::Json`] if the result does
    /// not match `C::Response`.
    pub async fn call<C: Command>(
        &self,
        command: &C,
        session_id: Option<SessionId>,
    ) -> Result<C::Response> {
        let value = self
            .send(C::METHOD, Some(command.to_params()?), session_id)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Subscribes to events through `filter`.
    ///
    /// The stream starts with the replay window, then live frames, and ends
    /// when the connection closes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] after close.
    pub fn events(&self, filter: EventFilter) -> Result<EventStream> {
        self.inner.shared.hub.subscribe(filter)
    }

    /// Subscribes to one typed event, optionally scoped to a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] after close.
    pub fn subscribe<E: Event>(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<BoxStream<'static, E>> {
        let mut filter = EventFilter::new().method(E::METHOD);
        if let Some(session_id) = session_id {
            filter = filter.session(session_id);
        }
        Ok(self.events(filter)?.typed::<E>())
    }

    /// Diagnostics channel for inbound frames that failed to decode.
    #[must_use]
    pub fn malformed_frames(&self) -> broadcast::Receiver<MalformedFrame> {
        self.inner.shared.malformed_tx.subscribe()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Fails every call pending on `session_id` with [`Error::TargetClosed`].
    ///
    /// Returns how many calls were failed.
    pub fn detach_session(&self, session_id: &SessionId, target_id: &TargetId) -> usize {
        let count = self
            .inner
            .shared
            .registry
            .reject_session(session_id, || Error::target_closed(target_id.clone()));
        if count > 0 {
            debug!(%session_id, %target_id, count, "Failed calls of detached session");
        }
        count
    }

    /// Closes the connection. Idempotent.
    ///
    /// Pending calls fail with [`Error::ConnectionClosed`] and event streams
    /// end before this returns. The socket is closed by the event loop.
    pub fn close(&self) {
        if self.inner.shared.shut() {
            debug!(url = ?self.inner.url, "Connection closed");
        }
        let _ = self.inner.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Returns `true` once closed locally or by the remote end.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.shared.closed.load(Ordering::Acquire)
    }

    /// Returns the number of pending calls.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.shared.registry.len()
    }

    /// Returns the number of live event subscriptions.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.shared.hub.subscriber_count()
    }

    /// Returns the endpoint URL, if opened by URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.inner.url.as_deref()
    }

    /// Returns the default request timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    /// Returns `true` if both handles share one underlying connection.
    #[inline]
    #[must_use]
    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.inner.url)
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Event loop that owns the socket.
async fn run_event_loop<S>(
    ws_stream: WebSocketStream<S>,
    mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    shared: Arc<Shared>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        handle_incoming(text.as_str(), &shared);
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!("WebSocket closed by remote");
                        break;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        break;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }

                    // Binary, Ping, Pong, Frame
                    Some(Ok(_)) => {}
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(ConnectionCommand::Send { id, text }) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            warn!(%id, error = %e, "Failed to write request");
                            shared.registry.reject(id, Error::WebSocket(e));
                            break;
                        }
                        trace!(%id, "Request sent");
                    }

                    Some(ConnectionCommand::Shutdown) => {
                        debug!("Shutdown command received");
                        let _ = ws_write.close().await;
                        break;
                    }

                    None => {
                        debug!("All connection handles dropped");
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    shared.shut();

    debug!("Event loop terminated");
}

/// Routes one inbound text frame.
fn handle_incoming(text: &str, shared: &Shared) {
    match decode(text) {
        Ok(Frame::Response(response)) => {
            let id = response.id;
            trace!(%id, error = response.is_error(), "Response received");
            shared.registry.complete(id, response.into_result());
        }

        Ok(Frame::Event(frame)) => publish_event(frame, shared),

        Ok(Frame::Either(response, frame)) => {
            let id = response.id;
            if !shared.registry.complete(id, response.into_result()) {
                trace!(%id, method = %frame.method, "Unmatched id, treating frame as event");
                publish_event(frame, shared);
            }
        }

        Err(e) => {
            warn!(error = %e, len = text.len(), "Discarding malformed frame");
            let _ = shared.malformed_tx.send(MalformedFrame {
                text: text.to_string(),
                reason: e.to_string(),
                received_at: SystemTime::now(),
            });
        }
    }
}

/// Publishes an event, first failing calls of a session it detaches.
fn publish_event(frame: EventFrame, shared: &Shared) {
    trace!(method = %frame.method, session = ?frame.session_id, "Event received");

    if frame.is::<DetachedFromTarget>()
        && let Ok(detached) = frame.parse::<DetachedFromTarget>()
        && let Some(target_id) = detached.target_id
    {
        let count = shared
            .registry
            .reject_session(&detached.session_id, || Error::target_closed(target_id.clone()));
        if count > 0 {
            debug!(session = %detached.session_id, count, "Failed calls of detached session");
        }
    }

    shared.hub.publish(frame);
}

// ============================================================================
// Tests
// ============================================================================
