//! Event hub: fan-out of decoded events with a bounded replay window.
//!
//! The hub publishes every event unfiltered. Each subscriber first receives
//! the replay window (most recent frames, oldest first), then live frames.
//! Snapshotting the window and joining the live channel happen under the
//! same lock as publishing, so a subscriber sees no duplicate and no gap.
//!
//! Delivery to subscribers goes through a bounded broadcast channel. A
//! subscriber that falls behind loses its oldest undelivered frames; the
//! publisher never waits.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::ready;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::{Event, EventFrame};

// ============================================================================
// EventFilter
// ============================================================================

/// Per-subscriber view over the event flow.
///
/// An empty filter matches every frame.
///
/// ```ignore
/// let filter = EventFilter::new().domain("Page").session(session_id);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    domain: Option<String>,
    event: Option<String>,
    session_id: Option<SessionId>,
}

impl EventFilter {
    /// Creates a filter that matches everything.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one domain (`"Page"`).
    #[inline]
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Restricts to one event name within the domain (`"loadEventFired"`).
    #[inline]
    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Restricts to one full method (`"Page.loadEventFired"`).
    #[must_use]
    pub fn method(self, method: &str) -> Self {
        match method.split_once('.') {
            Some((domain, event)) => self.domain(domain).event(event),
            None => self.domain(method),
        }
    }

    /// Restricts to frames emitted on one session.
    #[inline]
    #[must_use]
    pub fn session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Returns the session restriction, if any.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Returns `true` if `frame` passes every restriction.
    #[must_use]
    pub fn matches(&self, frame: &EventFrame) -> bool {
        if let Some(domain) = &self.domain
            && frame.domain() != domain
        {
            return false;
        }

        if let Some(event) = &self.event
            && frame.event_name() != event
        {
            return false;
        }

        if let Some(session_id) = &self.session_id
            && frame.session_id.as_ref() != Some(session_id)
        {
            return false;
        }

        true
    }
}

// ============================================================================
// EventStream
// ============================================================================

/// Subscription to a connection's events.
///
/// Ends when the connection closes. Dropping it unsubscribes.
pub struct EventStream {
    inner: BoxStream<'static, Arc<EventFrame>>,
}

impl EventStream {
    /// Narrows the stream to one typed event.
    ///
    /// Frames whose params do not deserialize into `E` are logged and skipped.
    #[must_use]
    pub fn typed<E: Event>(self) -> BoxStream<'static, E> {
        self.filter_map(|frame| {
            ready(if frame.is::<E>() {
                match frame.parse::<E>() {
                    Ok(event) => Some(event),
                    Err(e) => {
                        warn!(method = E::METHOD, error = %e, "Failed to parse event params");
                        None
                    }
                }
            } else {
                None
            })
        })
        .boxed()
    }
}

impl Stream for EventStream {
    type Item = Arc<EventFrame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

// ============================================================================
// EventHub
// ============================================================================

/// Hub contents guarded by one lock.
struct HubState {
    /// Most recent frames, oldest first.
    history: VecDeque<Arc<EventFrame>>,
    /// Live channel; `None` once closed.
    sender: Option<broadcast::Sender<Arc<EventFrame>>>,
}

/// Broadcast point for one connection's events.
pub struct EventHub {
    state: Mutex<HubState>,
    replay_size: usize,
}

impl EventHub {
    /// Creates a hub.
    ///
    /// # Arguments
    ///
    /// * `replay_size` - Frames replayed to new subscribers (at least 1)
    /// * `subscriber_capacity` - Frames a subscriber may lag before losing the oldest
    #[must_use]
    pub fn new(replay_size: usize, subscriber_capacity: usize) -> Self {
        let replay_size = replay_size.max(1);
        let (sender, _) = broadcast::channel(subscriber_capacity.max(1));

        Self {
            state: Mutex::new(HubState {
                history: VecDeque::with_capacity(replay_size),
                sender: Some(sender),
            }),
            replay_size,
        }
    }

    /// Publishes a frame to the replay window and every live subscriber.
    ///
    /// Frames published after [`close`](Self::close) are dropped.
    pub fn publish(&self, frame: EventFrame) {
        let frame = Arc::new(frame);
        let mut state = self.state.lock();

        let Some(sender) = state.sender.clone() else {
            trace!(method = %frame.method, "Event dropped after hub close");
            return;
        };

        state.history.push_back(Arc::clone(&frame));
        while state.history.len() > self.replay_size {
            state.history.pop_front();
        }

        // No receivers is fine.
        let _ = sender.send(frame);
    }

    /// Subscribes with a filter applied to this subscriber only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the hub is closed.
    pub fn subscribe(&self, filter: EventFilter) -> Result<EventStream> {
        let (replay, receiver) = {
            let state = self.state.lock();
            let sender = state.sender.as_ref().ok_or(Error::ConnectionClosed)?;
            let replay: Vec<Arc<EventFrame>> = state.history.iter().cloned().collect();
            (replay, sender.subscribe())
        };

        let live = BroadcastStream::new(receiver).filter_map(|item| {
            ready(match item {
                Ok(frame) => Some(frame),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged, oldest frames dropped");
                    None
                }
            })
        });

        let inner = stream::iter(replay)
            .chain(live)
            .filter(move |frame| ready(filter.matches(frame)))
            .boxed();

        Ok(EventStream { inner })
    }

    /// Ends every subscription and rejects new ones. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.sender = None;
        state.history.clear();
    }

    /// Returns `true` once closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().sender.is_none()
    }

    /// Returns the number of live subscribers.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .sender
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Returns the replay window size.
    #[inline]
    #[must_use]
    pub fn replay_size(&self) -> usize {
        self.replay_size
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("replay_size", &self.replay_size)
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
