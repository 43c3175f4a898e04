//! Call registry: in-flight request correlation.
//!
//! Maps each outstanding [`RequestId`] to the single-assignment slot its
//! caller awaits. A slot is completed at most once: completion removes the
//! entry, so a duplicate or late response finds nothing and is dropped.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, SessionId};

// ============================================================================
// Types
// ============================================================================

/// Receiving half of a pending call.
pub type CallReceiver = oneshot::Receiver<Result<Value>>;

/// An outstanding command awaiting its response.
#[derive(Debug)]
struct PendingCall {
    /// Method, kept for diagnostics.
    method: String,
    /// Session the command was addressed to.
    session_id: Option<SessionId>,
    /// Result slot.
    slot: oneshot::Sender<Result<Value>>,
}

/// Registry contents guarded by one lock.
#[derive(Debug, Default)]
struct RegistryState {
    calls: FxHashMap<RequestId, PendingCall>,
    closed: bool,
}

// ============================================================================
// CallRegistry
// ============================================================================

/// Thread-safe map of pending calls.
#[derive(Debug)]
pub struct CallRegistry {
    state: Mutex<RegistryState>,
    max_pending: usize,
}

impl CallRegistry {
    /// Creates an empty registry admitting at most `max_pending` calls.
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            max_pending,
        }
    }

    /// Registers a pending call and returns the receiver to await.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the registry was already failed
    /// - [`Error::TooManyPendingCalls`] if the cap is reached
    pub fn register(
        &self,
        id: RequestId,
        method: &str,
        session_id: Option<SessionId>,
    ) -> Result<CallReceiver> {
        let mut state = self.state.lock();

        if state.closed {
            return Err(Error::ConnectionClosed);
        }

        if state.calls.len() >= self.max_pending {
            return Err(Error::TooManyPendingCalls {
                pending: state.calls.len(),
                max: self.max_pending,
            });
        }

        let (slot, receiver) = oneshot::channel();
        state.calls.insert(
            id,
            PendingCall {
                method: method.to_string(),
                session_id,
                slot,
            },
        );

        Ok(receiver)
    }

    /// Resolves a call with its result. Returns `false` for unknown IDs.
    pub fn resolve(&self, id: RequestId, value: Value) -> bool {
        self.complete(id, Ok(value))
    }

    /// Fails a call. Returns `false` for unknown IDs.
    pub fn reject(&self, id: RequestId, error: Error) -> bool {
        self.complete(id, Err(error))
    }

    /// Completes a call with either outcome. Returns `false` for unknown IDs.
    pub fn complete(&self, id: RequestId, outcome: Result<Value>) -> bool {
        let call = self.state.lock().calls.remove(&id);

        match call {
            Some(call) => {
                // Receiver may be gone if the caller was cancelled.
                let _ = call.slot.send(outcome);
                true
            }
            None => {
                debug!(%id, "Response for unknown request dropped");
                false
            }
        }
    }

    /// Removes a call without completing it (timeout or cancellation).
    pub fn remove(&self, id: RequestId) -> bool {
        self.state.lock().calls.remove(&id).is_some()
    }

    /// Fails every call issued on `session_id`. Returns how many were failed.
    pub fn reject_session(&self, session_id: &SessionId, error: impl Fn() -> Error) -> usize {
        let calls: Vec<PendingCall> = {
            let mut state = self.state.lock();
            let ids: Vec<RequestId> = state
                .calls
                .iter()
                .filter(|(_, call)| call.session_id.as_ref() == Some(session_id))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| state.calls.remove(&id))
                .collect()
        };

        let count = calls.len();
        for call in calls {
            debug!(method = %call.method, %session_id, "Failing call on detached session");
            let _ = call.slot.send(Err(error()));
        }
        count
    }

    /// Fails every call and refuses further registrations.
    ///
    /// Returns how many calls were failed. Calling again fails nothing.
    pub fn fail_all(&self, error: impl Fn() -> Error) -> usize {
        let calls: Vec<PendingCall> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.calls.drain().map(|(_, call)| call).collect()
        };

        let count = calls.len();
        for call in calls {
            let _ = call.slot.send(Err(error()));
        }

        if count > 0 {
            debug!(count, "Failed pending calls on shutdown");
        }
        count
    }

    /// Returns the number of pending calls.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Returns `true` if no call is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once [`fail_all`](Self::fail_all) ran.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

// ============================================================================
// PendingGuard
// ============================================================================

/// Removes a call from the registry when the awaiting caller goes away.
///
/// Covers timeout and cancellation alike; removing a completed call is a
/// no-op.
pub(crate) struct PendingGuard<'a> {
    registry: &'a CallRegistry,
    id: RequestId,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(registry: &'a CallRegistry, id: RequestId) -> Self {
        Self { registry, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.registry.remove(self.id) {
            debug!(id = %self.id, "Pending call released");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
