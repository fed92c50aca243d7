//! Transport seam
//!
//! Every cast SDK call is fire-and-forget: the transport receives an
//! [`Attempt`] token with each request and later reports the outcome as a
//! [`CastEvent`] carrying that same token through an [`EventSink`]. The
//! controller consumes those events on its own task, so SDK callbacks never
//! touch controller state directly.

use crate::{
    config::CastConfig,
    error::TransportError,
    load::MediaLoadRequest,
    types::{Attempt, CastAvailability, RemoteMedia},
};
use tokio::sync::mpsc;
use tracing::debug;

/// A live connection to a receiver, owned by the transport
pub trait CastSession: Send + 'static {
    /// Receiver-assigned session id
    fn session_id(&self) -> &str;

    /// Media already playing on the receiver (non-empty on rejoin)
    fn media(&self) -> &[RemoteMedia];

    /// Completes with [`CastEvent::MediaLoaded`]
    fn load_media(&mut self, request: &MediaLoadRequest, attempt: Attempt);

    /// Subsequent liveness changes arrive as [`CastEvent::SessionUpdated`]
    fn add_update_listener(&mut self, attempt: Attempt);

    /// Completes with [`CastEvent::SessionStopped`]
    fn stop(&mut self, attempt: Attempt);
}

/// Cast SDK capability provider
pub trait CastTransport: Send + 'static {
    type Session: CastSession;

    /// Whether the SDK is present and usable in this environment
    fn is_capability_available(&self) -> bool;

    /// Availability changes arrive as [`CastEvent::ReceiverAvailability`]
    fn register_availability_listener(&mut self, sink: EventSink<Self::Session>);

    /// Pre-existing sessions arrive as [`CastEvent::SessionRejoined`]
    fn register_rejoin_listener(&mut self, sink: EventSink<Self::Session>);

    /// Completes with [`CastEvent::InitSucceeded`] or [`CastEvent::InitFailed`]
    fn initialize(&mut self, config: &CastConfig, attempt: Attempt);

    /// Completes with [`CastEvent::SessionRequested`]
    fn request_session(&mut self, attempt: Attempt);
}

/// Outcomes and notifications reported by the transport
#[derive(Debug)]
pub enum CastEvent<S> {
    InitSucceeded {
        attempt: Attempt,
    },
    InitFailed {
        attempt: Attempt,
        error: TransportError,
    },
    ReceiverAvailability(CastAvailability),
    SessionRejoined(S),
    SessionRequested {
        attempt: Attempt,
        result: Result<S, TransportError>,
    },
    MediaLoaded {
        attempt: Attempt,
        result: Result<RemoteMedia, TransportError>,
    },
    SessionUpdated {
        attempt: Attempt,
        is_alive: bool,
    },
    SessionStopped {
        attempt: Attempt,
        result: Result<(), TransportError>,
    },
}

impl<S> CastEvent<S> {
    /// Short event name for logs
    pub fn name(&self) -> &'static str {
        match self {
            CastEvent::InitSucceeded { .. } => "init_succeeded",
            CastEvent::InitFailed { .. } => "init_failed",
            CastEvent::ReceiverAvailability(_) => "receiver_availability",
            CastEvent::SessionRejoined(_) => "session_rejoined",
            CastEvent::SessionRequested { .. } => "session_requested",
            CastEvent::MediaLoaded { .. } => "media_loaded",
            CastEvent::SessionUpdated { .. } => "session_updated",
            CastEvent::SessionStopped { .. } => "session_stopped",
        }
    }

    /// Attempt token carried by completions
    pub fn attempt(&self) -> Option<Attempt> {
        match self {
            CastEvent::InitSucceeded { attempt }
            | CastEvent::InitFailed { attempt, .. }
            | CastEvent::SessionRequested { attempt, .. }
            | CastEvent::MediaLoaded { attempt, .. }
            | CastEvent::SessionUpdated { attempt, .. }
            | CastEvent::SessionStopped { attempt, .. } => Some(*attempt),
            CastEvent::ReceiverAvailability(_) | CastEvent::SessionRejoined(_) => None,
        }
    }
}

/// Channel through which the transport reports back to the controller
pub struct EventSink<S> {
    tx: mpsc::UnboundedSender<CastEvent<S>>,
}

impl<S> Clone for EventSink<S> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<S> std::fmt::Debug for EventSink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<S> EventSink<S> {
    /// Create a sink and the receiving end the controller's owner drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CastEvent<S>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver an event. Events sent after the controller is gone are dropped.
    pub fn emit(&self, event: CastEvent<S>) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            debug!(event = event.name(), "Cast event dropped, controller gone");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
