//! Core types for Kino Cast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a cast controller instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerId(pub Uuid);

impl ControllerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ControllerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ControllerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity token attached to every asynchronous transport operation.
///
/// The controller issues a fresh token whenever an operation supersedes the
/// previous one; completions carrying any other token are stale and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Attempt(pub u64);

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic source of attempt tokens
#[derive(Debug, Default)]
pub(crate) struct AttemptCounter(u64);

impl AttemptCounter {
    pub(crate) fn next(&mut self) -> Attempt {
        self.0 += 1;
        Attempt(self.0)
    }
}

/// Receiver availability as last reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastAvailability {
    #[default]
    Unknown,
    Unavailable,
    Available,
}

impl std::fmt::Display for CastAvailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CastAvailability::Unknown => write!(f, "unknown"),
            CastAvailability::Unavailable => write!(f, "unavailable"),
            CastAvailability::Available => write!(f, "available"),
        }
    }
}

/// Cast session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Transport not initialized yet (or capability never appeared)
    #[default]
    Uninitialized,
    /// Transport initialization in flight
    Initializing,
    /// Initialized, not casting
    Ready,
    /// Session request or media load in flight
    Connecting,
    /// Playback is on the receiver
    Casting,
    /// Session stop in flight
    Stopping,
    /// Initialization failed
    Error,
}

impl SessionState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            // From Uninitialized
            (Uninitialized, Initializing) |
            // From Initializing
            (Initializing, Ready) | (Initializing, Error) | (Initializing, Casting) |
            // From Ready
            (Ready, Connecting) | (Ready, Casting) |
            // From Connecting
            (Connecting, Casting) | (Connecting, Ready) |
            // From Casting
            (Casting, Stopping) | (Casting, Casting) |
            // From Stopping
            (Stopping, Ready) | (Stopping, Initializing) | (Stopping, Error) |
            // From Error
            (Error, Initializing)
        )
    }

    /// Whether a restore point must exist in this state
    pub fn holds_restore_point(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Casting | SessionState::Stopping
        )
    }

    /// Whether a launch or stop is outstanding
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Stopping)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Initializing => write!(f, "initializing"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Casting => write!(f, "casting"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

/// Local player state captured when playback moves to the receiver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestorePoint {
    /// Local playback position (seconds)
    pub local_playback_position: f64,
    /// Whether local playback was running
    pub was_playing: bool,
    /// Inactivity timeout in effect before casting (milliseconds)
    pub prior_inactivity_timeout: u64,
}

/// What the host UI should render for the cast button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CastAffordance {
    /// A receiver is available
    pub visible: bool,
    /// Playback is on the receiver
    pub connected: bool,
    /// The last cast operation hit a transient error
    pub error: bool,
}

/// A playable source as configured on the host player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    pub src: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

impl MediaSource {
    pub fn new(src: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Media handle reported by the receiver after a successful load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMedia {
    pub media_session_id: u64,
    pub content_id: String,
    pub content_type: String,
}

/// Everything the host needs to switch its playback backend to the receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlayback {
    pub session_id: String,
    pub media: RemoteMedia,
}

/// A recorded state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: SessionState,
    pub to: SessionState,
    pub at: DateTime<Utc>,
}
