//! Kino Cast - Remote playback session control for Kino
//!
//! This crate moves playback from a local player to a cast receiver and back:
//! - Transport initialization with bounded capability retry
//! - Receiver availability tracking for the cast button
//! - Session launch, media load and rejoin of existing sessions
//! - Local playback restore when the session ends
//! - Error classification into indicator, silence, or fatal
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Kino Cast                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐                        ┌──────────────┐       │
//! │  │  CastHandle  │── toggle / lifecycle ─▶│ CastService  │       │
//! │  └──────────────┘                        │  (one task)  │       │
//! │                                          └──────┬───────┘       │
//! │                                                 │               │
//! │                                        ┌────────┴────────┐      │
//! │                                        │ CastSession     │      │
//! │                                        │ Controller      │      │
//! │                                        └──┬───────────┬──┘      │
//! │                                           │           │         │
//! │  ┌──────────────┐  CastEvent   ┌──────────┴───┐  ┌────┴──────┐  │
//! │  │  EventSink   │◀─────────────│CastTransport │  │HostPlayer │  │
//! │  └──────────────┘              └──────────────┘  └───────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod load;
pub mod transport;
pub mod player;
pub mod controller;
pub mod service;
pub mod sim;

pub use error::{CastErrorCode, Error, ErrorClass, Result, TransportError};
pub use types::*;
pub use config::{CastConfig, DEFAULT_MEDIA_RECEIVER_APP_ID, MAX_INIT_RETRY_DELAY_MS};
pub use load::{MediaLoadRequest, MediaLoadRequestBuilder};
pub use transport::{CastEvent, CastSession, CastTransport, EventSink};
pub use player::HostPlayer;
pub use controller::{CastSessionController, InitStatus, ToggleOutcome};
pub use service::{CastHandle, CastService, CastSnapshot};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log library start-up
pub fn init() {
    tracing::info!(version = VERSION, "Kino Cast initialized");
}
