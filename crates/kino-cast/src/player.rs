//! Host player seam
//!
//! The local media player the cast controller hands playback away from and
//! back to. Rendering of the cast button is the host's business; the
//! controller only publishes a [`CastAffordance`] for it to draw.

use crate::{
    error::Error,
    types::{CastAffordance, MediaSource, RemotePlayback},
};

pub trait HostPlayer: Send + 'static {
    /// URI of the source currently loaded
    fn current_source(&self) -> Option<String>;

    /// MIME type of the source currently loaded
    fn current_mime_type(&self) -> Option<String>;

    /// Playback position in seconds
    fn current_time(&self) -> f64;

    fn is_paused(&self) -> bool;

    /// Configured inactivity timeout in milliseconds, if any
    fn inactivity_timeout(&self) -> Option<u64>;

    /// Sources the player was configured with
    fn initial_sources(&self) -> Vec<MediaSource>;

    fn pause(&mut self);

    fn play(&mut self);

    fn seek(&mut self, position: f64);

    fn set_inactivity_timeout(&mut self, timeout_ms: u64);

    /// Replace the source list; also switches back to local playback
    fn set_sources(&mut self, sources: &[MediaSource]);

    /// Switch the active playback backend to the receiver
    fn attach_remote(&mut self, remote: RemotePlayback);

    fn set_user_active(&mut self, active: bool);

    /// Unexpected cast failures land here
    fn report_fatal_error(&mut self, error: &Error);

    fn update_affordance(&mut self, affordance: CastAffordance);
}
