//! Cast Session Controller - hands playback to a receiver and back
//!
//! Coordinates:
//! - Transport initialization with bounded capability retry
//! - Receiver availability and the cast affordance
//! - Session launch, media load and rejoin adoption
//! - Session teardown and local playback restore
//! - Error classification (indicator, silence, or fatal)

use crate::{
    config::CastConfig,
    error::{CastErrorCode, Error, ErrorClass, TransportError},
    load::{MediaLoadRequest, MediaLoadRequestBuilder},
    player::HostPlayer,
    transport::{CastEvent, CastSession, CastTransport, EventSink},
    types::*,
    Result,
};
use chrono::Utc;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Transitions kept in [`CastSessionController::history`]
const HISTORY_LIMIT: usize = 64;

/// Outcome of an initialization request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// Transport initialization requested
    Initializing,
    /// Capability absent, check again after `delay`
    RetryScheduled { attempt: u32, delay: Duration },
    /// Nothing to do in the current state
    AlreadyInitialized,
}

/// Outcome of a cast button press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Session requested
    Launching,
    /// Session stop requested
    Stopping,
    /// A launch or stop is already in flight
    Busy,
    /// Transport not initialized yet
    NotReady,
}

/// Which lifecycle step a transport error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CastOperation {
    Init,
    Launch,
    Stop,
}

/// The session currently launching, casting or stopping
struct ActiveCast<S> {
    attempt: Attempt,
    restore: RestorePoint,
    /// Load request waiting for the session to arrive
    request: Option<MediaLoadRequest>,
    session: Option<S>,
}

/// Cast session controller for a single local player
pub struct CastSessionController<T: CastTransport, H: HostPlayer> {
    /// Unique controller ID
    id: ControllerId,
    config: CastConfig,
    transport: T,
    host: H,
    /// Handed to the transport when listeners are registered
    sink: EventSink<T::Session>,
    state: SessionState,
    /// Present exactly while Connecting, Casting or Stopping
    active: Option<ActiveCast<T::Session>>,
    attempts: AttemptCounter,
    /// Outstanding transport initialization
    init_attempt: Option<Attempt>,
    initialized: bool,
    /// Failed capability checks so far
    capability_checks: u32,
    capability_exhausted: bool,
    availability: CastAvailability,
    affordance: CastAffordance,
    last_error: Option<Error>,
    history: VecDeque<StateChange>,
}

impl<T: CastTransport, H: HostPlayer> CastSessionController<T, H> {
    /// Create a controller. Transport completions must be fed back through
    /// [`handle_event`](Self::handle_event) from the receiving end of `sink`.
    pub fn new(transport: T, host: H, config: CastConfig, sink: EventSink<T::Session>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            id: ControllerId::new(),
            config,
            transport,
            host,
            sink,
            state: SessionState::Uninitialized,
            active: None,
            attempts: AttemptCounter::default(),
            init_attempt: None,
            initialized: false,
            capability_checks: 0,
            capability_exhausted: false,
            availability: CastAvailability::Unknown,
            affordance: CastAffordance::default(),
            last_error: None,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
        })
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn config(&self) -> &CastConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn availability(&self) -> CastAvailability {
        self.availability
    }

    pub fn affordance(&self) -> CastAffordance {
        self.affordance
    }

    /// Restore point of the current cast, if any
    pub fn restore_point(&self) -> Option<RestorePoint> {
        self.active.as_ref().map(|a| a.restore)
    }

    /// Id of the session currently held
    pub fn session_id(&self) -> Option<&str> {
        self.active
            .as_ref()
            .and_then(|a| a.session.as_ref())
            .map(|s| s.session_id())
    }

    /// Failed capability checks so far
    pub fn capability_checks(&self) -> u32 {
        self.capability_checks
    }

    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Most recent state transitions, oldest first
    pub fn history(&self) -> &VecDeque<StateChange> {
        &self.history
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Transition to new state
    fn set_state(&mut self, new_state: SessionState) -> Result<()> {
        let current = self.state;

        if !current.can_transition_to(new_state) {
            return Err(Error::InvalidStateTransition {
                from: current.to_string(),
                to: new_state.to_string(),
            });
        }

        self.state = new_state;
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(StateChange {
            from: current,
            to: new_state,
            at: Utc::now(),
        });

        info!(controller = %self.id, from = %current, to = %new_state, "State transition");

        Ok(())
    }

    fn publish_affordance(&mut self) {
        self.host.update_affordance(self.affordance);
    }

    /// Initialize the transport.
    ///
    /// While the cast capability is absent this counts a failed check and asks
    /// the caller to retry after the configured delay. Once the configured
    /// number of checks has failed it returns
    /// [`Error::CapabilityUnavailable`] and never initializes again.
    #[instrument(skip(self), fields(controller = %self.id))]
    pub fn initialize(&mut self) -> Result<InitStatus> {
        if self.capability_exhausted {
            return Err(Error::CapabilityUnavailable {
                attempts: self.capability_checks,
            });
        }

        if !matches!(self.state, SessionState::Uninitialized | SessionState::Error) {
            debug!(state = %self.state, "Cast already initialized");
            return Ok(InitStatus::AlreadyInitialized);
        }

        if !self.transport.is_capability_available() {
            self.capability_checks += 1;

            if self.capability_checks >= self.config.max_init_attempts {
                self.capability_exhausted = true;
                warn!(
                    attempts = self.capability_checks,
                    "Cast APIs not available, max reconnect attempts reached"
                );
                let error = Error::CapabilityUnavailable {
                    attempts: self.capability_checks,
                };
                self.last_error = Some(error.clone());
                return Err(error);
            }

            info!(attempt = self.capability_checks, "Cast APIs not available");
            return Ok(InitStatus::RetryScheduled {
                attempt: self.capability_checks,
                delay: self.config.init_retry_delay(),
            });
        }

        info!(app_id = self.config.effective_app_id(), "Cast APIs are available");

        let attempt = self.attempts.next();
        self.init_attempt = Some(attempt);
        self.set_state(SessionState::Initializing)?;

        self.transport.register_availability_listener(self.sink.clone());
        self.transport.register_rejoin_listener(self.sink.clone());
        self.transport.initialize(&self.config, attempt);

        Ok(InitStatus::Initializing)
    }

    /// The user pressed the cast button
    #[instrument(skip(self), fields(controller = %self.id, state = %self.state))]
    pub fn on_toggle(&mut self) -> Result<ToggleOutcome> {
        if self.state.is_busy() {
            debug!("Cast operation in flight, toggle ignored");
            return Ok(ToggleOutcome::Busy);
        }

        match self.state {
            SessionState::Ready => self.launch(),
            SessionState::Casting => self.stop_casting(),
            _ => {
                info!("Session not initialized");
                Ok(ToggleOutcome::NotReady)
            }
        }
    }

    /// The host is about to start playback of a (possibly new) source.
    ///
    /// While casting, the new source is sent to the receiver instead of
    /// playing locally.
    #[instrument(skip(self), fields(controller = %self.id))]
    pub fn on_playback_about_to_start(&mut self) -> Result<()> {
        if self.state != SessionState::Casting || !self.initialized {
            return Ok(());
        }

        let request = self.build_request()?;
        self.host.pause();

        if let Some(active) = self.active.as_mut() {
            if let Some(session) = active.session.as_mut() {
                info!(
                    session = session.session_id(),
                    src = request.source_uri(),
                    "Reloading receiver media"
                );
                session.load_media(&request, active.attempt);
            }
        }

        Ok(())
    }

    /// Feed a transport event back into the state machine
    #[instrument(skip(self, event), fields(controller = %self.id, event = event.name()))]
    pub fn handle_event(&mut self, event: CastEvent<T::Session>) -> Result<()> {
        match event {
            CastEvent::InitSucceeded { attempt } => self.on_init_success(attempt),
            CastEvent::InitFailed { attempt, error } => self.on_init_error(attempt, error),
            CastEvent::ReceiverAvailability(availability) => {
                self.on_availability(availability);
                Ok(())
            }
            CastEvent::SessionRejoined(session) => self.on_rejoin(session),
            CastEvent::SessionRequested { attempt, result } => {
                self.on_session_requested(attempt, result)
            }
            CastEvent::MediaLoaded { attempt, result } => self.on_media_loaded(attempt, result),
            CastEvent::SessionUpdated { attempt, is_alive } => {
                self.on_session_update(attempt, is_alive)
            }
            CastEvent::SessionStopped { attempt, result } => {
                self.on_session_stopped(attempt, result)
            }
        }
    }

    fn is_current(&self, attempt: Attempt) -> bool {
        self.active.as_ref().is_some_and(|a| a.attempt == attempt)
    }

    fn ignore_stale(&self, attempt: Attempt, what: &str) -> Result<()> {
        debug!(attempt = %attempt, state = %self.state, what, "Ignoring stale cast event");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    fn on_init_success(&mut self, attempt: Attempt) -> Result<()> {
        if self.init_attempt != Some(attempt) {
            return self.ignore_stale(attempt, "init success");
        }

        self.init_attempt = None;
        self.initialized = true;

        // A rejoined session may already have moved us on
        if self.state == SessionState::Initializing {
            self.set_state(SessionState::Ready)?;
        }
        Ok(())
    }

    fn on_init_error(&mut self, attempt: Attempt, error: TransportError) -> Result<()> {
        if self.init_attempt != Some(attempt) {
            return self.ignore_stale(attempt, "init error");
        }

        self.init_attempt = None;
        if self.state == SessionState::Initializing {
            self.set_state(SessionState::Error)?;
        }
        self.report(CastOperation::Init, error);
        Ok(())
    }

    fn on_availability(&mut self, availability: CastAvailability) {
        debug!(availability = %availability, "Receiver availability changed");
        self.availability = availability;

        let visible = availability == CastAvailability::Available;
        if self.affordance.visible != visible {
            self.affordance.visible = visible;
            self.publish_affordance();
        }
    }

    // ------------------------------------------------------------------
    // Launch
    // ------------------------------------------------------------------

    fn build_request(&self) -> Result<MediaLoadRequest> {
        let source = self
            .host
            .current_source()
            .ok_or_else(|| Error::InvalidArgument("no source loaded".into()))?;
        let mime_type = self.host.current_mime_type().unwrap_or_default();

        MediaLoadRequestBuilder::new(source, mime_type)
            .with_autoplay(self.config.autoplay)
            .with_start_offset(self.host.current_time())
            .build()
    }

    fn capture_restore_point(&self) -> RestorePoint {
        RestorePoint {
            local_playback_position: self.host.current_time(),
            was_playing: !self.host.is_paused(),
            prior_inactivity_timeout: self
                .host
                .inactivity_timeout()
                .unwrap_or(self.config.default_inactivity_timeout_ms),
        }
    }

    fn launch(&mut self) -> Result<ToggleOutcome> {
        let request = self.build_request()?;
        let restore = self.capture_restore_point();

        info!(src = request.source_uri(), position = restore.local_playback_position, "Cast video");

        // Pause the local content until the receiver has loaded it
        self.host.pause();

        let attempt = self.attempts.next();
        self.active = Some(ActiveCast {
            attempt,
            restore,
            request: Some(request),
            session: None,
        });
        self.set_state(SessionState::Connecting)?;
        self.transport.request_session(attempt);

        Ok(ToggleOutcome::Launching)
    }

    fn on_session_requested(
        &mut self,
        attempt: Attempt,
        result: std::result::Result<T::Session, TransportError>,
    ) -> Result<()> {
        let pending = self.state == SessionState::Connecting
            && self.is_current(attempt)
            && self.active.as_ref().is_some_and(|a| a.session.is_none());

        if !pending {
            if let Ok(session) = result {
                self.release_orphan(session, attempt);
            }
            return self.ignore_stale(attempt, "session request");
        }

        match result {
            Ok(mut session) => {
                if let Some(active) = self.active.as_mut() {
                    info!(session = session.session_id(), "Session established, loading media");
                    if let Some(request) = active.request.take() {
                        session.load_media(&request, attempt);
                    }
                    session.add_update_listener(attempt);
                    active.session = Some(session);
                }
                Ok(())
            }
            Err(error) => self.abort_launch(Some(error)),
        }
    }

    fn on_media_loaded(
        &mut self,
        attempt: Attempt,
        result: std::result::Result<RemoteMedia, TransportError>,
    ) -> Result<()> {
        if !self.is_current(attempt) {
            return self.ignore_stale(attempt, "media load");
        }

        match (self.state, result) {
            (SessionState::Connecting, Ok(media)) => {
                self.set_state(SessionState::Casting)?;
                self.attach_remote(media);
                Ok(())
            }
            (SessionState::Connecting, Err(error)) => self.abort_launch(Some(error)),
            (SessionState::Casting, Ok(media)) => {
                self.attach_remote(media);
                Ok(())
            }
            (SessionState::Casting, Err(error)) => {
                self.report(CastOperation::Launch, error);
                Ok(())
            }
            _ => self.ignore_stale(attempt, "media load"),
        }
    }

    /// Hand the receiver to the host as its playback backend
    fn attach_remote(&mut self, media: RemoteMedia) {
        let Some(session_id) = self.session_id().map(str::to_string) else {
            return;
        };

        info!(session = %session_id, media = media.media_session_id, "Media discovered");

        self.host.attach_remote(RemotePlayback { session_id, media });
        self.host.set_inactivity_timeout(0);
        self.host.set_user_active(true);

        self.affordance.connected = true;
        self.affordance.error = false;
        self.publish_affordance();
    }

    /// Give up on the launch in flight and resume local playback
    fn abort_launch(&mut self, error: Option<TransportError>) -> Result<()> {
        let next = self.idle_state();
        self.set_state(next)?;

        if let Some(active) = self.active.take() {
            if let Some(mut session) = active.session {
                session.stop(active.attempt);
            }
            if active.restore.was_playing {
                self.host.play();
            }
        }

        if let Some(error) = error {
            self.report(CastOperation::Launch, error);
        }
        Ok(())
    }

    /// Stop a session nobody is waiting for any more
    fn release_orphan(&mut self, mut session: T::Session, attempt: Attempt) {
        if self.session_id() == Some(session.session_id()) {
            return;
        }
        debug!(session = session.session_id(), attempt = %attempt, "Releasing superseded session");
        session.stop(attempt);
    }

    // ------------------------------------------------------------------
    // Rejoin
    // ------------------------------------------------------------------

    fn on_rejoin(&mut self, mut session: T::Session) -> Result<()> {
        let Some(media) = session.media().first().cloned() else {
            debug!(session = session.session_id(), "Session joined without media");
            return Ok(());
        };

        let restore = match self.state {
            SessionState::Initializing | SessionState::Ready => self.capture_restore_point(),
            SessionState::Connecting | SessionState::Casting => {
                let previous = self.active.take();
                let restore = previous
                    .as_ref()
                    .map(|a| a.restore)
                    .unwrap_or_else(|| self.capture_restore_point());
                if let Some(ActiveCast {
                    attempt,
                    session: Some(old),
                    ..
                }) = previous
                {
                    if old.session_id() != session.session_id() {
                        self.release_orphan(old, attempt);
                    }
                }
                restore
            }
            SessionState::Uninitialized | SessionState::Stopping | SessionState::Error => {
                debug!(session = session.session_id(), state = %self.state, "Rejoin ignored");
                return Ok(());
            }
        };

        info!(session = session.session_id(), "Session joined");

        let attempt = self.attempts.next();
        session.add_update_listener(attempt);
        self.active = Some(ActiveCast {
            attempt,
            restore,
            request: None,
            session: Some(session),
        });
        self.set_state(SessionState::Casting)?;
        self.attach_remote(media);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    fn stop_casting(&mut self) -> Result<ToggleOutcome> {
        self.set_state(SessionState::Stopping)?;

        if let Some(active) = self.active.as_mut() {
            if let Some(session) = active.session.as_mut() {
                info!(session = session.session_id(), "Stopping cast session");
                session.stop(active.attempt);
            }
        }
        Ok(ToggleOutcome::Stopping)
    }

    fn on_session_update(&mut self, attempt: Attempt, is_alive: bool) -> Result<()> {
        if !self.is_current(attempt) {
            return self.ignore_stale(attempt, "session update");
        }
        if is_alive {
            return Ok(());
        }

        match self.state {
            SessionState::Casting => {
                info!("Session ended on the receiver");
                self.set_state(SessionState::Stopping)?;
                self.finish_stop(None)
            }
            SessionState::Stopping => self.finish_stop(None),
            SessionState::Connecting => {
                self.abort_launch(Some(TransportError::new(CastErrorCode::SessionError)))
            }
            _ => self.ignore_stale(attempt, "session update"),
        }
    }

    fn on_session_stopped(
        &mut self,
        attempt: Attempt,
        result: std::result::Result<(), TransportError>,
    ) -> Result<()> {
        if self.state != SessionState::Stopping || !self.is_current(attempt) {
            return self.ignore_stale(attempt, "session stop");
        }
        self.finish_stop(result.err())
    }

    /// Return playback to the local player. Runs whether or not the stop
    /// succeeded.
    fn finish_stop(&mut self, error: Option<TransportError>) -> Result<()> {
        let next = self.idle_state();
        self.set_state(next)?;

        if let Some(active) = self.active.take() {
            self.restore_local(active.restore);
        }

        if let Some(error) = error {
            self.report(CastOperation::Stop, error);
        }
        Ok(())
    }

    fn restore_local(&mut self, restore: RestorePoint) {
        info!(
            position = restore.local_playback_position,
            resume = restore.was_playing,
            "Restoring local playback"
        );

        let sources = self.host.initial_sources();
        self.host.set_sources(&sources);
        self.host.seek(restore.local_playback_position);
        if restore.was_playing {
            self.host.play();
        }
        self.host.set_inactivity_timeout(restore.prior_inactivity_timeout);

        self.affordance.connected = false;
        self.publish_affordance();
    }

    /// Where the controller rests once no session is held
    fn idle_state(&self) -> SessionState {
        if self.initialized {
            SessionState::Ready
        } else if self.init_attempt.is_some() {
            SessionState::Initializing
        } else {
            SessionState::Error
        }
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------

    fn report(&mut self, operation: CastOperation, transport_error: TransportError) {
        let class = transport_error.class();
        let error = match (class, operation) {
            (ErrorClass::Cancelled, _) => Error::UserCancelled,
            (_, CastOperation::Init) => Error::InitializationFailed(transport_error),
            (_, CastOperation::Launch) => Error::SessionLaunchFailed(transport_error),
            (_, CastOperation::Stop) => Error::SessionStopFailed(transport_error),
        };

        match class {
            ErrorClass::Transient => {
                warn!(code = error.error_code(), error = %error, "Cast error");
                if !self.affordance.error {
                    self.affordance.error = true;
                    self.publish_affordance();
                }
            }
            ErrorClass::Cancelled => {
                debug!("Cast request cancelled by user");
            }
            ErrorClass::Fatal => {
                error!(code = error.error_code(), error = %error, "Cast error");
                self.host.report_fatal_error(&error);
            }
        }

        self.last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{PlayerCommand, SimulatedPlayer, SimulatedSession, SimulatedTransport, TransportCall};
    use tokio::sync::mpsc;

    type Controller = CastSessionController<SimulatedTransport, SimulatedPlayer>;

    const SRC: &str = "https://cdn.example.com/show/master.m3u8";
    const HLS: &str = "application/x-mpegURL";

    struct Harness {
        controller: Controller,
        transport: SimulatedTransport,
        player: SimulatedPlayer,
        _events: mpsc::UnboundedReceiver<CastEvent<SimulatedSession>>,
    }

    fn harness() -> Harness {
        let transport = SimulatedTransport::manual();
        let player = SimulatedPlayer::new(SRC, HLS);
        let (sink, events) = EventSink::channel();
        let controller =
            CastSessionController::new(transport.clone(), player.clone(), CastConfig::default(), sink)
                .unwrap();
        Harness {
            controller,
            transport,
            player,
            _events: events,
        }
    }

    fn media(id: u64) -> RemoteMedia {
        RemoteMedia {
            media_session_id: id,
            content_id: SRC.to_string(),
            content_type: HLS.to_string(),
        }
    }

    fn ready() -> Harness {
        let mut h = harness();
        assert_eq!(h.controller.initialize().unwrap(), InitStatus::Initializing);
        let attempt = h.transport.last_init_attempt().unwrap();
        h.controller.handle_event(CastEvent::InitSucceeded { attempt }).unwrap();
        assert_eq!(h.controller.state(), SessionState::Ready);
        h
    }

    /// Drive a launch all the way to Casting and return its attempt
    fn casting(h: &mut Harness) -> Attempt {
        assert_eq!(h.controller.on_toggle().unwrap(), ToggleOutcome::Launching);
        let attempt = h.transport.last_session_request().unwrap();
        let session = h.transport.session("session-1", vec![]);
        h.controller
            .handle_event(CastEvent::SessionRequested { attempt, result: Ok(session) })
            .unwrap();
        h.controller
            .handle_event(CastEvent::MediaLoaded { attempt, result: Ok(media(1)) })
            .unwrap();
        assert_eq!(h.controller.state(), SessionState::Casting);
        attempt
    }

    fn assert_restore_invariant(controller: &Controller) {
        assert_eq!(
            controller.restore_point().is_some(),
            controller.state().holds_restore_point(),
            "restore point presence must follow state {}",
            controller.state()
        );
    }

    #[test]
    fn test_controller_creation() {
        let h = harness();
        assert_eq!(h.controller.state(), SessionState::Uninitialized);
        assert_eq!(h.controller.availability(), CastAvailability::Unknown);
        assert!(!h.controller.affordance().visible);
        assert_restore_invariant(&h.controller);
    }

    #[test]
    fn test_initialize_registers_listeners() {
        let h = ready();
        let calls = h.transport.calls();
        assert!(calls.contains(&TransportCall::RegisterAvailabilityListener));
        assert!(calls.contains(&TransportCall::RegisterRejoinListener));
        assert!(h.controller.is_initialized());
    }

    #[test]
    fn test_capability_retry_is_bounded() {
        let mut h = harness();
        h.transport.set_capability_available(false);

        for attempt in 1..10 {
            match h.controller.initialize().unwrap() {
                InitStatus::RetryScheduled { attempt: n, delay } => {
                    assert_eq!(n, attempt);
                    assert_eq!(delay, Duration::from_secs(1));
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        let err = h.controller.initialize().unwrap_err();
        assert_eq!(err, Error::CapabilityUnavailable { attempts: 10 });
        assert_eq!(h.transport.capability_checks(), 10);

        // Even once the capability shows up, initialization never resumes
        h.transport.set_capability_available(true);
        assert!(h.controller.initialize().is_err());
        assert_eq!(h.transport.capability_checks(), 10);
        assert_eq!(h.controller.state(), SessionState::Uninitialized);
        assert!(!h.transport.calls().iter().any(|c| matches!(c, TransportCall::Initialize(_))));
    }

    #[test]
    fn test_availability_drives_affordance() {
        let mut h = ready();
        h.controller
            .handle_event(CastEvent::ReceiverAvailability(CastAvailability::Available))
            .unwrap();
        assert!(h.player.affordance().visible);

        h.controller
            .handle_event(CastEvent::ReceiverAvailability(CastAvailability::Unavailable))
            .unwrap();
        assert!(!h.player.affordance().visible);
        assert_eq!(h.controller.state(), SessionState::Ready);
    }

    #[test]
    fn test_launch_captures_and_pauses() {
        let mut h = ready();
        h.player.set_position(42.0);
        h.player.set_playing(true);

        assert_eq!(h.controller.on_toggle().unwrap(), ToggleOutcome::Launching);
        assert_eq!(h.controller.state(), SessionState::Connecting);
        assert!(h.player.is_paused_now());

        let restore = h.controller.restore_point().unwrap();
        assert_eq!(restore.local_playback_position, 42.0);
        assert!(restore.was_playing);
        assert_eq!(restore.prior_inactivity_timeout, 2000);
        assert_restore_invariant(&h.controller);
    }

    #[test]
    fn test_launch_loads_media_with_position() {
        let mut h = ready();
        h.player.set_position(12.5);
        casting(&mut h);

        let request = h.transport.loaded_requests().pop().unwrap();
        assert_eq!(request.source_uri(), SRC);
        assert_eq!(request.mime_type(), HLS);
        assert_eq!(request.start_offset_seconds(), 12.5);
        assert!(request.autoplay());

        let remote = h.player.remote().unwrap();
        assert_eq!(remote.session_id, "session-1");
        assert_eq!(h.player.inactivity_timeout_now(), Some(0));
        assert!(h.player.affordance().connected);
        assert!(h.player.commands().contains(&PlayerCommand::SetUserActive(true)));
        assert_restore_invariant(&h.controller);
    }

    #[test]
    fn test_toggle_spam_is_idempotent() {
        let mut h = ready();
        h.controller.on_toggle().unwrap();
        for _ in 0..5 {
            assert_eq!(h.controller.on_toggle().unwrap(), ToggleOutcome::Busy);
        }
        assert_eq!(h.transport.session_request_count(), 1);

        let mut h = ready();
        casting(&mut h);
        assert_eq!(h.controller.on_toggle().unwrap(), ToggleOutcome::Stopping);
        for _ in 0..5 {
            assert_eq!(h.controller.on_toggle().unwrap(), ToggleOutcome::Busy);
        }
        assert_eq!(h.transport.stop_count(), 1);
    }

    #[test]
    fn test_teardown_restores_local_playback() {
        let mut h = ready();
        h.player.set_position(42.0);
        h.player.set_playing(true);
        h.player.set_inactivity_timeout(3000);
        let attempt = casting(&mut h);

        // Receiver moved on; restore uses the captured point
        h.player.set_position(97.0);
        h.controller.on_toggle().unwrap();
        assert_eq!(h.controller.state(), SessionState::Stopping);
        h.controller
            .handle_event(CastEvent::SessionStopped { attempt, result: Ok(()) })
            .unwrap();

        assert_eq!(h.controller.state(), SessionState::Ready);
        assert_eq!(h.player.position(), 42.0);
        assert!(!h.player.is_paused_now());
        assert_eq!(h.player.inactivity_timeout_now(), Some(3000));
        assert!(h.player.remote().is_none());
        assert!(!h.player.affordance().connected);
        assert!(h.controller.session_id().is_none());
        assert_restore_invariant(&h.controller);
    }

    #[test]
    fn test_stop_error_still_restores() {
        let mut h = ready();
        h.player.set_position(8.0);
        let attempt = casting(&mut h);

        h.controller.on_toggle().unwrap();
        h.controller
            .handle_event(CastEvent::SessionStopped {
                attempt,
                result: Err(CastErrorCode::ChannelError.into()),
            })
            .unwrap();

        assert_eq!(h.controller.state(), SessionState::Ready);
        assert_eq!(h.player.position(), 8.0);
        assert!(h.player.affordance().error);
        assert!(h.player.fatal_errors().is_empty());
        assert!(matches!(h.controller.last_error(), Some(Error::SessionStopFailed(_))));
    }

    #[test]
    fn test_stop_with_unknown_code_is_fatal_and_restores() {
        let mut h = ready();
        h.player.set_position(21.0);
        h.player.set_playing(true);
        let attempt = casting(&mut h);

        h.controller.on_toggle().unwrap();
        h.controller
            .handle_event(CastEvent::SessionStopped {
                attempt,
                result: Err(CastErrorCode::from_code("receiver_on_fire").into()),
            })
            .unwrap();

        assert_eq!(h.controller.state(), SessionState::Ready);
        assert_eq!(h.player.position(), 21.0);
        assert!(!h.player.is_paused_now());
        assert!(h.player.remote().is_none());
        assert_eq!(h.player.fatal_errors().len(), 1);
        assert!(!h.player.affordance().error);
        assert!(matches!(h.controller.last_error(), Some(Error::SessionStopFailed(_))));
        assert_restore_invariant(&h.controller);
    }

    #[test]
    fn test_remote_end_is_implicit_stop() {
        let mut h = ready();
        let attempt = casting(&mut h);

        h.controller
            .handle_event(CastEvent::SessionUpdated { attempt, is_alive: true })
            .unwrap();
        assert_eq!(h.controller.state(), SessionState::Casting);

        h.controller
            .handle_event(CastEvent::SessionUpdated { attempt, is_alive: false })
            .unwrap();
        assert_eq!(h.controller.state(), SessionState::Ready);
        assert_eq!(h.transport.stop_count(), 0);
        let states: Vec<_> = h.controller.history().iter().map(|c| c.to).collect();
        assert!(states.ends_with(&[SessionState::Casting, SessionState::Stopping, SessionState::Ready]));
    }

    #[test]
    fn test_stale_callbacks_are_ignored() {
        let mut h = ready();
        let first = casting(&mut h);
        h.controller.on_toggle().unwrap();
        h.controller
            .handle_event(CastEvent::SessionStopped { attempt: first, result: Ok(()) })
            .unwrap();

        // Second cast attempt
        h.controller.on_toggle().unwrap();
        assert_eq!(h.controller.state(), SessionState::Connecting);
        let restore = h.controller.restore_point();

        // Late events from the first session
        let late = h.transport.session("session-1", vec![]);
        h.controller
            .handle_event(CastEvent::SessionRequested { attempt: first, result: Ok(late) })
            .unwrap();
        h.controller
            .handle_event(CastEvent::MediaLoaded { attempt: first, result: Ok(media(9)) })
            .unwrap();
        h.controller
            .handle_event(CastEvent::SessionUpdated { attempt: first, is_alive: false })
            .unwrap();
        h.controller
            .handle_event(CastEvent::SessionStopped {
                attempt: first,
                result: Err(CastErrorCode::Other("late".into()).into()),
            })
            .unwrap();

        assert_eq!(h.controller.state(), SessionState::Connecting);
        assert_eq!(h.controller.restore_point(), restore);
        assert!(h.player.fatal_errors().is_empty());
    }

    #[test]
    fn test_launch_error_returns_to_ready() {
        let mut h = ready();
        h.player.set_playing(true);
        h.controller.on_toggle().unwrap();
        let attempt = h.transport.last_session_request().unwrap();

        h.controller
            .handle_event(CastEvent::SessionRequested {
                attempt,
                result: Err(CastErrorCode::ReceiverUnavailable.into()),
            })
            .unwrap();

        assert_eq!(h.controller.state(), SessionState::Ready);
        assert!(h.controller.restore_point().is_none());
        assert!(!h.player.is_paused_now());
        assert!(h.player.affordance().error);
    }

    #[test]
    fn test_media_load_failure_releases_session() {
        let mut h = ready();
        h.controller.on_toggle().unwrap();
        let attempt = h.transport.last_session_request().unwrap();
        let session = h.transport.session("session-7", vec![]);
        h.controller
            .handle_event(CastEvent::SessionRequested { attempt, result: Ok(session) })
            .unwrap();
        h.controller
            .handle_event(CastEvent::MediaLoaded {
                attempt,
                result: Err(CastErrorCode::LoadMediaFailed.into()),
            })
            .unwrap();

        assert_eq!(h.controller.state(), SessionState::Ready);
        assert_eq!(h.transport.stop_count(), 1);
        assert!(h.player.affordance().error);
        assert_restore_invariant(&h.controller);
    }

    #[test]
    fn test_error_classification() {
        for code in CastErrorCode::TRANSIENT {
            let mut h = ready();
            h.controller.on_toggle().unwrap();
            let attempt = h.transport.last_session_request().unwrap();
            h.controller
                .handle_event(CastEvent::SessionRequested { attempt, result: Err(code.clone().into()) })
                .unwrap();
            assert!(h.player.affordance().error, "{code} should set the indicator");
            assert!(h.player.fatal_errors().is_empty(), "{code} must not be fatal");
        }

        // Cancel: silent
        let mut h = ready();
        h.controller.on_toggle().unwrap();
        let attempt = h.transport.last_session_request().unwrap();
        let before = h.player.affordance();
        h.controller
            .handle_event(CastEvent::SessionRequested {
                attempt,
                result: Err(CastErrorCode::Cancel.into()),
            })
            .unwrap();
        assert_eq!(h.player.affordance(), before);
        assert!(h.player.fatal_errors().is_empty());
        assert_eq!(h.controller.last_error(), Some(&Error::UserCancelled));

        // Unknown: fatal
        let mut h = ready();
        h.controller.on_toggle().unwrap();
        let attempt = h.transport.last_session_request().unwrap();
        h.controller
            .handle_event(CastEvent::SessionRequested {
                attempt,
                result: Err(CastErrorCode::Other("bad_receiver_state".into()).into()),
            })
            .unwrap();
        assert_eq!(h.player.fatal_errors().len(), 1);
        assert!(!h.player.affordance().error);
    }

    #[test]
    fn test_init_error_moves_to_error() {
        let mut h = harness();
        h.controller.initialize().unwrap();
        let attempt = h.transport.last_init_attempt().unwrap();
        h.controller
            .handle_event(CastEvent::InitFailed {
                attempt,
                error: CastErrorCode::ExtensionMissing.into(),
            })
            .unwrap();
        assert_eq!(h.controller.state(), SessionState::Error);
        assert!(h.player.affordance().error);
        assert_eq!(h.controller.on_toggle().unwrap(), ToggleOutcome::NotReady);

        // Error loops back on retry
        assert_eq!(h.controller.initialize().unwrap(), InitStatus::Initializing);
        assert_eq!(h.controller.state(), SessionState::Initializing);
    }

    fn failed_init(code: CastErrorCode) -> Harness {
        let mut h = harness();
        h.controller.initialize().unwrap();
        let attempt = h.transport.last_init_attempt().unwrap();
        h.controller
            .handle_event(CastEvent::InitFailed { attempt, error: code.into() })
            .unwrap();
        assert_eq!(h.controller.state(), SessionState::Error);
        h
    }

    #[test]
    fn test_init_cancel_is_silent() {
        let h = failed_init(CastErrorCode::Cancel);
        assert_eq!(h.player.affordance(), CastAffordance::default());
        assert!(h.player.fatal_errors().is_empty());
        assert_eq!(h.controller.last_error(), Some(&Error::UserCancelled));
    }

    #[test]
    fn test_init_unknown_code_is_fatal() {
        let h = failed_init(CastErrorCode::from_code("sdk_exploded"));
        assert_eq!(h.player.fatal_errors().len(), 1);
        assert!(!h.player.affordance().error);
        assert!(matches!(
            h.controller.last_error(),
            Some(Error::InitializationFailed(e)) if e.code == CastErrorCode::Other("sdk_exploded".into())
        ));
    }

    #[test]
    fn test_rejoin_skips_launch() {
        let mut h = ready();
        let session = h.transport.session("existing", vec![media(5)]);
        h.controller.handle_event(CastEvent::SessionRejoined(session)).unwrap();

        assert_eq!(h.controller.state(), SessionState::Casting);
        assert_eq!(h.transport.session_request_count(), 0);
        assert_eq!(h.controller.session_id(), Some("existing"));
        assert!(!h.controller.history().iter().any(|c| c.to == SessionState::Connecting));
        assert_eq!(h.player.remote().unwrap().media.media_session_id, 5);
        assert_restore_invariant(&h.controller);
    }

    #[test]
    fn test_rejoin_during_initializing() {
        let mut h = harness();
        h.controller.initialize().unwrap();
        let init = h.transport.last_init_attempt().unwrap();

        let session = h.transport.session("existing", vec![media(5)]);
        h.controller.handle_event(CastEvent::SessionRejoined(session)).unwrap();
        assert_eq!(h.controller.state(), SessionState::Casting);

        // Init completing afterwards does not knock us out of Casting
        h.controller.handle_event(CastEvent::InitSucceeded { attempt: init }).unwrap();
        assert_eq!(h.controller.state(), SessionState::Casting);
        assert!(h.controller.is_initialized());
    }

    #[test]
    fn test_rejoin_supersedes_launch() {
        let mut h = ready();
        h.controller.on_toggle().unwrap();
        let launch = h.transport.last_session_request().unwrap();

        let session = h.transport.session("existing", vec![media(5)]);
        h.controller.handle_event(CastEvent::SessionRejoined(session)).unwrap();
        assert_eq!(h.controller.state(), SessionState::Casting);

        // The superseded launch resolves late and is released
        let late = h.transport.session("fresh", vec![]);
        h.controller
            .handle_event(CastEvent::SessionRequested { attempt: launch, result: Ok(late) })
            .unwrap();
        assert_eq!(h.controller.session_id(), Some("existing"));
        assert_eq!(h.transport.stop_count(), 1);
    }

    #[test]
    fn test_rejoin_ignored_before_initialize() {
        let mut h = harness();
        let session = h.transport.session("existing", vec![media(5)]);
        h.controller.handle_event(CastEvent::SessionRejoined(session)).unwrap();

        assert_eq!(h.controller.state(), SessionState::Uninitialized);
        assert!(h.controller.session_id().is_none());
        assert!(h.player.remote().is_none());
        assert!(h.transport.calls().is_empty());
        assert_restore_invariant(&h.controller);
    }

    #[test]
    fn test_rejoin_ignored_after_init_error() {
        let mut h = failed_init(CastErrorCode::Timeout);
        let session = h.transport.session("existing", vec![media(5)]);
        h.controller.handle_event(CastEvent::SessionRejoined(session)).unwrap();

        assert_eq!(h.controller.state(), SessionState::Error);
        assert!(h.controller.session_id().is_none());
        assert!(h.player.remote().is_none());
        assert_restore_invariant(&h.controller);
    }

    #[test]
    fn test_rejoin_ignored_while_stopping() {
        let mut h = ready();
        let attempt = casting(&mut h);
        h.controller.on_toggle().unwrap();
        assert_eq!(h.controller.state(), SessionState::Stopping);

        let session = h.transport.session("other", vec![media(9)]);
        h.controller.handle_event(CastEvent::SessionRejoined(session)).unwrap();
        assert_eq!(h.controller.state(), SessionState::Stopping);
        assert_eq!(h.controller.session_id(), Some("session-1"));

        // The original stop still completes
        h.controller
            .handle_event(CastEvent::SessionStopped { attempt, result: Ok(()) })
            .unwrap();
        assert_eq!(h.controller.state(), SessionState::Ready);
        assert_restore_invariant(&h.controller);
    }

    #[test]
    fn test_rejoin_then_init_failure_tears_down_to_error() {
        let mut h = harness();
        h.player.set_position(14.0);
        h.controller.initialize().unwrap();
        let init = h.transport.last_init_attempt().unwrap();

        let session = h.transport.session("existing", vec![media(5)]);
        h.controller.handle_event(CastEvent::SessionRejoined(session)).unwrap();
        assert_eq!(h.controller.state(), SessionState::Casting);

        h.controller
            .handle_event(CastEvent::InitFailed {
                attempt: init,
                error: CastErrorCode::Timeout.into(),
            })
            .unwrap();
        assert_eq!(h.controller.state(), SessionState::Casting);
        assert!(!h.controller.is_initialized());

        let listener = h
            .transport
            .calls()
            .into_iter()
            .find_map(|c| match c {
                TransportCall::AddUpdateListener { attempt, .. } => Some(attempt),
                _ => None,
            })
            .unwrap();
        h.controller
            .handle_event(CastEvent::SessionUpdated { attempt: listener, is_alive: false })
            .unwrap();

        assert_eq!(h.controller.state(), SessionState::Error);
        assert!(h.controller.session_id().is_none());
        assert!(h.player.remote().is_none());
        assert_eq!(h.player.position(), 14.0);
        assert!(!h.player.affordance().connected);
        assert_restore_invariant(&h.controller);
    }

    #[test]
    fn test_rejoin_without_media_is_ignored() {
        let mut h = ready();
        let session = h.transport.session("idle", vec![]);
        h.controller.handle_event(CastEvent::SessionRejoined(session)).unwrap();
        assert_eq!(h.controller.state(), SessionState::Ready);
    }

    #[test]
    fn test_playback_start_while_casting_reloads() {
        let mut h = ready();
        casting(&mut h);
        h.player.load_source("https://cdn.example.com/next.mp4", "video/mp4");
        h.player.set_position(0.0);

        h.controller.on_playback_about_to_start().unwrap();
        let request = h.transport.loaded_requests().pop().unwrap();
        assert_eq!(request.source_uri(), "https://cdn.example.com/next.mp4");
        assert_eq!(h.controller.state(), SessionState::Casting);
    }

    #[test]
    fn test_playback_start_when_idle_is_noop() {
        let mut h = ready();
        h.controller.on_playback_about_to_start().unwrap();
        assert!(h.transport.loaded_requests().is_empty());
    }

    #[test]
    fn test_launch_without_source_fails() {
        let mut h = ready();
        h.player.clear_source();
        let err = h.controller.on_toggle().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(h.controller.state(), SessionState::Ready);
        assert_eq!(h.transport.session_request_count(), 0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut h = ready();
        for _ in 0..20 {
            let attempt = casting(&mut h);
            h.controller.on_toggle().unwrap();
            h.controller
                .handle_event(CastEvent::SessionStopped { attempt, result: Ok(()) })
                .unwrap();
        }

        let history = h.controller.history();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.back().map(|c| c.to), Some(SessionState::Ready));
        assert!(!history.iter().any(|c| c.to == SessionState::Initializing));
    }
}
