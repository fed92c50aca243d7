//! In-process simulated receiver and host player
//!
//! [`SimulatedTransport`] records every SDK call. In manual mode it never
//! answers, so callers drive completions themselves; in scripted mode it
//! answers each call immediately through the registered [`EventSink`]
//! according to a [`SimScript`]. [`SimulatedPlayer`] is a recording host.
//! Both are cheap handles over shared state, so a clone kept outside the
//! controller observes everything the controller does.

use crate::{
    config::CastConfig,
    error::{CastErrorCode, Error, TransportError},
    load::MediaLoadRequest,
    player::HostPlayer,
    transport::{CastEvent, CastSession, CastTransport, EventSink},
    types::{Attempt, CastAffordance, CastAvailability, MediaSource, RemoteMedia, RemotePlayback},
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// How the simulated receiver answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimScript {
    /// Failed capability checks before the SDK shows up (`None`: never)
    pub capability_after_checks: Option<u32>,
    /// Error code for `initialize`, success when unset
    pub init_error: Option<CastErrorCode>,
    pub receiver_available: bool,
    /// Media already playing on the receiver, announced as a rejoin
    pub existing_media: Option<RemoteMedia>,
    pub session_error: Option<CastErrorCode>,
    pub load_error: Option<CastErrorCode>,
    pub stop_error: Option<CastErrorCode>,
}

impl Default for SimScript {
    fn default() -> Self {
        Self {
            capability_after_checks: Some(0),
            init_error: None,
            receiver_available: true,
            existing_media: None,
            session_error: None,
            load_error: None,
            stop_error: None,
        }
    }
}

/// A recorded SDK call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", content = "args", rename_all = "snake_case")]
pub enum TransportCall {
    RegisterAvailabilityListener,
    RegisterRejoinListener,
    Initialize(Attempt),
    RequestSession(Attempt),
    LoadMedia { session_id: String, attempt: Attempt },
    AddUpdateListener { session_id: String, attempt: Attempt },
    Stop { session_id: String, attempt: Attempt },
}

#[derive(Debug)]
struct SimState {
    /// `None` in manual mode
    script: Option<SimScript>,
    capability_after_checks: Option<u32>,
    capability_checks: u32,
    calls: Vec<TransportCall>,
    loaded: Vec<MediaLoadRequest>,
    sink: Option<EventSink<SimulatedSession>>,
    /// Most recent update listener as (session id, attempt)
    listener: Option<(String, Attempt)>,
    next_session: u32,
    next_media: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimState {
    fn emit(&self, event: CastEvent<SimulatedSession>) {
        match &self.sink {
            Some(sink) => sink.emit(event),
            None => debug!(event = event.name(), "No listener registered, simulated event dropped"),
        }
    }

    fn attempts_of(&self, pick: impl Fn(&TransportCall) -> Option<Attempt>) -> Option<Attempt> {
        self.calls.iter().rev().find_map(pick)
    }
}

/// Simulated cast SDK
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    shared: Arc<Mutex<SimState>>,
}

impl SimulatedTransport {
    fn with_script(script: Option<SimScript>) -> Self {
        let capability_after_checks = script
            .as_ref()
            .map(|s| s.capability_after_checks)
            .unwrap_or(Some(0));

        Self {
            shared: Arc::new(Mutex::new(SimState {
                script,
                capability_after_checks,
                capability_checks: 0,
                calls: Vec::new(),
                loaded: Vec::new(),
                sink: None,
                listener: None,
                next_session: 0,
                next_media: 0,
            })),
        }
    }

    /// Records calls, never answers
    pub fn manual() -> Self {
        Self::with_script(None)
    }

    /// Answers every call immediately according to `script`
    pub fn scripted(script: SimScript) -> Self {
        Self::with_script(Some(script))
    }

    /// A session handle backed by this transport
    pub fn session(&self, id: impl Into<String>, media: Vec<RemoteMedia>) -> SimulatedSession {
        SimulatedSession {
            id: id.into(),
            media,
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn set_capability_available(&self, available: bool) {
        let mut state = lock(&self.shared);
        state.capability_after_checks = available.then_some(0);
    }

    pub fn capability_checks(&self) -> u32 {
        lock(&self.shared).capability_checks
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.shared).calls.clone()
    }

    /// Every load request any session received, oldest first
    pub fn loaded_requests(&self) -> Vec<MediaLoadRequest> {
        lock(&self.shared).loaded.clone()
    }

    pub fn last_init_attempt(&self) -> Option<Attempt> {
        lock(&self.shared).attempts_of(|c| match c {
            TransportCall::Initialize(a) => Some(*a),
            _ => None,
        })
    }

    pub fn last_session_request(&self) -> Option<Attempt> {
        lock(&self.shared).attempts_of(|c| match c {
            TransportCall::RequestSession(a) => Some(*a),
            _ => None,
        })
    }

    pub fn session_request_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::RequestSession(_)))
    }

    pub fn stop_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Stop { .. }))
    }

    fn count(&self, pick: impl Fn(&TransportCall) -> bool) -> usize {
        lock(&self.shared).calls.iter().filter(|c| pick(c)).count()
    }

    /// Receiver availability changed
    pub fn announce_availability(&self, availability: CastAvailability) {
        lock(&self.shared).emit(CastEvent::ReceiverAvailability(availability));
    }

    /// A session already running on the receiver was found
    pub fn announce_rejoin(&self, id: impl Into<String>, media: Vec<RemoteMedia>) {
        let session = self.session(id, media);
        lock(&self.shared).emit(CastEvent::SessionRejoined(session));
    }

    /// The receiver ended the most recently listened-to session
    pub fn end_session_remotely(&self) {
        let state = lock(&self.shared);
        if let Some((_, attempt)) = state.listener.clone() {
            state.emit(CastEvent::SessionUpdated {
                attempt,
                is_alive: false,
            });
        }
    }
}

impl CastTransport for SimulatedTransport {
    type Session = SimulatedSession;

    fn is_capability_available(&self) -> bool {
        let mut state = lock(&self.shared);
        state.capability_checks += 1;
        match state.capability_after_checks {
            Some(after) => state.capability_checks > after,
            None => false,
        }
    }

    fn register_availability_listener(&mut self, sink: EventSink<SimulatedSession>) {
        let mut state = lock(&self.shared);
        state.calls.push(TransportCall::RegisterAvailabilityListener);
        state.sink = Some(sink);
    }

    fn register_rejoin_listener(&mut self, sink: EventSink<SimulatedSession>) {
        let mut state = lock(&self.shared);
        state.calls.push(TransportCall::RegisterRejoinListener);
        state.sink = Some(sink);
    }

    fn initialize(&mut self, config: &CastConfig, attempt: Attempt) {
        debug!(app_id = config.effective_app_id(), attempt = %attempt, "Simulated initialize");
        let mut state = lock(&self.shared);
        state.calls.push(TransportCall::Initialize(attempt));

        let Some(script) = state.script.clone() else {
            return;
        };
        if let Some(code) = script.init_error {
            state.emit(CastEvent::InitFailed {
                attempt,
                error: TransportError::new(code),
            });
            return;
        }

        state.emit(CastEvent::InitSucceeded { attempt });
        let availability = if script.receiver_available {
            CastAvailability::Available
        } else {
            CastAvailability::Unavailable
        };
        state.emit(CastEvent::ReceiverAvailability(availability));

        if let Some(media) = script.existing_media {
            let session = SimulatedSession {
                id: "existing-session".to_string(),
                media: vec![media],
                shared: Arc::clone(&self.shared),
            };
            state.emit(CastEvent::SessionRejoined(session));
        }
    }

    fn request_session(&mut self, attempt: Attempt) {
        let mut state = lock(&self.shared);
        state.calls.push(TransportCall::RequestSession(attempt));

        let Some(script) = state.script.clone() else {
            return;
        };
        let result = match script.session_error {
            Some(code) => Err(TransportError::new(code)),
            None => {
                state.next_session += 1;
                Ok(SimulatedSession {
                    id: format!("session-{}", state.next_session),
                    media: Vec::new(),
                    shared: Arc::clone(&self.shared),
                })
            }
        };
        state.emit(CastEvent::SessionRequested { attempt, result });
    }
}

/// Session handle issued by [`SimulatedTransport`]
#[derive(Debug, Clone)]
pub struct SimulatedSession {
    id: String,
    media: Vec<RemoteMedia>,
    shared: Arc<Mutex<SimState>>,
}

impl CastSession for SimulatedSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    fn media(&self) -> &[RemoteMedia] {
        &self.media
    }

    fn load_media(&mut self, request: &MediaLoadRequest, attempt: Attempt) {
        let mut state = lock(&self.shared);
        state.calls.push(TransportCall::LoadMedia {
            session_id: self.id.clone(),
            attempt,
        });
        state.loaded.push(request.clone());

        let Some(script) = state.script.clone() else {
            return;
        };
        let result = match script.load_error {
            Some(code) => Err(TransportError::new(code)),
            None => {
                state.next_media += 1;
                let media = RemoteMedia {
                    media_session_id: state.next_media,
                    content_id: request.source_uri().to_string(),
                    content_type: request.mime_type().to_string(),
                };
                self.media = vec![media.clone()];
                Ok(media)
            }
        };
        state.emit(CastEvent::MediaLoaded { attempt, result });
    }

    fn add_update_listener(&mut self, attempt: Attempt) {
        let mut state = lock(&self.shared);
        state.calls.push(TransportCall::AddUpdateListener {
            session_id: self.id.clone(),
            attempt,
        });
        state.listener = Some((self.id.clone(), attempt));
    }

    fn stop(&mut self, attempt: Attempt) {
        let mut state = lock(&self.shared);
        state.calls.push(TransportCall::Stop {
            session_id: self.id.clone(),
            attempt,
        });

        let Some(script) = state.script.clone() else {
            return;
        };
        match script.stop_error {
            Some(code) => state.emit(CastEvent::SessionStopped {
                attempt,
                result: Err(TransportError::new(code)),
            }),
            None => {
                state.emit(CastEvent::SessionStopped {
                    attempt,
                    result: Ok(()),
                });
                // The SDK also reports the dead session to its listener
                if let Some((id, listener)) = state.listener.clone() {
                    if id == self.id {
                        state.emit(CastEvent::SessionUpdated {
                            attempt: listener,
                            is_alive: false,
                        });
                    }
                }
            }
        }
    }
}

/// A command the controller issued to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum PlayerCommand {
    Pause,
    Play,
    Seek(f64),
    SetInactivityTimeout(u64),
    SetSources(Vec<MediaSource>),
    AttachRemote(String),
    SetUserActive(bool),
    ReportFatalError(String),
}

#[derive(Debug, Clone, Serialize)]
struct PlayerModel {
    source: Option<MediaSource>,
    position: f64,
    paused: bool,
    inactivity_timeout: Option<u64>,
    initial_sources: Vec<MediaSource>,
    remote: Option<RemotePlayback>,
    user_active: bool,
    affordance: CastAffordance,
    fatal_errors: Vec<String>,
    commands: Vec<PlayerCommand>,
}

/// Recording host player
#[derive(Debug, Clone)]
pub struct SimulatedPlayer {
    model: Arc<Mutex<PlayerModel>>,
}

impl SimulatedPlayer {
    /// A paused player with one configured source
    pub fn new(src: impl Into<String>, mime_type: impl Into<String>) -> Self {
        let source = MediaSource::new(src, mime_type);
        Self {
            model: Arc::new(Mutex::new(PlayerModel {
                source: Some(source.clone()),
                position: 0.0,
                paused: true,
                inactivity_timeout: None,
                initial_sources: vec![source],
                remote: None,
                user_active: false,
                affordance: CastAffordance::default(),
                fatal_errors: Vec::new(),
                commands: Vec::new(),
            })),
        }
    }

    pub fn set_position(&self, position: f64) {
        lock(&self.model).position = position;
    }

    pub fn set_playing(&self, playing: bool) {
        lock(&self.model).paused = !playing;
    }

    /// Switch the current source without touching the configured ones
    pub fn load_source(&self, src: impl Into<String>, mime_type: impl Into<String>) {
        lock(&self.model).source = Some(MediaSource::new(src, mime_type));
    }

    pub fn clear_source(&self) {
        lock(&self.model).source = None;
    }

    pub fn position(&self) -> f64 {
        lock(&self.model).position
    }

    pub fn is_paused_now(&self) -> bool {
        lock(&self.model).paused
    }

    pub fn inactivity_timeout_now(&self) -> Option<u64> {
        lock(&self.model).inactivity_timeout
    }

    pub fn remote(&self) -> Option<RemotePlayback> {
        lock(&self.model).remote.clone()
    }

    pub fn affordance(&self) -> CastAffordance {
        lock(&self.model).affordance
    }

    pub fn fatal_errors(&self) -> Vec<String> {
        lock(&self.model).fatal_errors.clone()
    }

    pub fn commands(&self) -> Vec<PlayerCommand> {
        lock(&self.model).commands.clone()
    }

    /// JSON snapshot of the player for reports
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(&*lock(&self.model)).unwrap_or_default()
    }
}

impl HostPlayer for SimulatedPlayer {
    fn current_source(&self) -> Option<String> {
        lock(&self.model).source.as_ref().map(|s| s.src.clone())
    }

    fn current_mime_type(&self) -> Option<String> {
        lock(&self.model).source.as_ref().map(|s| s.mime_type.clone())
    }

    fn current_time(&self) -> f64 {
        lock(&self.model).position
    }

    fn is_paused(&self) -> bool {
        lock(&self.model).paused
    }

    fn inactivity_timeout(&self) -> Option<u64> {
        lock(&self.model).inactivity_timeout
    }

    fn initial_sources(&self) -> Vec<MediaSource> {
        lock(&self.model).initial_sources.clone()
    }

    fn pause(&mut self) {
        let mut model = lock(&self.model);
        model.paused = true;
        model.commands.push(PlayerCommand::Pause);
    }

    fn play(&mut self) {
        let mut model = lock(&self.model);
        model.paused = false;
        model.commands.push(PlayerCommand::Play);
    }

    fn seek(&mut self, position: f64) {
        let mut model = lock(&self.model);
        model.position = position;
        model.commands.push(PlayerCommand::Seek(position));
    }

    fn set_inactivity_timeout(&mut self, timeout_ms: u64) {
        let mut model = lock(&self.model);
        model.inactivity_timeout = Some(timeout_ms);
        model.commands.push(PlayerCommand::SetInactivityTimeout(timeout_ms));
    }

    fn set_sources(&mut self, sources: &[MediaSource]) {
        let mut model = lock(&self.model);
        model.source = sources.first().cloned();
        model.remote = None;
        model.commands.push(PlayerCommand::SetSources(sources.to_vec()));
    }

    fn attach_remote(&mut self, remote: RemotePlayback) {
        let mut model = lock(&self.model);
        model.commands.push(PlayerCommand::AttachRemote(remote.session_id.clone()));
        model.remote = Some(remote);
    }

    fn set_user_active(&mut self, active: bool) {
        let mut model = lock(&self.model);
        model.user_active = active;
        model.commands.push(PlayerCommand::SetUserActive(active));
    }

    fn report_fatal_error(&mut self, error: &Error) {
        let mut model = lock(&self.model);
        model.fatal_errors.push(error.to_string());
        model.commands.push(PlayerCommand::ReportFatalError(error.error_code().to_string()));
    }

    fn update_affordance(&mut self, affordance: CastAffordance) {
        lock(&self.model).affordance = affordance;
    }
}
