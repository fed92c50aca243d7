//! Cast service - single-owner task around the controller
//!
//! The controller is not thread-safe by itself. `CastService` moves it onto
//! one tokio task and serializes everything that can touch it: host requests
//! arriving through a [`CastHandle`], transport events from the
//! [`EventSink`] channel, and the capability retry timer.

use crate::{
    config::CastConfig,
    controller::{CastSessionController, InitStatus, ToggleOutcome},
    error::Error,
    player::HostPlayer,
    transport::{CastEvent, CastTransport, EventSink},
    types::*,
    Result,
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Point-in-time view of a controller
#[derive(Debug, Clone, Serialize)]
pub struct CastSnapshot {
    pub controller: ControllerId,
    pub state: SessionState,
    pub initialized: bool,
    pub availability: CastAvailability,
    pub affordance: CastAffordance,
    pub restore_point: Option<RestorePoint>,
    pub session_id: Option<String>,
    pub capability_checks: u32,
    pub last_error: Option<String>,
    pub history: Vec<StateChange>,
}

enum Request {
    Initialize,
    Toggle {
        reply: oneshot::Sender<Result<ToggleOutcome>>,
    },
    PlaybackAboutToStart,
    Snapshot {
        reply: oneshot::Sender<CastSnapshot>,
    },
    Shutdown,
}

/// Cheap, cloneable handle to a running [`CastService`]
#[derive(Clone)]
pub struct CastHandle {
    requests: mpsc::UnboundedSender<Request>,
    state_rx: watch::Receiver<SessionState>,
}

impl CastHandle {
    fn send(&self, request: Request) -> Result<()> {
        self.requests.send(request).map_err(|_| Error::ServiceStopped)
    }

    /// Start (or retry) transport initialization
    pub fn initialize(&self) -> Result<()> {
        self.send(Request::Initialize)
    }

    /// The user pressed the cast button
    pub async fn toggle(&self) -> Result<ToggleOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Toggle { reply })?;
        rx.await.map_err(|_| Error::ServiceStopped)?
    }

    /// The host is about to start playback
    pub fn playback_about_to_start(&self) -> Result<()> {
        self.send(Request::PlaybackAboutToStart)
    }

    pub async fn snapshot(&self) -> Result<CastSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Snapshot { reply })?;
        rx.await.map_err(|_| Error::ServiceStopped)
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Wait until the controller reaches `target`
    pub async fn wait_for(&self, target: SessionState) -> Result<()> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| Error::ServiceStopped)
    }

    /// Stop the service task
    pub fn shutdown(&self) {
        let _ = self.requests.send(Request::Shutdown);
    }
}

/// Owner task of a [`CastSessionController`]
pub struct CastService<T: CastTransport, H: HostPlayer> {
    controller: CastSessionController<T, H>,
    requests: mpsc::UnboundedReceiver<Request>,
    events: mpsc::UnboundedReceiver<CastEvent<T::Session>>,
    state_tx: watch::Sender<SessionState>,
    /// Next capability check, when one is pending
    retry_at: Option<Instant>,
}

impl<T, H> CastService<T, H>
where
    T: CastTransport,
    H: HostPlayer,
{
    /// Build the controller and run it on a new task
    pub fn spawn(transport: T, host: H, config: CastConfig) -> Result<(CastHandle, JoinHandle<()>)> {
        let (sink, events) = EventSink::channel();
        let controller = CastSessionController::new(transport, host, config, sink)?;

        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(controller.state());

        let service = Self {
            controller,
            requests,
            events,
            state_tx,
            retry_at: None,
        };
        let task = tokio::spawn(service.run());

        Ok((
            CastHandle {
                requests: requests_tx,
                state_rx,
            },
            task,
        ))
    }

    async fn run(mut self) {
        info!(controller = %self.controller.id(), "Cast service started");

        loop {
            let retry_at = self.retry_at;

            // Pending transport events drain before the next host request
            tokio::select! {
                biased;
                Some(event) = self.events.recv() => {
                    if let Err(e) = self.controller.handle_event(event) {
                        warn!(error = %e, "Cast event rejected");
                    }
                }
                request = self.requests.recv() => match request {
                    Some(Request::Shutdown) | None => break,
                    Some(request) => self.handle_request(request),
                },
                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                    self.initialize();
                }
            }

            let current = self.controller.state();
            self.state_tx.send_if_modified(|state| {
                let changed = *state != current;
                *state = current;
                changed
            });
        }

        info!(controller = %self.controller.id(), "Cast service stopped");
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Initialize => self.initialize(),
            Request::Toggle { reply } => {
                let _ = reply.send(self.controller.on_toggle());
            }
            Request::PlaybackAboutToStart => {
                if let Err(e) = self.controller.on_playback_about_to_start() {
                    warn!(error = %e, "Could not reload receiver media");
                }
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Request::Shutdown => {}
        }
    }

    fn initialize(&mut self) {
        match self.controller.initialize() {
            Ok(InitStatus::RetryScheduled { attempt, delay }) => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Capability check scheduled");
                self.retry_at = Instant::now().checked_add(delay);
                if self.retry_at.is_none() {
                    warn!(attempt, "Capability retry delay out of range, retry abandoned");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Cast initialization abandoned"),
        }
    }

    fn snapshot(&self) -> CastSnapshot {
        let c = &self.controller;
        CastSnapshot {
            controller: c.id(),
            state: c.state(),
            initialized: c.is_initialized(),
            availability: c.availability(),
            affordance: c.affordance(),
            restore_point: c.restore_point(),
            session_id: c.session_id().map(str::to_string),
            capability_checks: c.capability_checks(),
            last_error: c.last_error().map(|e| e.to_string()),
            history: c.history().iter().cloned().collect(),
        }
    }
}
