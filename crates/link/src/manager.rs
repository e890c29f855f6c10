//! Connection manager: owns the single transport, every timer, and the
//! connect → open → closed state machine.
//!
//! All state lives in one [`ConnectionManager`] driven by one task, so no
//! locking is needed: transport events, timer firings, and shutdown are
//! multiplexed through a single `select!` and handled one at a time.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tl_protocol::{encode, DeviceIdentity, OutboundMessage};
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;

use crate::health::{HealthMonitor, Heartbeat, Liveness};
use crate::reconnect::BackoffState;
use crate::registration::RegistrationClient;
use crate::router::MessageRouter;
use crate::transport::{Connector, FrameKind, TransportEvent, TransportHandle};
use crate::types::{ConnectionState, ExternalResources, LinkError};

/// The ping, health-check and reconnect timers.  Each slot holds at most
/// one timer and replacing it drops (cancels) the previous one.
#[derive(Default)]
struct Timers {
    ping: Option<Interval>,
    health: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,
}

impl Timers {
    fn arm_ping(&mut self, period: Duration) {
        self.ping = Some(periodic(period));
    }

    fn arm_health(&mut self, period: Duration) {
        self.health = Some(periodic(period));
    }

    fn arm_reconnect(&mut self, delay: Duration) {
        self.reconnect = Some(Box::pin(sleep(delay)));
    }

    fn cancel_liveness(&mut self) {
        self.ping = None;
        self.health = None;
    }

    fn cancel_all(&mut self) {
        self.cancel_liveness();
        self.reconnect = None;
    }

    fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            ping: self.ping.is_some(),
            health: self.health.is_some(),
            reconnect: self.reconnect.is_some(),
        }
    }
}

/// Which timers are currently armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerSnapshot {
    pub ping: bool,
    pub health: bool,
    pub reconnect: bool,
}

/// Interval whose first tick is one `period` from now.
fn periodic(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

async fn next_event(transport: &mut Option<TransportHandle>) -> Option<TransportEvent> {
    match transport {
        Some(handle) => handle.next_event().await,
        None => pending().await,
    }
}

/// Outcome of one turn of the event loop.
enum Flow {
    Continue,
    Exit(LinkError),
}

/// Manages the persistent link to the control server.
///
/// Create via [`LinkBuilder`](crate::builder::LinkBuilder).
pub struct ConnectionManager {
    endpoint: String,
    identity: Arc<DeviceIdentity>,
    connector: Arc<dyn Connector>,
    router: MessageRouter,
    registration: RegistrationClient,
    resources: Option<Box<dyn ExternalResources>>,
    health: HealthMonitor,

    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    transport: Option<TransportHandle>,
    backoff: BackoffState,
    heartbeat: Heartbeat,
    timers: Timers,
    is_reconnecting: bool,
    exhausted: bool,
    shut_down: bool,
}

impl ConnectionManager {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        endpoint: String,
        identity: Arc<DeviceIdentity>,
        connector: Arc<dyn Connector>,
        router: MessageRouter,
        registration: RegistrationClient,
        resources: Option<Box<dyn ExternalResources>>,
        backoff: BackoffState,
        heartbeat: Heartbeat,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            endpoint,
            identity,
            connector,
            router,
            registration,
            resources,
            health: HealthMonitor,
            state: ConnectionState::Disconnected,
            state_tx,
            transport: None,
            backoff,
            heartbeat,
            timers: Timers::default(),
            is_reconnecting: false,
            exhausted: false,
            shut_down: false,
        }
    }

    /// Start a builder.
    pub fn builder() -> crate::builder::LinkBuilder {
        crate::builder::LinkBuilder::new()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Observe state transitions from outside the manager task.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    pub fn timers(&self) -> TimerSnapshot {
        self.timers.snapshot()
    }

    pub fn is_registered(&self) -> bool {
        self.registration.is_confirmed()
    }

    /// Run the link until shutdown or reconnect exhaustion.
    ///
    /// Always performs full teardown before returning.  Returns
    /// [`LinkError::Shutdown`] when `shutdown` is cancelled and
    /// [`LinkError::ReconnectExhausted`] when the attempt bound is hit.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), LinkError> {
        tracing::info!(
            endpoint = %self.endpoint,
            device_id = %self.identity.id,
            "starting link"
        );
        self.connect();
        loop {
            if let Flow::Exit(e) = self.turn(&shutdown).await {
                return Err(e);
            }
        }
    }

    /// Same as [`run`](Self::run), but returns a `JoinHandle`.
    pub fn spawn(
        self,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<(), LinkError>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Wait for the next event or timer and handle it.
    async fn turn(&mut self, shutdown: &CancellationToken) -> Flow {
        if self.exhausted {
            return Flow::Exit(LinkError::ReconnectExhausted(self.backoff.attempts()));
        }

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                tracing::info!(device_id = %self.identity.id, "shutdown requested");
                self.shutdown();
                return Flow::Exit(LinkError::Shutdown);
            }
            event = next_event(&mut self.transport) => self.handle_event(event),
            _ = fire(&mut self.timers.reconnect) => self.on_reconnect_timer(),
            _ = tick(&mut self.timers.health) => self.on_health_tick(),
            _ = tick(&mut self.timers.ping) => self.on_ping_tick(),
        }

        if self.exhausted {
            Flow::Exit(LinkError::ReconnectExhausted(self.backoff.attempts()))
        } else {
            Flow::Continue
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "link state");
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Create a fresh transport.  Construction failure goes straight to
    /// [`schedule_reconnect`](Self::schedule_reconnect).
    fn connect(&mut self) {
        if self.shut_down {
            return;
        }
        self.release_transport();
        self.set_state(ConnectionState::Connecting);
        tracing::info!(endpoint = %self.endpoint, attempt = self.backoff.attempts(), "connecting");

        match self.connector.connect(&self.endpoint) {
            Ok(handle) => self.transport = Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "failed to create transport");
                self.set_state(ConnectionState::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    fn on_open(&mut self) {
        self.set_state(ConnectionState::Open);
        self.backoff.reset();
        self.is_reconnecting = false;
        self.timers.reconnect = None;
        self.heartbeat.touch();
        self.timers.cancel_liveness();

        tracing::info!(
            endpoint = %self.endpoint,
            device_id = %self.identity.id,
            "link open"
        );

        let register = OutboundMessage::Register(self.identity.registration_body());
        if let Err(e) = self.send(&register) {
            tracing::warn!(error = %e, "failed to send register message");
        }
        self.registration.trigger(&self.identity);

        self.timers.arm_ping(self.heartbeat.ping_interval());
        self.timers.arm_health(self.heartbeat.check_period());
    }

    /// Plan the next connection attempt.  A no-op while one is pending.
    pub(crate) fn schedule_reconnect(&mut self) {
        if self.shut_down {
            return;
        }
        if self.is_reconnecting {
            tracing::debug!("reconnect already pending");
            return;
        }

        self.timers.cancel_liveness();
        self.release_transport();

        if self.backoff.exhausted() {
            tracing::error!(
                device_id = %self.identity.id,
                attempts = self.backoff.attempts(),
                "max reconnect attempts exhausted"
            );
            self.exhausted = true;
            self.shutdown();
            return;
        }

        self.is_reconnecting = true;
        let delay = self.backoff.next_delay();
        tracing::info!(
            device_id = %self.identity.id,
            attempt = self.backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        self.timers.arm_reconnect(delay);
    }

    fn on_reconnect_timer(&mut self) {
        self.timers.reconnect = None;
        self.is_reconnecting = false;
        self.connect();
    }

    /// Cancel every timer, release the transport and external resources.
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.set_state(ConnectionState::Closing);

        self.timers.cancel_all();
        self.is_reconnecting = false;
        if let Some(handle) = self.transport.take() {
            handle.close();
        }
        if let Some(mut resources) = self.resources.take() {
            resources.release();
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!(device_id = %self.identity.id, "link shut down");
    }

    /// Drop the current transport (listeners detached, close requested).
    fn release_transport(&mut self) {
        if let Some(handle) = self.transport.take() {
            handle.close();
        }
        if self.state != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Drop the current transport without a close handshake.
    fn terminate_transport(&mut self) {
        if let Some(handle) = self.transport.take() {
            handle.terminate();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    // ── Events ───────────────────────────────────────────────────────

    fn handle_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Opened) => {
                if self.state == ConnectionState::Connecting {
                    self.on_open();
                }
            }
            Some(TransportEvent::Message(raw)) => {
                if let Some(reply) = self.router.handle(&raw, &mut self.heartbeat) {
                    if self.state == ConnectionState::Open {
                        if let Err(e) = self.send(&reply) {
                            tracing::warn!(kind = reply.kind(), error = %e, "failed to send reply");
                        }
                    }
                }
            }
            Some(TransportEvent::Heartbeat) => {
                tracing::trace!("transport heartbeat frame");
                self.heartbeat.touch();
            }
            Some(TransportEvent::PingWritten) => {
                tracing::trace!("ping written");
                self.heartbeat.touch();
            }
            Some(TransportEvent::Closed { code, reason }) => {
                tracing::info!(code = ?code, reason = %reason, "connection closed");
                self.schedule_reconnect();
            }
            Some(TransportEvent::Errored { error, fatal: true }) => {
                tracing::warn!(error = %error, "connection error");
                self.terminate_transport();
                self.schedule_reconnect();
            }
            Some(TransportEvent::Errored { error, fatal: false }) => {
                tracing::warn!(error = %error, "transport error");
            }
            None => {
                tracing::info!("transport ended");
                self.schedule_reconnect();
            }
        }
    }

    /// Queue a ping.  Activity is recorded when the transport reports the
    /// write ([`TransportEvent::PingWritten`]), not here.
    fn on_ping_tick(&mut self) {
        if self.state != ConnectionState::Open {
            return;
        }
        let ping = OutboundMessage::ping(&self.identity.id, &self.identity.ip);
        match self.send(&ping) {
            Ok(()) => tracing::trace!("ping queued"),
            Err(e) => {
                tracing::warn!(error = %e, "ping failed, forcing reconnect");
                self.terminate_transport();
                self.schedule_reconnect();
            }
        }
    }

    fn on_health_tick(&mut self) {
        if self.state != ConnectionState::Open {
            return;
        }
        match self.health.check(&self.heartbeat, Instant::now()) {
            Liveness::Fresh { idle } => {
                tracing::trace!(idle_ms = idle.as_millis() as u64, "link healthy");
            }
            Liveness::Stale { idle } => {
                tracing::warn!(
                    idle_ms = idle.as_millis() as u64,
                    threshold_ms = self.heartbeat.stale_after().as_millis() as u64,
                    "link stale, terminating"
                );
                self.terminate_transport();
                self.schedule_reconnect();
            }
        }
    }

    fn send(&self, msg: &OutboundMessage) -> Result<(), LinkError> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| LinkError::Transport("no transport".into()))?;
        let kind = match msg {
            OutboundMessage::Ping { .. } => FrameKind::Ping,
            _ => FrameKind::Data,
        };
        transport.send(encode(msg)?, kind)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
