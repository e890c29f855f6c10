//! `tl-link`: persistent link between a device agent and its control
//! server.
//!
//! The crate owns the hard part of the agent: keeping exactly one
//! WebSocket alive across arbitrary network failures, detecting silent
//! half-open connections, and routing validated commands to a local
//! executor.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────── ConnectionManager (one task) ──────────────────────────┐
//! │                                                                                  │
//! │  Connector ──► TransportHandle ──events──► MessageRouter ──► CommandExecutor     │
//! │                      ▲                          │                                │
//! │                      └──── confirm / ping ◄─────┘                                │
//! │                                                                                  │
//! │  timers: ping (1×) · health (2×) · reconnect (backoff)    RegistrationClient     │
//! └──────────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow
//!
//! 1. Create a transport for the endpoint; construction failure or a
//!    handshake that outlives `connect_timeout` → reconnect
//! 2. On open: reset backoff, record activity, send `register`, fire the
//!    HTTP registration (once per process), arm ping + health timers
//! 3. Main loop:
//!    - Inbound frame: decode, record activity, dispatch; addressed
//!      commands are executed and confirmed with `status: "ok"`
//!    - Ping timer: send `ping`; a failed send forces a reconnect
//!    - Health timer: terminate the transport when idle for too long
//! 4. On close / fatal error / staleness: schedule a reconnect with capped
//!    exponential back-off; give up after `max_attempts`

pub mod builder;
pub mod executor;
pub mod health;
pub mod manager;
pub mod reconnect;
pub mod registration;
pub mod router;
pub mod transport;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::LinkBuilder;
pub use executor::CommandExecutor;
pub use health::{HealthMonitor, Heartbeat, Liveness};
pub use manager::{ConnectionManager, TimerSnapshot};
pub use reconnect::{BackoffState, ReconnectBackoff};
pub use registration::{HttpRegistrar, Registrar, RegistrationClient};
pub use router::MessageRouter;
pub use transport::{
    Connector, FrameKind, OutboundFrame, TransportEvent, TransportHandle, TransportPeer,
    WsConnector, DEFAULT_CONNECT_TIMEOUT,
};
pub use types::{ConnectionState, ExecError, ExternalResources, LinkError};

// Re-export protocol types so agents never need to import tl-protocol directly.
pub use tl_protocol::{DeviceIdentity, KeyCode, OutboundMessage, RegistrationBody};
