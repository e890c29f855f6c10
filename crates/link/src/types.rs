//! Core types: connection state, collaborator seams, and errors.

use std::fmt;

/// Lifecycle state of the single managed transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// Teardown in progress.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// Process-level resources (singleton lock, wake-lock, …) released when
/// the link shuts down.
///
/// The manager calls [`release`](Self::release) exactly once, however
/// many times teardown is requested.
pub trait ExternalResources: Send + 'static {
    fn release(&mut self);
}

/// Errors a command executor can report.  Logged only; they never change
/// link state or the `confirm` reply.
#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    #[error("spawn: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("failed: {0}")]
    Failed(String),
}

/// Top-level link error.
#[derive(thiserror::Error, Debug)]
pub enum LinkError {
    #[error("config: {0}")]
    Config(String),
    #[error("websocket: {0}")]
    WebSocket(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("registration: {0}")]
    Registration(String),
    #[error("codec: {0}")]
    Codec(#[from] tl_protocol::CodecError),
    #[error("reconnect exhausted after {0} attempts")]
    ReconnectExhausted(u32),
    #[error("shutdown")]
    Shutdown,
}
