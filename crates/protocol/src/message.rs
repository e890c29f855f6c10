use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Target value that addresses every connected device.
pub const BROADCAST_TARGET: &str = "all";

/// Status reported in every `confirm` reply.
pub const STATUS_OK: &str = "ok";

/// Registration payload: sent as the `register` socket message and as the
/// body of the HTTP side-channel call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationBody {
    pub tv_id: String,
    pub model: String,
    pub ip: String,
    pub modeltv: String,
    pub cabangid: String,
}

/// Agent → server messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Announces the device after every successful open.
    Register(RegistrationBody),

    /// Application-level heartbeat.
    Ping {
        tv_id: String,
        ip: String,
        time: String,
    },

    /// Acknowledges a command request.
    Confirm {
        tv_id: String,
        command: String,
        status: String,
        time: String,
    },
}

impl OutboundMessage {
    pub fn ping(tv_id: impl Into<String>, ip: impl Into<String>) -> Self {
        Self::Ping {
            tv_id: tv_id.into(),
            ip: ip.into(),
            time: now_timestamp(),
        }
    }

    /// Build an `ok` confirmation for `command`.
    pub fn confirm_ok(tv_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self::Confirm {
            tv_id: tv_id.into(),
            command: command.into(),
            status: STATUS_OK.into(),
            time: now_timestamp(),
        }
    }

    /// Wire name of the message (`"register"`, `"ping"`, `"confirm"`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::Ping { .. } => "ping",
            Self::Confirm { .. } => "confirm",
        }
    }
}

/// Server → agent messages, as classified by [`crate::codec::decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Welcome { text: String },
    Pong,
    CommandRequest { target: String, command: String },
    /// Valid JSON that matches no known shape.
    Unrecognized { raw: String },
}

/// RFC 3339 UTC timestamp with millisecond precision.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
