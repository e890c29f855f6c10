//! Link protocol: JSON wire messages exchanged with the control server,
//! the device identity record, and the command-name → key-code table.
//!
//! Outbound messages are an internally tagged enum (`"type"` field).
//! Inbound command messages carry no `type`, so decoding goes through
//! [`codec::decode`] rather than a plain `serde` derive.

pub mod codec;
pub mod identity;
pub mod keycode;
pub mod message;

pub use codec::{decode, encode, CodecError};
pub use identity::DeviceIdentity;
pub use keycode::{resolve_key_code, KeyCode};
pub use message::{InboundMessage, OutboundMessage, RegistrationBody, BROADCAST_TARGET, STATUS_OK};

/// Default cap on inbound frame size before parsing.
pub const MAX_INBOUND_BYTES: usize = 64 * 1024;
