//! Wire protocol for Skulk.
//!
//! This crate defines the language that clients and the server speak:
//!
//! - **Types** ([`ClientMessage`], [`ServerMessage`], views, ids) - the
//!   structures that travel on the wire.
//! - **Game vocabulary** ([`Phase`], [`Location`], [`Side`], [`WinReason`]):
//!   small closed enums, phases and locations encoded as integer codes.
//! - **Codec** ([`Codec`], [`JsonCodec`]) - frames ↔ typed messages.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (frames) → Protocol (ClientMessage) → Room orchestrator
//! ```

mod codec;
mod error;
mod phase;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use phase::{Location, Phase, RoomStatus, Side, WinReason};
pub use types::{
    Address, ClientMessage, ErrorCode, PlayerView, RoomId, RoomSummary,
    RoomView, ServerMessage,
};
