//! Unified error type for the Skulk server.

use skulk_protocol::ProtocolError;
use skulk_room::RoomError;
use skulk_session::SessionError;
use skulk_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// `#[from]` on each variant lets `?` lift sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum SkulkError {
    /// Binding, accepting, or talking to a socket failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// The orchestrator refused a command or is gone.
    #[error(transparent)]
    Room(#[from] RoomError),
}
