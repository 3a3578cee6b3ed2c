//! Error types for the room layer.

use skulk_protocol::{ErrorCode, RoomId};
use skulk_session::SessionError;

/// Errors that can occur during room operations.
///
/// Most variants are caller mistakes reported back as an `error` event;
/// see [`RoomError::code`].
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room is full: no more player slots available.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    #[error("room {room_id} needs {required} players to start, has {present}")]
    NotEnoughPlayers {
        room_id: RoomId,
        present: usize,
        required: usize,
    },

    /// The room has left its lobby.
    #[error("room {0} has already started")]
    GameAlreadyStarted(RoomId),

    /// The command needs an identity and the connection has none.
    #[error("authenticate before sending this command")]
    NotAuthenticated,

    #[error(transparent)]
    Session(#[from] SessionError),

    /// The orchestrator's command channel is closed.
    #[error("orchestrator is unavailable")]
    Unavailable,
}

impl RoomError {
    /// The wire code reported to the caller, if this error is one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::NotFound(_) => Some(ErrorCode::RoomNotFound),
            Self::RoomFull(_) => Some(ErrorCode::RoomFull),
            Self::NotEnoughPlayers { .. } => Some(ErrorCode::NotEnoughPlayers),
            Self::GameAlreadyStarted(_) => Some(ErrorCode::GameAlreadyStarted),
            Self::NotAuthenticated => Some(ErrorCode::NotAuthenticated),
            Self::Session(_) | Self::Unavailable => None,
        }
    }
}
