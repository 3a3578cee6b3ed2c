//! Core protocol types for Skulk's wire format.
//!
//! Every frame is a single JSON object tagged by `"type"`. Inbound frames
//! parse into [`ClientMessage`]; anything that doesn't match a known shape is
//! rejected at the boundary and never reaches room logic.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Location, Phase, RoomStatus, Side, WinReason};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's identity string (typically a wallet address).
///
/// Opaque to the server; it is never validated beyond being present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A unique identifier for a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Machine-readable code carried by every `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The frame was not a well-formed, known command.
    InvalidMessage,
    /// The command needs an identity and the connection has none.
    NotAuthenticated,
    RoomNotFound,
    RoomFull,
    NotEnoughPlayers,
    /// Players can only join or start a room that is still in its lobby.
    GameAlreadyStarted,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// One row of a room listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub player_count: usize,
    pub spectator_count: usize,
    pub max_players: usize,
    pub impostor_count: usize,
    pub status: RoomStatus,
}

/// The public state of one player. Never reveals the player's role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub address: Address,
    pub name: Option<String>,
    pub color: u8,
    pub location: Location,
    pub alive: bool,
    pub tasks_completed: u32,
    pub total_tasks: u32,
    pub has_voted: bool,
}

/// Full public snapshot of a room, sent as `room_update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    pub room_id: RoomId,
    pub status: RoomStatus,
    pub phase: Phase,
    pub round: u32,
    pub max_players: usize,
    pub impostor_count: usize,
    pub players: Vec<PlayerView>,
    pub spectator_count: usize,
}

// ---------------------------------------------------------------------------
// Inbound: client → server
// ---------------------------------------------------------------------------

/// Every command a client may send.
///
/// `#[serde(tag = "type", rename_all = "snake_case")]` produces frames like
/// `{"type":"join_room","room_id":1}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Binds an identity (and optional display name) to the connection.
    Authenticate {
        address: Address,
        #[serde(default)]
        name: Option<String>,
    },

    CreateRoom {
        #[serde(default)]
        max_players: Option<usize>,
        #[serde(default)]
        impostor_count: Option<usize>,
    },

    JoinRoom {
        room_id: RoomId,
        /// Preferred color/slot; defaults to the current player count.
        #[serde(default)]
        color: Option<u8>,
        #[serde(default)]
        as_spectator: bool,
    },

    LeaveRoom {
        room_id: RoomId,
    },

    StartGame {
        room_id: RoomId,
    },

    PositionUpdate {
        room_id: RoomId,
        location: Location,
    },

    /// The sender kills `target`. The body lands at `location`, or at the
    /// victim's last known location when omitted.
    Kill {
        room_id: RoomId,
        target: Address,
        #[serde(default)]
        location: Option<Location>,
    },

    /// `target: null` is a skip vote.
    Vote {
        room_id: RoomId,
        target: Option<Address>,
    },

    TaskComplete {
        room_id: RoomId,
        #[serde(default)]
        location: Option<Location>,
    },

    ReportBody {
        room_id: RoomId,
        location: Location,
    },

    /// Legacy manual override; only honored along a legal transition.
    PhaseChange {
        room_id: RoomId,
        phase: Phase,
    },
}

impl ClientMessage {
    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::CreateRoom { .. } => "create_room",
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom { .. } => "leave_room",
            Self::StartGame { .. } => "start_game",
            Self::PositionUpdate { .. } => "position_update",
            Self::Kill { .. } => "kill",
            Self::Vote { .. } => "vote",
            Self::TaskComplete { .. } => "task_complete",
            Self::ReportBody { .. } => "report_body",
            Self::PhaseChange { .. } => "phase_change",
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound: server → client
// ---------------------------------------------------------------------------

/// Every event the server emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame on every connection.
    Welcome {
        connection_id: u64,
        server_time: i64,
    },

    RoomList {
        rooms: Vec<RoomSummary>,
    },

    /// Reply to `create_room`, sent to the creator only.
    RoomCreated {
        room: RoomSummary,
    },

    RoomUpdate {
        room: RoomView,
    },

    PlayerJoined {
        room_id: RoomId,
        connection_id: u64,
        address: Option<Address>,
        spectator: bool,
    },

    PlayerLeft {
        room_id: RoomId,
        connection_id: u64,
        address: Option<Address>,
        spectator: bool,
    },

    PlayerMoved {
        room_id: RoomId,
        address: Address,
        from: Location,
        to: Location,
    },

    KillOccurred {
        room_id: RoomId,
        killer: Address,
        victim: Address,
        location: Location,
        round: u32,
    },

    VoteCast {
        room_id: RoomId,
        voter: Address,
        target: Option<Address>,
    },

    PlayerEjected {
        room_id: RoomId,
        ejected: Option<Address>,
        was_impostor: bool,
        round: u32,
    },

    TaskCompleted {
        room_id: RoomId,
        address: Address,
        tasks_completed: u32,
        total_tasks: u32,
        /// Aggregate crew progress, 0–100.
        task_progress: u8,
    },

    BodyReported {
        room_id: RoomId,
        reporter: Address,
        victim: Address,
        location: Location,
    },

    PhaseChanged {
        room_id: RoomId,
        phase: Phase,
        previous_phase: Phase,
        round: u32,
        /// Unix epoch milliseconds, or `None` for phases without a deadline.
        phase_ends_at: Option<i64>,
    },

    GameEnded {
        room_id: RoomId,
        winner: Side,
        reason: WinReason,
        impostors: Vec<Address>,
    },

    Error {
        code: ErrorCode,
        message: String,
    },
}

impl ServerMessage {
    /// Shorthand for an `error` event.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&RoomId(99)).unwrap(), "99");
        assert_eq!(RoomId(3).to_string(), "room-3");
    }

    #[test]
    fn test_address_is_transparent() {
        let json = serde_json::to_string(&Address::new("0xabc")).unwrap();
        assert_eq!(json, r#""0xabc""#);
    }

    #[test]
    fn test_error_code_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::NotEnoughPlayers).unwrap();
        assert_eq!(json, r#""NOT_ENOUGH_PLAYERS""#);
    }

    #[test]
    fn test_authenticate_name_is_optional() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"authenticate","address":"0x1"}"#)
                .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Authenticate {
                address: Address::new("0x1"),
                name: None,
            }
        );
    }

    #[test]
    fn test_create_room_defaults() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"create_room"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::CreateRoom {
                max_players: None,
                impostor_count: None,
            }
        );
    }

    #[test]
    fn test_join_room_spectator_flag_defaults_false() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join_room","room_id":1}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom {
                room_id: RoomId(1),
                color: None,
                as_spectator: false,
            }
        );
    }

    #[test]
    fn test_vote_null_target_is_skip() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"vote","room_id":1,"target":null}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Vote {
                room_id: RoomId(1),
                target: None,
            }
        );
    }

    #[test]
    fn test_vote_missing_target_is_skip_but_room_is_required() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"vote","room_id":1}"#);
        assert!(matches!(result, Ok(ClientMessage::Vote { target: None, .. })));
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"vote","target":"0x1"}"#);
        assert!(result.is_err(), "room_id is required");
    }

    #[test]
    fn test_position_update_rejects_unknown_location() {
        let result: Result<ClientMessage, _> = serde_json::from_str(
            r#"{"type":"position_update","room_id":1,"location":42}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_phase_change_uses_codes() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"phase_change","room_id":2,"phase":4}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::PhaseChange {
                room_id: RoomId(2),
                phase: Phase::Voting,
            }
        );
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"fly_to_moon","speed":9000}"#);
        assert!(result.is_err());
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"room_id":1}"#);
        assert!(result.is_err(), "missing tag");
    }

    #[test]
    fn test_phase_changed_json_format() {
        let msg = ServerMessage::PhaseChanged {
            room_id: RoomId(1),
            phase: Phase::Discussion,
            previous_phase: Phase::ActionCommit,
            round: 2,
            phase_ends_at: Some(1_700_000_030_000),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "phase_changed");
        assert_eq!(json["phase"], 3);
        assert_eq!(json["previous_phase"], 1);
        assert_eq!(json["round"], 2);
        assert_eq!(json["phase_ends_at"], 1_700_000_030_000i64);
    }

    #[test]
    fn test_player_ejected_json_format() {
        let msg = ServerMessage::PlayerEjected {
            room_id: RoomId(1),
            ejected: None,
            was_impostor: false,
            round: 1,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "player_ejected");
        assert!(json["ejected"].is_null());
        assert_eq!(json["was_impostor"], false);
    }

    #[test]
    fn test_game_ended_json_format() {
        let msg = ServerMessage::GameEnded {
            room_id: RoomId(4),
            winner: Side::Crewmates,
            reason: WinReason::Votes,
            impostors: vec![Address::new("0xbad")],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "game_ended");
        assert_eq!(json["winner"], "crewmates");
        assert_eq!(json["reason"], "votes");
        assert_eq!(json["impostors"][0], "0xbad");
    }

    #[test]
    fn test_error_json_format() {
        let json = serde_json::to_value(ServerMessage::error(
            ErrorCode::RoomNotFound,
            "room-9 not found",
        ))
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "ROOM_NOT_FOUND");
        assert_eq!(json["message"], "room-9 not found");
    }

    #[test]
    fn test_client_message_kind_matches_tag() {
        let msg = ClientMessage::ReportBody {
            room_id: RoomId(1),
            location: Location::Admin,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], msg.kind());
    }
}
