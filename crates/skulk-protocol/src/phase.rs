//! The game vocabulary shared by server and clients: phases, locations,
//! sides, and win reasons.
//!
//! Phases and locations travel as small integers so agents can encode
//! them compactly; `Phase` additionally owns the transition table.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Fine-grained phase of a room.
///
/// ```text
/// Lobby → ActionCommit → Discussion → Voting → VoteResult ─┐
///              ↑                                          │
///              └──────────────── (round + 1) ─────────────┘
/// ActionCommit / VoteResult → Ended
/// ```
///
/// Code 2 is reserved for an action-reveal step that is settled off-chain
/// and never entered here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Phase {
    Lobby = 0,
    ActionCommit = 1,
    Discussion = 3,
    Voting = 4,
    VoteResult = 5,
    Ended = 6,
}

impl Phase {
    /// The stable wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns `true` if moving from `self` to `target` is a legal edge.
    ///
    /// Any in-game phase may jump to `Ended`; the only backwards edge is
    /// `VoteResult → ActionCommit`.
    pub fn can_transition_to(self, target: Self) -> bool {
        use Phase::*;
        match (self, target) {
            (Lobby, ActionCommit)
            | (ActionCommit, Discussion)
            | (Discussion, Voting)
            | (Voting, VoteResult)
            | (VoteResult, ActionCommit) => true,
            (Lobby | Ended, Ended) => false,
            (_, Ended) => true,
            _ => false,
        }
    }

    /// Returns `true` once a game has started and not yet ended.
    pub fn is_in_game(self) -> bool {
        !matches!(self, Self::Lobby | Self::Ended)
    }
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> u8 {
        phase.code()
    }
}

impl TryFrom<u8> for Phase {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Lobby),
            1 => Ok(Self::ActionCommit),
            3 => Ok(Self::Discussion),
            4 => Ok(Self::Voting),
            5 => Ok(Self::VoteResult),
            6 => Ok(Self::Ended),
            other => Err(format!("unknown phase code {other}")),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lobby => "Lobby",
            Self::ActionCommit => "ActionCommit",
            Self::Discussion => "Discussion",
            Self::Voting => "Voting",
            Self::VoteResult => "VoteResult",
            Self::Ended => "Ended",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// Coarse room status shown in room listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Lobby,
    Playing,
    Ended,
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A map location. Players spawn in the cafeteria; tasks never live there.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize, Default,
)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Location {
    #[default]
    Cafeteria = 0,
    Admin = 1,
    Storage = 2,
    Electrical = 3,
    MedBay = 4,
    Reactor = 5,
    Navigation = 6,
    Weapons = 7,
    Shields = 8,
}

impl Location {
    /// Every location, in code order.
    pub const ALL: [Location; 9] = [
        Self::Cafeteria,
        Self::Admin,
        Self::Storage,
        Self::Electrical,
        Self::MedBay,
        Self::Reactor,
        Self::Navigation,
        Self::Weapons,
        Self::Shields,
    ];

    /// Locations that can host a task.
    pub fn task_locations() -> impl Iterator<Item = Location> {
        Self::ALL.into_iter().filter(|l| *l != Self::Cafeteria)
    }
}

impl From<Location> for u8 {
    fn from(location: Location) -> u8 {
        location as u8
    }
}

impl TryFrom<u8> for Location {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| format!("unknown location code {code}"))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The winning side of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Crewmates,
    Impostors,
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinReason {
    /// Impostors reached parity with the living crew.
    Kills,
    /// Every impostor is dead.
    Votes,
    /// The crew finished all their tasks.
    Tasks,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PHASES: [Phase; 6] = [
        Phase::Lobby,
        Phase::ActionCommit,
        Phase::Discussion,
        Phase::Voting,
        Phase::VoteResult,
        Phase::Ended,
    ];

    #[test]
    fn test_phase_forward_edges() {
        assert!(Phase::Lobby.can_transition_to(Phase::ActionCommit));
        assert!(Phase::ActionCommit.can_transition_to(Phase::Discussion));
        assert!(Phase::Discussion.can_transition_to(Phase::Voting));
        assert!(Phase::Voting.can_transition_to(Phase::VoteResult));
        assert!(Phase::VoteResult.can_transition_to(Phase::ActionCommit));
    }

    #[test]
    fn test_phase_rejects_skips_and_regressions() {
        assert!(!Phase::Lobby.can_transition_to(Phase::Voting));
        assert!(!Phase::ActionCommit.can_transition_to(Phase::Voting));
        assert!(!Phase::Voting.can_transition_to(Phase::Discussion));
        assert!(!Phase::Discussion.can_transition_to(Phase::ActionCommit));
        for phase in ALL_PHASES {
            assert!(!phase.can_transition_to(Phase::Lobby));
            assert!(!Phase::Ended.can_transition_to(phase));
        }
    }

    #[test]
    fn test_phase_ended_reachable_only_from_in_game_phases() {
        for phase in ALL_PHASES {
            assert_eq!(
                phase.can_transition_to(Phase::Ended),
                phase.is_in_game(),
                "{phase}"
            );
        }
    }

    #[test]
    fn test_phase_serializes_as_code() {
        assert_eq!(serde_json::to_string(&Phase::Voting).unwrap(), "4");
        let phase: Phase = serde_json::from_str("5").unwrap();
        assert_eq!(phase, Phase::VoteResult);
    }

    #[test]
    fn test_phase_reveal_code_is_not_a_phase() {
        assert!(Phase::try_from(2).is_err());
        assert!(serde_json::from_str::<Phase>("2").is_err());
    }

    #[test]
    fn test_location_codes() {
        assert_eq!(u8::from(Location::Cafeteria), 0);
        assert_eq!(Location::try_from(8), Ok(Location::Shields));
        assert!(Location::try_from(9).is_err());
        assert_eq!(Location::task_locations().count(), 8);
        assert!(Location::task_locations().all(|l| l != Location::Cafeteria));
    }

    #[test]
    fn test_outcome_json() {
        assert_eq!(
            serde_json::to_string(&Side::Impostors).unwrap(),
            r#""impostors""#
        );
        assert_eq!(serde_json::to_string(&WinReason::Tasks).unwrap(), r#""tasks""#);
        assert_eq!(
            serde_json::to_string(&RoomStatus::Playing).unwrap(),
            r#""playing""#
        );
    }
}
