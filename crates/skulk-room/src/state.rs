//! Room and game state owned by the registry.

use std::collections::{BTreeSet, HashMap};

use skulk_protocol::{
    Address, Location, Phase, PlayerView, RoomId, RoomStatus, RoomSummary,
    RoomView,
};
use skulk_timer::TimerHandle;
use skulk_transport::ConnectionId;

// ---------------------------------------------------------------------------
// PlayerState
// ---------------------------------------------------------------------------

/// One participant of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub address: Address,
    pub name: Option<String>,
    pub color: u8,
    pub location: Location,
    pub alive: bool,

    /// Set when the player left a running game. Departed players stay in
    /// the list as dead so the census stays right.
    pub departed: bool,

    pub tasks_completed: u32,
    pub total_tasks: u32,

    /// Assigned task locations not yet completed. Empty for impostors.
    pub task_locations: Vec<Location>,

    pub has_voted: bool,
}

impl PlayerState {
    pub fn new(address: Address, name: Option<String>, color: u8) -> Self {
        Self {
            address,
            name,
            color,
            location: Location::Cafeteria,
            alive: true,
            departed: false,
            tasks_completed: 0,
            total_tasks: 0,
            task_locations: Vec::new(),
            has_voted: false,
        }
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            address: self.address.clone(),
            name: self.name.clone(),
            color: self.color,
            location: self.location,
            alive: self.alive,
            tasks_completed: self.tasks_completed,
            total_tasks: self.total_tasks,
            has_voted: self.has_voted,
        }
    }
}

/// An unreported kill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadBody {
    pub victim: Address,
    pub location: Location,
    pub round: u32,
    pub reported: bool,
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// Game mechanics of a room that left its lobby.
#[derive(Debug)]
pub struct GameState {
    /// Fixed at start.
    pub impostors: BTreeSet<Address>,

    /// Voter → target, `None` for a skip. Cleared on entering `Voting`.
    pub votes: HashMap<Address, Option<Address>>,

    pub bodies: Vec<DeadBody>,
    pub round: u32,
    pub phase: Phase,

    /// Advertised end of the current phase, epoch milliseconds.
    pub phase_ends_at: Option<i64>,

    /// The room's only pending timer. Replacing it cancels the old one.
    pub(crate) timer: Option<TimerHandle>,
}

impl GameState {
    pub(crate) fn new(impostors: BTreeSet<Address>) -> Self {
        Self {
            impostors,
            votes: HashMap::new(),
            bodies: Vec::new(),
            round: 1,
            phase: Phase::Lobby,
            phase_ends_at: None,
            timer: None,
        }
    }

    pub fn is_impostor(&self, address: &Address) -> bool {
        self.impostors.contains(address)
    }

    /// Returns `true` while a timer is pending for this room.
    pub fn has_timer(&self) -> bool {
        self.timer.as_ref().is_some_and(TimerHandle::is_pending)
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// A lobby, running game, or finished game.
#[derive(Debug)]
pub struct Room {
    pub id: RoomId,

    /// Players in join order.
    pub players: Vec<PlayerState>,

    pub spectators: Vec<ConnectionId>,
    pub max_players: usize,
    pub impostor_count: usize,
    pub status: RoomStatus,

    /// Present from game start until the ended-state TTL runs out.
    pub game: Option<GameState>,
}

impl Room {
    pub fn new(id: RoomId, max_players: usize, impostor_count: usize) -> Self {
        Self {
            id,
            players: Vec::new(),
            spectators: Vec::new(),
            max_players,
            impostor_count,
            status: RoomStatus::Lobby,
            game: None,
        }
    }

    pub fn player(&self, address: &Address) -> Option<&PlayerState> {
        self.players.iter().find(|p| &p.address == address)
    }

    pub fn player_mut(&mut self, address: &Address) -> Option<&mut PlayerState> {
        self.players.iter_mut().find(|p| &p.address == address)
    }

    /// Players that have not left.
    pub fn present_players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.iter().filter(|p| !p.departed)
    }

    /// The current fine phase.
    pub fn phase(&self) -> Phase {
        match (&self.game, self.status) {
            (Some(game), _) => game.phase,
            (None, RoomStatus::Ended) => Phase::Ended,
            (None, _) => Phase::Lobby,
        }
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    /// A room with no spectators and no present players gets deleted.
    pub fn is_empty(&self) -> bool {
        self.spectators.is_empty() && self.present_players().next().is_none()
    }

    /// Aggregate crew task progress, 0–100.
    pub fn task_progress(&self) -> u8 {
        let Some(game) = &self.game else {
            return 0;
        };
        let (done, total) = self
            .players
            .iter()
            .filter(|p| !game.is_impostor(&p.address))
            .fold((0u64, 0u64), |(done, total), p| {
                (
                    done + u64::from(p.tasks_completed),
                    total + u64::from(p.total_tasks),
                )
            });
        if total == 0 {
            return 0;
        }
        ((done * 100) / total).min(100) as u8
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.id,
            player_count: self.present_players().count(),
            spectator_count: self.spectators.len(),
            max_players: self.max_players,
            impostor_count: self.impostor_count,
            status: self.status,
        }
    }

    /// The public snapshot. Roles stay hidden.
    pub fn view(&self) -> RoomView {
        RoomView {
            room_id: self.id,
            status: self.status,
            phase: self.phase(),
            round: self.game.as_ref().map_or(0, |g| g.round),
            max_players: self.max_players,
            impostor_count: self.impostor_count,
            players: self.present_players().map(PlayerState::view).collect(),
            spectator_count: self.spectators.len(),
        }
    }
}
