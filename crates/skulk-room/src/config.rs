//! Room settings: capacities, role counts, and phase durations.

use std::time::Duration;

use skulk_protocol::Phase;

// ---------------------------------------------------------------------------
// RoomSettings
// ---------------------------------------------------------------------------

/// Settings shared by every room an orchestrator runs.
///
/// `Default` carries the standard game constants; tests typically override
/// `rng_seed` and leave the rest alone.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Minimum players required to start a game.
    pub min_players: usize,

    /// Capacity used when `create_room` omits `max_players`.
    pub default_max_players: usize,

    /// Hard ceiling on any requested capacity.
    pub max_players_limit: usize,

    /// Impostor count used when `create_room` omits it.
    pub default_impostor_count: usize,

    /// Distinct task locations assigned to each crewmate.
    pub tasks_per_player: u32,

    pub discussion: Duration,
    pub voting: Duration,

    /// Pause after an ejection before play resumes or the game ends.
    pub vote_result_pause: Duration,

    /// Length of the action window. Only advertised in `phase_ends_at`;
    /// the action phase ends on a body report, never on a timer.
    pub action_window: Option<Duration>,

    /// How long an ended room keeps its game state.
    pub ended_state_ttl: Duration,

    /// Seed for impostor and task sampling. `None` draws from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            min_players: 4,
            default_max_players: 10,
            max_players_limit: 15,
            default_impostor_count: 2,
            tasks_per_player: 4,
            discussion: Duration::from_secs(30),
            voting: Duration::from_secs(30),
            vote_result_pause: Duration::from_secs(5),
            action_window: None,
            ended_state_ttl: Duration::from_secs(60),
            rng_seed: None,
        }
    }
}

impl RoomSettings {
    /// How long `phase` lasts before it advances on its own.
    ///
    /// `None` for phases that only end on an event.
    pub fn phase_duration(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::Discussion => Some(self.discussion),
            Phase::Voting => Some(self.voting),
            Phase::VoteResult => Some(self.vote_result_pause),
            Phase::Lobby | Phase::ActionCommit | Phase::Ended => None,
        }
    }

    /// The deadline announced to clients on entering `phase`.
    pub fn advertised_duration(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::ActionCommit => self.action_window,
            other => self.phase_duration(other),
        }
    }

    /// Resolves a requested capacity against the configured bounds.
    pub fn capacity(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_max_players)
            .clamp(self.min_players, self.max_players_limit)
    }

    /// Resolves a requested impostor count. A room always asks for at
    /// least one impostor; the start-time cap still applies on top.
    pub fn impostor_count(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_impostor_count).max(1)
    }
}
