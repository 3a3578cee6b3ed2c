//! Win condition evaluation.
//!
//! Pure over a [`Census`], so evaluating twice yields the same answer. The
//! orchestrator guarantees a single `game_ended` by refusing to end a
//! room that already ended.

use skulk_protocol::{Side, WinReason};

use crate::Room;

/// What the evaluator needs to know about a running room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Census {
    pub alive_impostors: usize,
    pub alive_crew: usize,
    /// Aggregate crew task progress, 0–100.
    pub task_progress: u8,
}

impl Census {
    /// Counts a room's living roles. `None` before the game started.
    pub fn of(room: &Room) -> Option<Self> {
        let game = room.game.as_ref()?;
        let (alive_impostors, alive_crew) = room
            .players
            .iter()
            .filter(|p| p.alive)
            .fold((0, 0), |(imp, crew), p| {
                if game.is_impostor(&p.address) {
                    (imp + 1, crew)
                } else {
                    (imp, crew + 1)
                }
            });
        Some(Self {
            alive_impostors,
            alive_crew,
            task_progress: room.task_progress(),
        })
    }
}

/// Decides whether the game is over.
///
/// `check_tasks` enables the task victory, which only the task-completion
/// path asks for.
pub fn evaluate(census: Census, check_tasks: bool) -> Option<(Side, WinReason)> {
    if census.alive_impostors >= census.alive_crew && census.alive_crew > 0 {
        return Some((Side::Impostors, WinReason::Kills));
    }
    if census.alive_impostors == 0 {
        return Some((Side::Crewmates, WinReason::Votes));
    }
    if check_tasks && census.task_progress >= 100 {
        return Some((Side::Crewmates, WinReason::Tasks));
    }
    None
}
