//! Room orchestration for Skulk.
//!
//! A single actor owns every room and every connection record. Rooms move
//! through the game's phases under client commands and per-room timers;
//! every state change fans out to the room's players and spectators.
//!
//! # Key types
//!
//! - [`OrchestratorHandle`]: send commands to the running actor
//! - [`RoomRegistry`]: creates/destroys rooms, enforces membership rules
//! - [`Room`], [`GameState`], [`PlayerState`]: what a room knows
//! - [`VoteTally`]: per-round vote aggregation and the tie rule
//! - [`win::evaluate`]: the win condition
//! - [`RoomSettings`]: capacities, role counts, phase durations

mod broadcast;
mod config;
mod error;
mod orchestrator;
mod registry;
mod state;
mod vote;
pub mod win;

pub use config::RoomSettings;
pub use error::RoomError;
pub use orchestrator::{OrchestratorHandle, RoomSnapshot, spawn_orchestrator};
pub use registry::{Departure, RoomRegistry};
pub use state::{DeadBody, GameState, PlayerState, Room};
pub use vote::{VoteOutcome, VoteTally};
pub use win::Census;
