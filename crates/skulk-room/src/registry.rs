//! Room registry: creates, tracks, and deletes rooms.

use std::collections::{BTreeMap, BTreeSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use skulk_protocol::{Address, Location, RoomId, RoomStatus, RoomSummary};
use skulk_transport::ConnectionId;

use crate::state::{GameState, PlayerState, Room};
use crate::{RoomError, RoomSettings};

/// What a departure did to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub was_player: bool,
    pub was_spectator: bool,
    /// The room has no spectators and no present players left.
    pub now_empty: bool,
}

/// Owns every room. Pure state: fan-out and timers live in the
/// orchestrator.
pub struct RoomRegistry {
    rooms: BTreeMap<RoomId, Room>,
    next_id: u64,
    settings: RoomSettings,
    rng: StdRng,
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings) -> Self {
        let rng = match settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rooms: BTreeMap::new(),
            next_id: 1,
            settings,
            rng,
        }
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    /// Allocates an id and opens an empty lobby.
    pub fn create(
        &mut self,
        max_players: Option<usize>,
        impostor_count: Option<usize>,
    ) -> &Room {
        let room_id = RoomId(self.next_id);
        self.next_id += 1;
        let room = Room::new(
            room_id,
            self.settings.capacity(max_players),
            self.settings.impostor_count(impostor_count),
        );
        tracing::info!(
            %room_id,
            max_players = room.max_players,
            impostor_count = room.impostor_count,
            "room created"
        );
        self.rooms.entry(room_id).or_insert(room)
    }

    pub fn get(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    pub fn get_mut(&mut self, room_id: RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(&room_id)
    }

    pub fn contains(&self, room_id: RoomId) -> bool {
        self.rooms.contains_key(&room_id)
    }

    /// One listing row per room, in id order.
    pub fn summaries(&self) -> Vec<RoomSummary> {
        self.rooms.values().map(Room::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Checks that `address` could join `room_id` as a player, without
    /// touching anything.
    pub fn check_player_join(
        &self,
        room_id: RoomId,
        address: &Address,
    ) -> Result<(), RoomError> {
        let room = self.rooms.get(&room_id).ok_or(RoomError::NotFound(room_id))?;
        if room.player(address).is_some_and(|p| !p.departed) {
            return Ok(());
        }
        if room.status != RoomStatus::Lobby {
            return Err(RoomError::GameAlreadyStarted(room_id));
        }
        if room.is_full() {
            return Err(RoomError::RoomFull(room_id));
        }
        Ok(())
    }

    /// Appends a fresh player. Joining twice under the same identity is a
    /// no-op; a player who left a running game cannot come back.
    pub fn add_player(
        &mut self,
        room_id: RoomId,
        address: Address,
        name: Option<String>,
        color: Option<u8>,
    ) -> Result<&Room, RoomError> {
        self.check_player_join(room_id, &address)?;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        if room.player(&address).is_none() {
            let color = color.unwrap_or(room.players.len() as u8);
            room.players.push(PlayerState::new(address, name, color));
        }
        Ok(room)
    }

    /// Appends a spectator. No capacity check.
    pub fn add_spectator(
        &mut self,
        room_id: RoomId,
        connection: ConnectionId,
    ) -> Result<&Room, RoomError> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        if !room.spectators.contains(&connection) {
            room.spectators.push(connection);
        }
        Ok(room)
    }

    /// Removes a connection from a room's spectators and, if `player` is
    /// given, that player from its roster.
    ///
    /// A player leaving a running game stays listed as dead and departed.
    pub fn remove_member(
        &mut self,
        room_id: RoomId,
        connection: ConnectionId,
        player: Option<&Address>,
    ) -> Option<Departure> {
        let room = self.rooms.get_mut(&room_id)?;

        let before = room.spectators.len();
        room.spectators.retain(|id| *id != connection);
        let was_spectator = room.spectators.len() != before;

        let mut was_player = false;
        if let Some(address) = player {
            if room.status == RoomStatus::Playing {
                if let Some(p) = room.players.iter_mut().find(|p| &p.address == address) {
                    was_player = !p.departed;
                    p.alive = false;
                    p.departed = true;
                }
                if let Some(game) = room.game.as_mut() {
                    game.votes.remove(address);
                }
            } else {
                let before = room.players.len();
                room.players.retain(|p| &p.address != address);
                was_player = room.players.len() != before;
            }
        }

        Some(Departure {
            was_player,
            was_spectator,
            now_empty: room.is_empty(),
        })
    }

    /// Deletes a room. Dropping it cancels its pending timer.
    pub fn remove(&mut self, room_id: RoomId) -> Option<Room> {
        let room = self.rooms.remove(&room_id)?;
        tracing::info!(%room_id, "room deleted");
        Some(room)
    }

    // -----------------------------------------------------------------------
    // Game start
    // -----------------------------------------------------------------------

    /// Moves a lobby to `Playing`: samples impostors, assigns tasks, and
    /// resets every player.
    ///
    /// The new game state sits in `Lobby` until the caller enters the
    /// first phase.
    pub fn start(&mut self, room_id: RoomId) -> Result<&Room, RoomError> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        if room.status != RoomStatus::Lobby {
            return Err(RoomError::GameAlreadyStarted(room_id));
        }
        let present = room.players.len();
        if present < self.settings.min_players {
            return Err(RoomError::NotEnoughPlayers {
                room_id,
                present,
                required: self.settings.min_players,
            });
        }

        let count = room.impostor_count.min(present / 3);
        let impostors: BTreeSet<Address> = index::sample(&mut self.rng, present, count)
            .into_iter()
            .map(|i| room.players[i].address.clone())
            .collect();

        let pool: Vec<Location> = Location::task_locations().collect();
        let per_player = (self.settings.tasks_per_player as usize).min(pool.len());
        for player in &mut room.players {
            player.location = Location::Cafeteria;
            player.alive = true;
            player.departed = false;
            player.has_voted = false;
            player.tasks_completed = 0;
            // Impostors show the same counter so views don't give them away.
            player.total_tasks = per_player as u32;
            player.task_locations = if impostors.contains(&player.address) {
                Vec::new()
            } else {
                index::sample(&mut self.rng, pool.len(), per_player)
                    .into_iter()
                    .map(|i| pool[i])
                    .collect()
            };
        }

        tracing::info!(
            %room_id,
            players = present,
            impostors = impostors.len(),
            "game started"
        );
        room.game = Some(GameState::new(impostors));
        room.status = RoomStatus::Playing;
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use skulk_protocol::Phase;

    use super::*;

    fn seeded() -> RoomRegistry {
        RoomRegistry::new(RoomSettings {
            rng_seed: Some(7),
            ..RoomSettings::default()
        })
    }

    fn addr(i: usize) -> Address {
        Address::new(format!("0x{i}"))
    }

    fn lobby_with(reg: &mut RoomRegistry, players: usize, impostors: usize) -> RoomId {
        let room_id = reg.create(Some(10), Some(impostors)).id;
        for i in 0..players {
            reg.add_player(room_id, addr(i), None, None).unwrap();
        }
        room_id
    }

    #[test]
    fn test_create_room_returns_unique_ids() {
        let mut reg = seeded();
        let r1 = reg.create(None, None).id;
        let r2 = reg.create(None, None).id;
        assert_ne!(r1, r2);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.summaries().len(), 2);
    }

    #[test]
    fn test_create_room_applies_defaults() {
        let mut reg = seeded();
        let room = reg.create(None, None);
        assert_eq!(room.max_players, 10);
        assert_eq!(room.impostor_count, 2);
        assert_eq!(room.status, RoomStatus::Lobby);
    }

    #[test]
    fn test_join_unknown_room() {
        let mut reg = seeded();
        let result = reg.add_player(RoomId(42), addr(1), None, None);
        assert!(matches!(result, Err(RoomError::NotFound(_))));
        let result = reg.add_spectator(RoomId(42), ConnectionId::new(1));
        assert!(matches!(result, Err(RoomError::NotFound(_))));
    }

    #[test]
    fn test_color_defaults_to_join_order() {
        let mut reg = seeded();
        let room_id = lobby_with(&mut reg, 3, 1);
        let colors: Vec<u8> = reg.get(room_id).unwrap().players.iter().map(|p| p.color).collect();
        assert_eq!(colors, vec![0, 1, 2]);

        let room = reg.add_player(room_id, addr(9), None, Some(7)).unwrap();
        assert_eq!(room.players[3].color, 7);
    }

    #[test]
    fn test_full_room_rejects_players_not_spectators() {
        let mut reg = seeded();
        let room_id = reg.create(Some(4), None).id;
        for i in 0..4 {
            reg.add_player(room_id, addr(i), None, None).unwrap();
        }
        let result = reg.add_player(room_id, addr(5), None, None);
        assert!(matches!(result, Err(RoomError::RoomFull(_))));
        assert_eq!(reg.get(room_id).unwrap().players.len(), 4);

        let room = reg.add_spectator(room_id, ConnectionId::new(9)).unwrap();
        assert_eq!(room.spectators.len(), 1);
    }

    #[test]
    fn test_rejoin_is_noop() {
        let mut reg = seeded();
        let room_id = lobby_with(&mut reg, 2, 1);
        reg.add_player(room_id, addr(0), None, None).unwrap();
        assert_eq!(reg.get(room_id).unwrap().players.len(), 2);
    }

    #[test]
    fn test_lobby_leave_removes_player() {
        let mut reg = seeded();
        let room_id = lobby_with(&mut reg, 1, 1);
        let departure = reg
            .remove_member(room_id, ConnectionId::new(1), Some(&addr(0)))
            .unwrap();
        assert!(departure.was_player);
        assert!(departure.now_empty);
        assert!(reg.get(room_id).unwrap().players.is_empty());
    }

    #[test]
    fn test_start_needs_four_players() {
        let mut reg = seeded();
        let room_id = lobby_with(&mut reg, 3, 1);
        let result = reg.start(room_id);
        assert!(matches!(
            result,
            Err(RoomError::NotEnoughPlayers { present: 3, required: 4, .. })
        ));
        let room = reg.get(room_id).unwrap();
        assert_eq!(room.status, RoomStatus::Lobby);
        assert!(room.game.is_none());
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut reg = seeded();
        let room_id = lobby_with(&mut reg, 4, 1);
        reg.start(room_id).unwrap();
        assert!(matches!(
            reg.start(room_id),
            Err(RoomError::GameAlreadyStarted(_))
        ));
        assert!(matches!(
            reg.add_player(room_id, addr(9), None, None),
            Err(RoomError::GameAlreadyStarted(_))
        ));
    }

    #[test]
    fn test_impostor_count_is_capped_by_a_third() {
        let mut reg = seeded();
        let five = lobby_with(&mut reg, 5, 2);
        let room = reg.start(five).unwrap();
        assert_eq!(room.game.as_ref().unwrap().impostors.len(), 1);

        let nine = lobby_with(&mut reg, 9, 2);
        let room = reg.start(nine).unwrap();
        assert_eq!(room.game.as_ref().unwrap().impostors.len(), 2);

        let six = lobby_with(&mut reg, 6, 3);
        let room = reg.start(six).unwrap();
        assert_eq!(room.game.as_ref().unwrap().impostors.len(), 2);
    }

    #[test]
    fn test_start_assigns_tasks_to_crew_only() {
        let mut reg = seeded();
        let room_id = lobby_with(&mut reg, 6, 2);
        let room = reg.start(room_id).unwrap();
        let game = room.game.as_ref().unwrap();
        assert_eq!(game.round, 1);
        assert_eq!(game.phase, Phase::Lobby);
        assert_eq!(room.status, RoomStatus::Playing);

        for player in &room.players {
            assert!(player.alive);
            assert_eq!(player.total_tasks, 4);
            if game.is_impostor(&player.address) {
                assert!(player.task_locations.is_empty());
            } else {
                let distinct: HashSet<_> = player.task_locations.iter().collect();
                assert_eq!(distinct.len(), 4);
                assert!(!player.task_locations.contains(&Location::Cafeteria));
            }
        }
    }

    #[test]
    fn test_seed_makes_sampling_reproducible() {
        let pick = || {
            let mut reg = seeded();
            let room_id = lobby_with(&mut reg, 10, 3);
            reg.start(room_id)
                .unwrap()
                .game
                .as_ref()
                .unwrap()
                .impostors
                .clone()
        };
        assert_eq!(pick(), pick());
    }

    #[test]
    fn test_departure_during_play_keeps_player_dead() {
        let mut reg = seeded();
        let room_id = lobby_with(&mut reg, 4, 1);
        reg.start(room_id).unwrap();

        let departure = reg
            .remove_member(room_id, ConnectionId::new(1), Some(&addr(2)))
            .unwrap();
        assert!(departure.was_player);
        assert!(!departure.now_empty);

        let room = reg.get(room_id).unwrap();
        assert_eq!(room.players.len(), 4);
        let gone = room.player(&addr(2)).unwrap();
        assert!(!gone.alive);
        assert!(gone.departed);
        assert_eq!(room.summary().player_count, 3);
    }

    #[test]
    fn test_spectator_departure() {
        let mut reg = seeded();
        let room_id = reg.create(None, None).id;
        reg.add_spectator(room_id, ConnectionId::new(3)).unwrap();

        let departure = reg.remove_member(room_id, ConnectionId::new(3), None).unwrap();
        assert!(departure.was_spectator);
        assert!(!departure.was_player);
        assert!(departure.now_empty);

        assert!(reg.remove(room_id).is_some());
        assert!(reg.is_empty());
        assert!(reg.remove_member(room_id, ConnectionId::new(3), None).is_none());
    }
}
