//! Room fan-out.

use skulk_protocol::ServerMessage;
use skulk_session::SessionManager;

use crate::Room;

/// Delivers `msg` to every present player and every spectator of `room`.
///
/// Players are resolved through the identity index, spectators by their
/// connection id. Best effort: closed or unknown recipients are skipped.
/// Returns how many deliveries were queued.
pub(crate) fn broadcast(sessions: &SessionManager, room: &Room, msg: &ServerMessage) -> usize {
    let players = room
        .present_players()
        .filter(|p| sessions.send_to_address(&p.address, msg.clone()))
        .count();
    let spectators = room
        .spectators
        .iter()
        .filter(|id| sessions.send(**id, msg.clone()))
        .count();
    tracing::trace!(room_id = %room.id, players, spectators, "broadcast");
    players + spectators
}

#[cfg(test)]
mod tests {
    use skulk_protocol::{Address, ErrorCode, RoomId};
    use skulk_transport::ConnectionId;
    use tokio::sync::mpsc;

    use super::*;
    use crate::state::PlayerState;

    #[test]
    fn test_reaches_players_and_spectators_skipping_closed() {
        let mut sessions = SessionManager::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();
        sessions.register(ConnectionId::new(1), tx1).unwrap();
        sessions.register(ConnectionId::new(2), tx2).unwrap();
        sessions.register(ConnectionId::new(3), tx3).unwrap();
        sessions
            .authenticate(ConnectionId::new(1), Address::new("0xa"), None)
            .unwrap();
        sessions
            .authenticate(ConnectionId::new(2), Address::new("0xb"), None)
            .unwrap();
        drop(rx2);

        let mut room = Room::new(RoomId(1), 10, 1);
        room.players.push(PlayerState::new(Address::new("0xa"), None, 0));
        room.players.push(PlayerState::new(Address::new("0xb"), None, 1));
        // Never authenticated: no connection speaks for it.
        room.players.push(PlayerState::new(Address::new("0xc"), None, 2));
        room.spectators.push(ConnectionId::new(3));

        let msg = ServerMessage::error(ErrorCode::InvalidMessage, "hi");
        assert_eq!(broadcast(&sessions, &room, &msg), 2);
        assert_eq!(rx1.try_recv().unwrap(), msg);
        assert_eq!(rx3.try_recv().unwrap(), msg);
    }

    #[test]
    fn test_departed_players_are_skipped() {
        let mut sessions = SessionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sessions.register(ConnectionId::new(1), tx).unwrap();
        sessions
            .authenticate(ConnectionId::new(1), Address::new("0xa"), None)
            .unwrap();

        let mut room = Room::new(RoomId(1), 10, 1);
        let mut player = PlayerState::new(Address::new("0xa"), None, 0);
        player.departed = true;
        room.players.push(player);

        let msg = ServerMessage::error(ErrorCode::InvalidMessage, "hi");
        assert_eq!(broadcast(&sessions, &room, &msg), 0);
        assert!(rx.try_recv().is_err());
    }
}
