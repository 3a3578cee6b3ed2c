//! Session types: the server's record of one live connection.

use skulk_protocol::{Address, RoomId, ServerMessage};
use skulk_transport::ConnectionId;
use tokio::sync::mpsc;

/// Queue feeding a connection's writer task.
///
/// Unbounded on purpose: a send from the orchestrator never waits on a slow
/// peer, and a closed queue just means the peer is gone.
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// A single connection's record.
///
/// Created when the gateway accepts a link and destroyed on disconnect.
#[derive(Debug, Clone)]
pub struct Session {
    /// The transport-issued connection id.
    pub id: ConnectionId,

    /// Identity bound by `authenticate`, if any.
    pub address: Option<Address>,

    /// Display name bound by `authenticate`, if any.
    pub name: Option<String>,

    /// The room this connection currently belongs to.
    pub room: Option<RoomId>,

    /// `true` when the connection sits in `room` as a player rather than a
    /// spectator.
    pub is_player: bool,

    pub(crate) outbound: Outbound,
}

impl Session {
    pub(crate) fn new(id: ConnectionId, outbound: Outbound) -> Self {
        Self {
            id,
            address: None,
            name: None,
            room: None,
            is_player: false,
            outbound,
        }
    }

    /// Returns `true` while the writer side of the connection is alive.
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}
