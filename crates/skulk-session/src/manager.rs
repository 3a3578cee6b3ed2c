//! The session manager: tracks every live connection.
//!
//! # Concurrency note
//!
//! `SessionManager` is a plain struct over `HashMap`s. It is owned by the
//! orchestrator actor and only ever touched from that task, so it needs no
//! locking of its own.

use std::collections::HashMap;

use skulk_protocol::{Address, RoomId, ServerMessage};
use skulk_transport::ConnectionId;

use crate::{Outbound, Session, SessionError};

/// Registry of connections plus an identity → connection index.
///
/// ```text
/// register() ──→ authenticate() ──→ enter_room() / leave_room() ──→ remove()
/// ```
///
/// The identity index always points at the most recent connection that
/// authenticated as an address; an older connection for the same address
/// keeps its record but stops receiving the address's room events.
#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<ConnectionId, Session>,
    identities: HashMap<Address, ConnectionId>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly accepted connection and its outbound queue.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyRegistered`] on a duplicate id.
    pub fn register(
        &mut self,
        id: ConnectionId,
        outbound: Outbound,
    ) -> Result<&Session, SessionError> {
        if self.sessions.contains_key(&id) {
            return Err(SessionError::AlreadyRegistered(id));
        }
        self.sessions.insert(id, Session::new(id, outbound));
        tracing::debug!(conn_id = %id, "connection registered");
        Ok(&self.sessions[&id])
    }

    /// Binds an identity and optional display name to a connection.
    ///
    /// Returns the connection that previously held the identity, if it was
    /// a different one. Re-authenticating under a new address releases the
    /// old one.
    pub fn authenticate(
        &mut self,
        id: ConnectionId,
        address: Address,
        name: Option<String>,
    ) -> Result<Option<ConnectionId>, SessionError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NotFound(id))?;

        if let Some(old) = session.address.take() {
            if old != address && self.identities.get(&old) == Some(&id) {
                self.identities.remove(&old);
            }
        }
        session.address = Some(address.clone());
        session.name = name;

        let previous = self.identities.insert(address.clone(), id);
        tracing::info!(conn_id = %id, %address, "connection authenticated");
        Ok(previous.filter(|prev| *prev != id))
    }

    /// Drops a connection's record, releasing its identity if it still
    /// owns it.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        if let Some(address) = &session.address {
            if self.identities.get(address) == Some(&id) {
                self.identities.remove(address);
            }
        }
        tracing::debug!(conn_id = %id, "connection removed");
        Some(session)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// The identity bound to a connection.
    pub fn address_of(&self, id: ConnectionId) -> Option<&Address> {
        self.sessions.get(&id).and_then(|s| s.address.as_ref())
    }

    /// The connection currently speaking for `address`.
    pub fn connection_for(&self, address: &Address) -> Option<ConnectionId> {
        self.identities.get(address).copied()
    }

    /// Marks the connection as a member of `room_id`.
    pub fn enter_room(&mut self, id: ConnectionId, room_id: RoomId, is_player: bool) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.room = Some(room_id);
            session.is_player = is_player;
        }
    }

    /// Clears the connection's room membership.
    pub fn leave_room(&mut self, id: ConnectionId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.room = None;
            session.is_player = false;
        }
    }

    /// Clears membership for every connection that points at `room_id`.
    pub fn forget_room(&mut self, room_id: RoomId) {
        for session in self.sessions.values_mut() {
            if session.room == Some(room_id) {
                session.room = None;
                session.is_player = false;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    /// Queues a message for one connection.
    ///
    /// Returns `false` if the connection is unknown or its writer is gone;
    /// the failure is logged and otherwise swallowed.
    pub fn send(&self, id: ConnectionId, msg: ServerMessage) -> bool {
        let Some(session) = self.sessions.get(&id) else {
            tracing::debug!(conn_id = %id, "send to unknown connection skipped");
            return false;
        };
        if session.outbound.send(msg).is_err() {
            tracing::debug!(conn_id = %id, "send to closed connection skipped");
            return false;
        }
        true
    }

    /// Queues a message for whichever connection speaks for `address`.
    pub fn send_to_address(&self, address: &Address, msg: ServerMessage) -> bool {
        match self.connection_for(address) {
            Some(id) => self.send(id, msg),
            None => {
                tracing::debug!(%address, "no connection for address, skipped");
                false
            }
        }
    }

    /// Queues a message for every open connection. Returns how many
    /// deliveries were accepted.
    pub fn broadcast_all(&self, msg: &ServerMessage) -> usize {
        self.sessions
            .values()
            .filter(|s| s.is_open())
            .filter(|s| s.outbound.send(msg.clone()).is_ok())
            .count()
    }

    /// Number of tracked connections.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
