//! The orchestrator actor: one Tokio task that owns every connection
//! record and every room.
//!
//! The gateway talks to it through an [`OrchestratorHandle`]. Commands and
//! timer expirations arrive on the same loop and each runs to completion
//! before the next one starts, so no room state is ever shared.
//!
//! ```text
//! gateway ──Command──→ ┌──────────────┐ ──ServerMessage──→ outbound queues
//!                      │ Orchestrator │
//! timers ──Expired───→ └──────────────┘
//! ```

use std::time::Duration;

use skulk_protocol::{
    Address, ClientMessage, ErrorCode, Location, Phase, RoomId, RoomStatus, RoomSummary,
    RoomView, ServerMessage, Side, WinReason,
};
use skulk_session::{Outbound, SessionError, SessionManager};
use skulk_timer::{Expired, TimerHandle, Timers};
use skulk_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};

use crate::broadcast::broadcast;
use crate::state::{DeadBody, Room};
use crate::vote::VoteTally;
use crate::win::{self, Census};
use crate::{RoomError, RoomRegistry, RoomSettings};

/// Command channel capacity.
const DEFAULT_CHANNEL_SIZE: usize = 256;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Everything the outside world can ask of the orchestrator.
pub(crate) enum Command {
    /// A connection was accepted; `outbound` feeds its writer.
    Connect {
        id: ConnectionId,
        outbound: Outbound,
    },

    /// The connection closed. Same cleanup as leaving its room.
    Disconnect { id: ConnectionId },

    /// A parsed client command.
    Inbound {
        id: ConnectionId,
        msg: ClientMessage,
    },

    /// A frame that failed to parse. Answered with `INVALID_MESSAGE`.
    Reject {
        id: ConnectionId,
        reason: String,
    },

    Snapshot {
        room_id: RoomId,
        reply: oneshot::Sender<Option<RoomSnapshot>>,
    },

    ListRooms {
        reply: oneshot::Sender<Vec<RoomSummary>>,
    },

    Shutdown,
}

/// What a room's timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerAction {
    /// `phase` ran its full duration.
    PhaseElapsed { room_id: RoomId, phase: Phase },
    /// The ended-state TTL ran out.
    DiscardState { room_id: RoomId },
}

impl TimerAction {
    fn room_id(self) -> RoomId {
        match self {
            Self::PhaseElapsed { room_id, .. } | Self::DiscardState { room_id } => room_id,
        }
    }
}

/// Internal view of one room, roles included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub view: RoomView,
    pub impostors: Vec<Address>,
    /// Size of the votes map.
    pub votes: usize,
    pub unreported_bodies: usize,
    pub phase_ends_at: Option<i64>,
    pub timer_pending: bool,
    /// `false` once the ended-state TTL discarded the game state.
    pub has_game_state: bool,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to the running orchestrator.
///
/// Cheap to clone. Commands are queued in order, so a query sent after a
/// command observes that command's effects.
#[derive(Clone)]
pub struct OrchestratorHandle {
    sender: mpsc::Sender<Command>,
}

impl OrchestratorHandle {
    async fn send(&self, cmd: Command) -> Result<(), RoomError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RoomError::Unavailable)
    }

    /// Registers a new connection. It receives `welcome` and `room_list`.
    pub async fn connect(
        &self,
        id: ConnectionId,
        outbound: Outbound,
    ) -> Result<(), RoomError> {
        self.send(Command::Connect { id, outbound }).await
    }

    pub async fn disconnect(&self, id: ConnectionId) -> Result<(), RoomError> {
        self.send(Command::Disconnect { id }).await
    }

    /// Queues a client command (fire-and-forget; replies travel through
    /// the connection's outbound queue).
    pub async fn submit(
        &self,
        id: ConnectionId,
        msg: ClientMessage,
    ) -> Result<(), RoomError> {
        self.send(Command::Inbound { id, msg }).await
    }

    /// Reports an unparseable frame back to its connection, in order with
    /// everything else the connection receives.
    pub async fn reject(
        &self,
        id: ConnectionId,
        reason: impl Into<String>,
    ) -> Result<(), RoomError> {
        let reason = reason.into();
        self.send(Command::Reject { id, reason }).await
    }

    /// Full internal state of one room, or `None` if it doesn't exist.
    pub async fn room_snapshot(
        &self,
        room_id: RoomId,
    ) -> Result<Option<RoomSnapshot>, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { room_id, reply }).await?;
        rx.await.map_err(|_| RoomError::Unavailable)
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomSummary>, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ListRooms { reply }).await?;
        rx.await.map_err(|_| RoomError::Unavailable)
    }

    /// Stops the actor. Pending timers die with it.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.send(Command::Shutdown).await
    }
}

/// Spawns the orchestrator task and returns a handle to it.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_orchestrator(settings: RoomSettings) -> OrchestratorHandle {
    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_SIZE);
    let actor = Orchestrator {
        sessions: SessionManager::new(),
        rooms: RoomRegistry::new(settings),
        timers: Timers::new(),
        receiver: rx,
    };
    tokio::spawn(actor.run());
    OrchestratorHandle { sender: tx }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct Orchestrator {
    sessions: SessionManager,
    rooms: RoomRegistry,
    timers: Timers<TimerAction>,
    receiver: mpsc::Receiver<Command>,
}

impl Orchestrator {
    /// Processes commands and timer expirations until shutdown.
    async fn run(mut self) {
        tracing::info!("orchestrator started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                fired = self.timers.expired() => self.on_timer(fired),
            }
        }

        tracing::info!(
            rooms = self.rooms.len(),
            timers = self.timers.pending(),
            "orchestrator stopped"
        );
    }

    /// Returns `false` when the actor should stop.
    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Connect { id, outbound } => self.on_connect(id, outbound),
            Command::Disconnect { id } => self.on_disconnect(id),
            Command::Inbound { id, msg } => self.on_message(id, msg),
            Command::Reject { id, reason } => {
                tracing::warn!(conn_id = %id, %reason, "malformed message rejected");
                self.sessions
                    .send(id, ServerMessage::error(ErrorCode::InvalidMessage, reason));
            }
            Command::Snapshot { room_id, reply } => {
                let _ = reply.send(self.snapshot(room_id));
            }
            Command::ListRooms { reply } => {
                let _ = reply.send(self.rooms.summaries());
            }
            Command::Shutdown => return false,
        }
        true
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    fn on_connect(&mut self, id: ConnectionId, outbound: Outbound) {
        if let Err(err) = self.sessions.register(id, outbound) {
            tracing::warn!(conn_id = %id, %err, "connection not registered");
            return;
        }
        tracing::info!(conn_id = %id, connections = self.sessions.len(), "connection opened");
        self.sessions.send(
            id,
            ServerMessage::Welcome {
                connection_id: id.into_inner(),
                server_time: now_millis(),
            },
        );
        self.sessions.send(
            id,
            ServerMessage::RoomList {
                rooms: self.rooms.summaries(),
            },
        );
    }

    fn on_disconnect(&mut self, id: ConnectionId) {
        if let Some(room_id) = self.sessions.get(id).and_then(|s| s.room) {
            self.depart(id, room_id);
        }
        if self.sessions.remove(id).is_some() {
            tracing::info!(conn_id = %id, connections = self.sessions.len(), "connection closed");
        }
    }

    fn on_message(&mut self, id: ConnectionId, msg: ClientMessage) {
        let kind = msg.kind();
        tracing::trace!(conn_id = %id, kind, "command received");
        if let Err(err) = self.dispatch(id, msg) {
            match err.code() {
                Some(code) => {
                    tracing::info!(conn_id = %id, kind, %err, "command rejected");
                    self.sessions.send(id, ServerMessage::error(code, err.to_string()));
                }
                None => tracing::warn!(conn_id = %id, kind, %err, "command failed"),
            }
        }
    }

    fn dispatch(&mut self, conn: ConnectionId, msg: ClientMessage) -> Result<(), RoomError> {
        match msg {
            ClientMessage::Authenticate { address, name } => {
                self.authenticate(conn, address, name)
            }
            ClientMessage::CreateRoom {
                max_players,
                impostor_count,
            } => {
                self.create_room(conn, max_players, impostor_count);
                Ok(())
            }
            ClientMessage::JoinRoom {
                room_id,
                color,
                as_spectator,
            } => self.join_room(conn, room_id, color, as_spectator),
            ClientMessage::LeaveRoom { room_id } => self.leave_room(conn, room_id),
            ClientMessage::StartGame { room_id } => self.start_game(conn, room_id),
            ClientMessage::PositionUpdate { room_id, location } => {
                if let Some(actor) = self.seat(conn, room_id, "position_update")? {
                    self.position_update(room_id, actor, location);
                }
                Ok(())
            }
            ClientMessage::Kill {
                room_id,
                target,
                location,
            } => {
                if let Some(actor) = self.seat(conn, room_id, "kill")? {
                    self.kill(room_id, actor, target, location);
                }
                Ok(())
            }
            ClientMessage::Vote { room_id, target } => {
                if let Some(actor) = self.seat(conn, room_id, "vote")? {
                    self.vote(room_id, actor, target);
                }
                Ok(())
            }
            ClientMessage::TaskComplete { room_id, location } => {
                if let Some(actor) = self.seat(conn, room_id, "task_complete")? {
                    self.task_complete(room_id, actor, location);
                }
                Ok(())
            }
            ClientMessage::ReportBody { room_id, location } => {
                if let Some(actor) = self.seat(conn, room_id, "report_body")? {
                    self.report_body(room_id, actor, location);
                }
                Ok(())
            }
            ClientMessage::PhaseChange { room_id, phase } => {
                if let Some(actor) = self.seat(conn, room_id, "phase_change")? {
                    self.phase_change(room_id, actor, phase);
                }
                Ok(())
            }
        }
    }

    /// The address `conn` speaks for.
    ///
    /// Only the newest connection authenticated as an address holds it; a
    /// superseded connection is treated as unauthenticated.
    fn identity(&self, conn: ConnectionId) -> Result<Address, RoomError> {
        let session = self
            .sessions
            .get(conn)
            .ok_or(SessionError::NotFound(conn))?;
        let address = session.address.as_ref().ok_or(RoomError::NotAuthenticated)?;
        if self.sessions.connection_for(address) != Some(conn) {
            tracing::debug!(conn_id = %conn, %address, "identity held by a newer connection");
            return Err(RoomError::NotAuthenticated);
        }
        Ok(address.clone())
    }

    /// Resolves the identity a game command acts under.
    ///
    /// Errors when the caller has no current identity or the room is
    /// unknown; `Ok(None)` when the connection isn't seated in the room as a
    /// player.
    fn seat(
        &self,
        conn: ConnectionId,
        room_id: RoomId,
        kind: &'static str,
    ) -> Result<Option<Address>, RoomError> {
        let address = self.identity(conn)?;
        if !self.rooms.contains(room_id) {
            return Err(RoomError::NotFound(room_id));
        }
        let seated = self
            .sessions
            .get(conn)
            .is_some_and(|s| s.room == Some(room_id) && s.is_player);
        if !seated {
            dropped(room_id, &address, kind, "not seated in room");
            return Ok(None);
        }
        Ok(Some(address))
    }

    fn authenticate(
        &mut self,
        conn: ConnectionId,
        address: Address,
        name: Option<String>,
    ) -> Result<(), RoomError> {
        // A seated player switching identity gives up its seat first.
        let seat = self
            .sessions
            .get(conn)
            .filter(|s| s.is_player && s.address.as_ref() != Some(&address))
            .and_then(|s| s.room);
        if let Some(room_id) = seat {
            self.depart(conn, room_id);
        }

        let previous = self.sessions.authenticate(conn, address, name)?;

        // The newest connection for an identity inherits its seat.
        let inherited = previous
            .and_then(|prev| self.sessions.get(prev))
            .filter(|s| s.is_player)
            .and_then(|s| s.room.map(|room_id| (s.id, room_id)));
        if let Some((prev, room_id)) = inherited {
            if let Some(current) = self.sessions.get(conn).and_then(|s| s.room) {
                self.depart(conn, current);
            }
            self.sessions.leave_room(prev);
            self.sessions.enter_room(conn, room_id, true);
            tracing::info!(%room_id, conn_id = %conn, previous = %prev, "seat taken over");
            if let Some(room) = self.rooms.get(room_id) {
                self.sessions.send(conn, ServerMessage::RoomUpdate { room: room.view() });
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Registry operations
    // -----------------------------------------------------------------------

    fn create_room(
        &mut self,
        conn: ConnectionId,
        max_players: Option<usize>,
        impostor_count: Option<usize>,
    ) {
        let summary = self.rooms.create(max_players, impostor_count).summary();
        self.sessions.send(conn, ServerMessage::RoomCreated { room: summary });
        self.broadcast_room_list();
    }

    fn join_room(
        &mut self,
        conn: ConnectionId,
        room_id: RoomId,
        color: Option<u8>,
        as_spectator: bool,
    ) -> Result<(), RoomError> {
        if !self.rooms.contains(room_id) {
            return Err(RoomError::NotFound(room_id));
        }
        let (name, current) = match self.sessions.get(conn) {
            Some(s) => (s.name.clone(), s.room),
            None => return Err(SessionError::NotFound(conn).into()),
        };

        // Validate before touching the caller's current room.
        let player = if as_spectator {
            None
        } else {
            let address = self.identity(conn)?;
            self.rooms.check_player_join(room_id, &address)?;
            Some(address)
        };

        if current == Some(room_id) {
            if let Some(room) = self.rooms.get(room_id) {
                self.sessions.send(conn, ServerMessage::RoomUpdate { room: room.view() });
            }
            return Ok(());
        }
        if let Some(current) = current {
            self.depart(conn, current);
        }

        let room = match player {
            Some(address) => self.rooms.add_player(room_id, address, name, color)?,
            None => self.rooms.add_spectator(room_id, conn)?,
        };
        self.sessions.enter_room(conn, room_id, !as_spectator);
        tracing::info!(
            %room_id,
            conn_id = %conn,
            spectator = as_spectator,
            players = room.players.len(),
            "member joined"
        );

        let joined = ServerMessage::PlayerJoined {
            room_id,
            connection_id: conn.into_inner(),
            address: self.sessions.address_of(conn).cloned(),
            spectator: as_spectator,
        };
        broadcast(&self.sessions, room, &joined);
        broadcast(&self.sessions, room, &ServerMessage::RoomUpdate { room: room.view() });
        Ok(())
    }

    fn leave_room(&mut self, conn: ConnectionId, room_id: RoomId) -> Result<(), RoomError> {
        if !self.rooms.contains(room_id) {
            return Err(RoomError::NotFound(room_id));
        }
        if self.sessions.get(conn).and_then(|s| s.room) != Some(room_id) {
            tracing::debug!(%room_id, conn_id = %conn, "leave from non-member ignored");
            return Ok(());
        }
        self.depart(conn, room_id);
        Ok(())
    }

    /// Removes `conn` from `room_id`: explicit leave, disconnect, or a
    /// switch to another room.
    fn depart(&mut self, conn: ConnectionId, room_id: RoomId) {
        let (address, is_player) = self
            .sessions
            .get(conn)
            .map_or((None, false), |s| (s.address.clone(), s.is_player));
        self.sessions.leave_room(conn);

        let player = address.as_ref().filter(|_| is_player);
        let Some(departure) = self.rooms.remove_member(room_id, conn, player) else {
            return;
        };
        tracing::info!(
            %room_id,
            conn_id = %conn,
            spectator = !departure.was_player,
            "member left"
        );

        if departure.now_empty {
            self.rooms.remove(room_id);
            self.sessions.forget_room(room_id);
            self.broadcast_room_list();
            return;
        }

        let left = ServerMessage::PlayerLeft {
            room_id,
            connection_id: conn.into_inner(),
            address,
            spectator: !departure.was_player,
        };
        self.broadcast_to(room_id, &left);

        let playing = self
            .rooms
            .get(room_id)
            .is_some_and(|r| r.phase().is_in_game());
        if departure.was_player && playing {
            // Leaving mid-game counts as a death.
            if !self.check_win(room_id, false) {
                self.resolve_if_all_voted(room_id);
            }
        }

        if let Some(room) = self.rooms.get(room_id) {
            broadcast(&self.sessions, room, &ServerMessage::RoomUpdate { room: room.view() });
        }
    }

    fn start_game(&mut self, conn: ConnectionId, room_id: RoomId) -> Result<(), RoomError> {
        if self.seat(conn, room_id, "start_game")?.is_none() {
            return Ok(());
        }
        self.rooms.start(room_id)?;
        self.enter_phase(room_id, Phase::ActionCommit);
        if let Some(room) = self.rooms.get(room_id) {
            broadcast(&self.sessions, room, &ServerMessage::RoomUpdate { room: room.view() });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Game commands
    // -----------------------------------------------------------------------

    fn position_update(&mut self, room_id: RoomId, actor: Address, to: Location) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        let Some(player) = room.player_mut(&actor).filter(|p| !p.departed) else {
            dropped(room_id, &actor, "position_update", "not a player");
            return;
        };
        let from = player.location;
        player.location = to;
        let msg = ServerMessage::PlayerMoved {
            room_id,
            address: actor,
            from,
            to,
        };
        broadcast(&self.sessions, room, &msg);
    }

    fn kill(
        &mut self,
        room_id: RoomId,
        killer: Address,
        target: Address,
        location: Option<Location>,
    ) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        let Some(game) = room.game.as_ref() else {
            dropped(room_id, &killer, "kill", "no game running");
            return;
        };
        if game.phase != Phase::ActionCommit {
            dropped(room_id, &killer, "kill", "out of phase");
            return;
        }
        let killer_ok = game.is_impostor(&killer)
            && room.player(&killer).is_some_and(|p| p.alive);
        let victim_at = room
            .player(&target)
            .filter(|p| p.alive && !game.is_impostor(&p.address))
            .map(|p| p.location);
        let round = game.round;
        let Some(victim_at) = victim_at.filter(|_| killer_ok) else {
            dropped(room_id, &killer, "kill", "illegal kill");
            return;
        };

        let at = location.unwrap_or(victim_at);
        if let Some(victim) = room.player_mut(&target) {
            victim.alive = false;
        }
        if let Some(game) = room.game.as_mut() {
            game.bodies.push(DeadBody {
                victim: target.clone(),
                location: at,
                round,
                reported: false,
            });
        }
        tracing::info!(%room_id, %killer, victim = %target, round, "kill");

        let msg = ServerMessage::KillOccurred {
            room_id,
            killer,
            victim: target,
            location: at,
            round,
        };
        broadcast(&self.sessions, room, &msg);
        self.check_win(room_id, false);
    }

    fn task_complete(&mut self, room_id: RoomId, actor: Address, location: Option<Location>) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        let Some(game) = room.game.as_ref() else {
            dropped(room_id, &actor, "task_complete", "no game running");
            return;
        };
        if game.phase != Phase::ActionCommit {
            dropped(room_id, &actor, "task_complete", "out of phase");
            return;
        }
        if game.is_impostor(&actor) {
            dropped(room_id, &actor, "task_complete", "impostors have no tasks");
            return;
        }
        let Some(player) = room.player_mut(&actor).filter(|p| !p.departed) else {
            dropped(room_id, &actor, "task_complete", "not a player");
            return;
        };
        let slot = match location {
            Some(at) => player.task_locations.iter().position(|l| *l == at),
            None => (!player.task_locations.is_empty()).then_some(0),
        };
        let Some(slot) = slot else {
            dropped(room_id, &actor, "task_complete", "no such task");
            return;
        };

        player.task_locations.remove(slot);
        player.tasks_completed += 1;
        let (tasks_completed, total_tasks) = (player.tasks_completed, player.total_tasks);
        let task_progress = room.task_progress();

        let msg = ServerMessage::TaskCompleted {
            room_id,
            address: actor,
            tasks_completed,
            total_tasks,
            task_progress,
        };
        broadcast(&self.sessions, room, &msg);
        if task_progress >= 100 {
            self.check_win(room_id, true);
        }
    }

    fn report_body(&mut self, room_id: RoomId, reporter: Address, location: Location) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        if room.phase() != Phase::ActionCommit {
            dropped(room_id, &reporter, "report_body", "out of phase");
            return;
        }
        if !room.player(&reporter).is_some_and(|p| p.alive) {
            dropped(room_id, &reporter, "report_body", "reporter is dead");
            return;
        }
        let Some(game) = room.game.as_mut() else {
            return;
        };
        let Some(body) = game
            .bodies
            .iter_mut()
            .find(|b| !b.reported && b.location == location)
        else {
            dropped(room_id, &reporter, "report_body", "no body there");
            return;
        };
        body.reported = true;
        let victim = body.victim.clone();
        tracing::info!(%room_id, %reporter, %victim, "body reported");

        let msg = ServerMessage::BodyReported {
            room_id,
            reporter,
            victim,
            location,
        };
        broadcast(&self.sessions, room, &msg);
        self.enter_phase(room_id, Phase::Discussion);
    }

    fn vote(&mut self, room_id: RoomId, voter: Address, target: Option<Address>) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        if room.phase() != Phase::Voting {
            dropped(room_id, &voter, "vote", "out of phase");
            return;
        }
        if !room.player(&voter).is_some_and(|p| p.alive && !p.has_voted) {
            dropped(room_id, &voter, "vote", "voter cannot vote");
            return;
        }
        if let Some(target) = &target {
            if !room.player(target).is_some_and(|p| p.alive) {
                dropped(room_id, &voter, "vote", "target is not alive");
                return;
            }
        }

        if let Some(player) = room.player_mut(&voter) {
            player.has_voted = true;
        }
        if let Some(game) = room.game.as_mut() {
            game.votes.insert(voter.clone(), target.clone());
        }
        let msg = ServerMessage::VoteCast {
            room_id,
            voter,
            target,
        };
        broadcast(&self.sessions, room, &msg);
        self.resolve_if_all_voted(room_id);
    }

    /// Manual override, honored only along a legal edge.
    fn phase_change(&mut self, room_id: RoomId, actor: Address, target: Phase) {
        let current = match self.rooms.get(room_id) {
            Some(room) if room.game.is_some() => room.phase(),
            _ => {
                dropped(room_id, &actor, "phase_change", "no game running");
                return;
            }
        };
        if matches!(target, Phase::Lobby | Phase::Ended) || !current.can_transition_to(target) {
            dropped(room_id, &actor, "phase_change", "illegal transition");
            return;
        }
        tracing::info!(%room_id, %actor, from = %current, to = %target, "manual phase change");
        match (current, target) {
            (Phase::Voting, Phase::VoteResult) => self.resolve_votes(room_id),
            (Phase::VoteResult, Phase::ActionCommit) => self.after_vote_result(room_id),
            _ => {
                self.enter_phase(room_id, target);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phase machine
    // -----------------------------------------------------------------------

    /// Moves a running room to `next` along a legal edge.
    ///
    /// Cancels the pending timer, resets phase-scoped state, announces the
    /// change, and schedules the next auto-advance. Returns `false` if the
    /// edge is illegal or the room has no game.
    fn enter_phase(&mut self, room_id: RoomId, next: Phase) -> bool {
        let settings = self.rooms.settings();
        let duration = settings.phase_duration(next);
        let advertised = settings.advertised_duration(next);

        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let Some(game) = room.game.as_mut() else {
            return false;
        };
        let previous = game.phase;
        if next == Phase::Ended || !previous.can_transition_to(next) {
            tracing::debug!(%room_id, from = %previous, to = %next, "illegal transition refused");
            return false;
        }

        if let Some(timer) = game.timer.take() {
            timer.cancel();
        }
        game.phase = next;
        match next {
            Phase::ActionCommit if previous == Phase::VoteResult => game.round += 1,
            Phase::Discussion => game.bodies.clear(),
            Phase::Voting => {
                game.votes.clear();
                for player in &mut room.players {
                    player.has_voted = false;
                }
            }
            _ => {}
        }
        game.phase_ends_at = advertised.map(deadline_millis);
        if let Some(delay) = duration {
            let action = TimerAction::PhaseElapsed { room_id, phase: next };
            game.timer = Some(self.timers.schedule(delay, action));
        }

        tracing::info!(%room_id, phase = %next, previous = %previous, round = game.round, "phase changed");
        let msg = ServerMessage::PhaseChanged {
            room_id,
            phase: next,
            previous_phase: previous,
            round: game.round,
            phase_ends_at: game.phase_ends_at,
        };
        broadcast(&self.sessions, room, &msg);
        true
    }

    /// Tallies the round's votes, ejects the plurality target if any, and
    /// enters `VoteResult`.
    fn resolve_votes(&mut self, room_id: RoomId) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        let Some(game) = room.game.as_ref() else {
            return;
        };
        if game.phase != Phase::Voting {
            return;
        }

        let tally = VoteTally::from_votes(game.votes.values());
        let outcome = tally.outcome();
        let round = game.round;
        let ejected = outcome.ejected().cloned();
        let was_impostor = ejected.as_ref().is_some_and(|a| game.is_impostor(a));
        if let Some(address) = &ejected {
            if let Some(player) = room.player_mut(address) {
                player.alive = false;
            }
        }
        tracing::info!(
            %room_id,
            round,
            votes = tally.total(),
            skips = tally.skips,
            ?outcome,
            "votes resolved"
        );

        let msg = ServerMessage::PlayerEjected {
            room_id,
            ejected,
            was_impostor,
            round,
        };
        broadcast(&self.sessions, room, &msg);
        self.enter_phase(room_id, Phase::VoteResult);
    }

    fn resolve_if_all_voted(&mut self, room_id: RoomId) {
        let ready = self.rooms.get(room_id).is_some_and(|room| {
            room.phase() == Phase::Voting
                && room.players.iter().filter(|p| p.alive).all(|p| p.has_voted)
        });
        if ready {
            tracing::debug!(%room_id, "every living player voted");
            self.resolve_votes(room_id);
        }
    }

    /// End of the post-ejection pause: the game ends or a new round starts.
    fn after_vote_result(&mut self, room_id: RoomId) {
        if self.rooms.get(room_id).map(Room::phase) != Some(Phase::VoteResult) {
            return;
        }
        if !self.check_win(room_id, false) {
            self.enter_phase(room_id, Phase::ActionCommit);
        }
    }

    /// Runs the win evaluator and ends the game on a winner.
    fn check_win(&mut self, room_id: RoomId, check_tasks: bool) -> bool {
        let census = self
            .rooms
            .get(room_id)
            .filter(|r| r.phase().is_in_game())
            .and_then(Census::of);
        let Some(census) = census else {
            return false;
        };
        match win::evaluate(census, check_tasks) {
            Some((winner, reason)) => {
                self.end_game(room_id, winner, reason);
                true
            }
            None => false,
        }
    }

    /// Ends a running game. A room that already ended is left alone.
    fn end_game(&mut self, room_id: RoomId, winner: Side, reason: WinReason) {
        let ttl = self.rooms.settings().ended_state_ttl;
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        let Some(game) = room.game.as_mut() else {
            return;
        };
        if game.phase == Phase::Ended {
            return;
        }

        let previous = game.phase;
        game.phase = Phase::Ended;
        game.phase_ends_at = None;
        game.timer = Some(self.timers.schedule(ttl, TimerAction::DiscardState { room_id }));
        let round = game.round;
        let impostors: Vec<Address> = game.impostors.iter().cloned().collect();
        room.status = RoomStatus::Ended;
        tracing::info!(%room_id, ?winner, ?reason, round, "game ended");

        let changed = ServerMessage::PhaseChanged {
            room_id,
            phase: Phase::Ended,
            previous_phase: previous,
            round,
            phase_ends_at: None,
        };
        let ended = ServerMessage::GameEnded {
            room_id,
            winner,
            reason,
            impostors,
        };
        broadcast(&self.sessions, room, &changed);
        broadcast(&self.sessions, room, &ended);
        broadcast(&self.sessions, room, &ServerMessage::RoomUpdate { room: room.view() });
    }

    fn on_timer(&mut self, fired: Expired<TimerAction>) {
        let room_id = fired.payload.room_id();
        let Some(game) = self.rooms.get_mut(room_id).and_then(|r| r.game.as_mut()) else {
            tracing::trace!(%room_id, timer = %fired.id, "timer for missing room ignored");
            return;
        };
        if game.timer.as_ref().map(TimerHandle::id) != Some(fired.id) {
            tracing::debug!(%room_id, timer = %fired.id, "stale timer ignored");
            return;
        }
        game.timer = None;
        let current = game.phase;

        match fired.payload {
            TimerAction::PhaseElapsed { phase, .. } if phase == current => match phase {
                Phase::Discussion => {
                    self.enter_phase(room_id, Phase::Voting);
                }
                Phase::Voting => self.resolve_votes(room_id),
                Phase::VoteResult => self.after_vote_result(room_id),
                _ => {}
            },
            TimerAction::PhaseElapsed { .. } => {}
            TimerAction::DiscardState { .. } => {
                if let Some(room) = self.rooms.get_mut(room_id) {
                    room.game = None;
                    tracing::info!(%room_id, "game state discarded");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Fan-out and queries
    // -----------------------------------------------------------------------

    fn broadcast_to(&self, room_id: RoomId, msg: &ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            broadcast(&self.sessions, room, msg);
        }
    }

    fn broadcast_room_list(&self) {
        let msg = ServerMessage::RoomList {
            rooms: self.rooms.summaries(),
        };
        self.sessions.broadcast_all(&msg);
    }

    fn snapshot(&self, room_id: RoomId) -> Option<RoomSnapshot> {
        let room = self.rooms.get(room_id)?;
        let game = room.game.as_ref();
        Some(RoomSnapshot {
            view: room.view(),
            impostors: game
                .map(|g| g.impostors.iter().cloned().collect())
                .unwrap_or_default(),
            votes: game.map_or(0, |g| g.votes.len()),
            unreported_bodies: game.map_or(0, |g| g.bodies.iter().filter(|b| !b.reported).count()),
            phase_ends_at: game.and_then(|g| g.phase_ends_at),
            timer_pending: game.is_some_and(|g| g.has_timer()),
            has_game_state: game.is_some(),
        })
    }
}

fn dropped(room_id: RoomId, actor: &Address, kind: &'static str, reason: &'static str) {
    tracing::debug!(%room_id, %actor, kind, reason, "command dropped");
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Epoch milliseconds `delay` from now.
fn deadline_millis(delay: Duration) -> i64 {
    let delay = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    now_millis().saturating_add(delay)
}
