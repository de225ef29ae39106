//! Lockstep Sequencer
//!
//! The authoritative side of the lockstep protocol. Collects every
//! client's actions for a server-timed tick, merges them in client order
//! and hands the merged batch out for broadcast. Client-timed ticks pass
//! without any exchange.
//!
//! The sequencer does no I/O; the server drives it and owns the sockets.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::rng::derive_game_seed;
use crate::game::action::{decode_transitions, encode_transitions, merge_client_actions};
use crate::game::config::{ClientInfo, NetworkLatency, MAX_PLAYERS_PER_CLIENT};

/// Unique session identifier.
pub type SessionId = [u8; 16];

/// Connection identifier handed out by the server.
pub type ConnectionId = u64;

/// Most clients one game takes.
pub const MAX_CLIENTS: usize = 16;

/// Sequencer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Accepting clients, no round running.
    PlayerCollecting,
    /// A round is running.
    Playing,
    /// Shut down; nothing more happens.
    Idle,
}

/// Outcome of one sequencer tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerStep {
    /// Server-timed tick: broadcast this merged batch.
    Broadcast(String),
    /// Client-timed tick: every participant advances on its own.
    Local,
    /// Server-timed tick, but some client has not reported yet.
    Waiting,
}

/// A client as the sequencer sees it.
#[derive(Debug, Clone)]
pub struct SequencedClient {
    /// Server connection.
    pub connection: ConnectionId,
    /// Public client description.
    pub info: ClientInfo,
    /// Actions for the next server-timed tick, `None` until reported.
    pub pending: Option<String>,
}

/// Lockstep sequencer for one game.
#[derive(Debug)]
pub struct LockstepSequencer {
    /// Session ID.
    pub id: SessionId,
    /// Current state.
    state: SequencerState,
    /// Clients in client-index order.
    clients: Vec<SequencedClient>,
    /// Next tick to run.
    tick: u32,
    /// `tick & mask == 0` marks a server-timed tick.
    latency_mask: u32,
    /// Games started so far.
    games_started: u32,
    /// Seed of the running game.
    seed: Option<u64>,
}

impl LockstepSequencer {
    /// Create a sequencer for a latency class.
    pub fn new(id: SessionId, latency: NetworkLatency) -> Self {
        Self {
            id,
            state: SequencerState::PlayerCollecting,
            clients: Vec::new(),
            tick: 0,
            latency_mask: latency.mask(),
            games_started: 0,
            seed: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Next tick to run.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Seed of the running game.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Connected clients in index order.
    pub fn clients(&self) -> &[SequencedClient] {
        &self.clients
    }

    /// Public client list in index order.
    pub fn client_infos(&self) -> Vec<ClientInfo> {
        self.clients.iter().map(|c| c.info.clone()).collect()
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Client index of a connection.
    pub fn index_of(&self, connection: ConnectionId) -> Option<usize> {
        self.clients.iter().position(|c| c.connection == connection)
    }

    /// Append a client; returns its index.
    pub fn add_client(&mut self, connection: ConnectionId, info: ClientInfo) -> Result<usize, SessionError> {
        match self.state {
            SequencerState::PlayerCollecting => {}
            SequencerState::Playing => return Err(SessionError::GameInProgress),
            SequencerState::Idle => return Err(SessionError::InvalidState),
        }
        if self.index_of(connection).is_some() {
            return Err(SessionError::AlreadyJoined);
        }
        if self.clients.len() >= MAX_CLIENTS {
            return Err(SessionError::SessionFull);
        }
        if info.players.is_empty() || info.players.len() > MAX_PLAYERS_PER_CLIENT {
            return Err(SessionError::InvalidSeats(info.players.len()));
        }

        self.clients.push(SequencedClient {
            connection,
            info,
            pending: None,
        });
        Ok(self.clients.len() - 1)
    }

    /// Remove a client; every higher index shifts down. Returns the old index.
    pub fn remove_client(&mut self, connection: ConnectionId) -> Result<usize, SessionError> {
        let index = self.index_of(connection).ok_or(SessionError::ClientNotFound)?;
        let client = self.clients.remove(index);
        info!(client = %client.info.name, index, "client removed");
        Ok(index)
    }

    /// Begin a game. The seed is derived from the session and the game count.
    pub fn start_game(&mut self) -> Result<u64, SessionError> {
        if self.state != SequencerState::PlayerCollecting {
            return Err(SessionError::InvalidState);
        }
        if self.clients.is_empty() {
            return Err(SessionError::NoClients);
        }

        let seed = derive_game_seed(&self.id, self.games_started);
        self.games_started += 1;
        self.seed = Some(seed);
        self.tick = 0;
        info!(seed, clients = self.clients.len(), "game starting");
        Ok(seed)
    }

    /// Begin a round of the running game.
    pub fn start_round(&mut self) -> Result<(), SessionError> {
        if self.state != SequencerState::PlayerCollecting || self.seed.is_none() {
            return Err(SessionError::InvalidState);
        }
        self.clear_pending();
        self.state = SequencerState::Playing;
        Ok(())
    }

    /// The round is over; wait for the next round start.
    pub fn end_round(&mut self) {
        if self.state == SequencerState::Playing {
            self.state = SequencerState::PlayerCollecting;
        }
        self.clear_pending();
    }

    /// The game is over; new clients may join.
    pub fn end_game(&mut self) {
        self.end_round();
        self.seed = None;
    }

    /// Shut down for good.
    pub fn disconnect(&mut self) {
        self.state = SequencerState::Idle;
        self.clients.clear();
        self.seed = None;
    }

    /// Store a client's actions for the next server-timed tick.
    ///
    /// The stream is decoded and re-encoded so it can only ever address the
    /// client's own seats. An unparsable stream counts as an empty report;
    /// it never spoils the other clients' groups in the merged batch.
    ///
    /// A second report before the tick is released is appended to the
    /// first. That happens when a round ends on a client-timed tick and the
    /// report sent for it arrives after the next round started.
    pub fn submit_actions(&mut self, connection: ConnectionId, actions: impl AsRef<str>) -> Result<(), SessionError> {
        if self.state != SequencerState::Playing {
            return Err(SessionError::NotPlaying);
        }
        let index = self.index_of(connection).ok_or(SessionError::ClientNotFound)?;
        let client = &mut self.clients[index];
        let actions = sanitize_actions(actions.as_ref(), index, client.info.players.len());
        if let Some(pending) = client.pending.as_mut() {
            debug!(index, "client reported twice before release");
            if !actions.is_empty() {
                if !pending.is_empty() {
                    pending.push(' ');
                }
                pending.push_str(&actions);
            }
        } else {
            client.pending = Some(actions);
        }
        Ok(())
    }

    /// Whether `tick` is server-timed.
    pub fn is_server_timed(&self, tick: u32) -> bool {
        (tick & self.latency_mask) == 0
    }

    /// Whether every connected client has reported.
    pub fn all_ready(&self) -> bool {
        self.clients.iter().all(|c| c.pending.is_some())
    }

    /// Merge and clear every client's pending actions.
    pub fn take_merged_batch(&mut self) -> String {
        let streams: Vec<String> = self
            .clients
            .iter_mut()
            .map(|c| c.pending.take().unwrap_or_default())
            .collect();
        merge_client_actions(&streams)
    }

    /// Run one tick of the protocol.
    pub fn advance(&mut self) -> SequencerStep {
        if self.state != SequencerState::Playing {
            return SequencerStep::Waiting;
        }

        if !self.is_server_timed(self.tick) {
            self.tick += 1;
            return SequencerStep::Local;
        }

        if !self.all_ready() {
            return SequencerStep::Waiting;
        }

        let batch = self.take_merged_batch();
        debug!(tick = self.tick, len = batch.len(), "tick released");
        self.tick += 1;
        SequencerStep::Broadcast(batch)
    }

    fn clear_pending(&mut self) {
        for client in &mut self.clients {
            client.pending = None;
        }
    }
}

/// Re-encode a client's own transition stream, keeping its valid seats only.
fn sanitize_actions(stream: &str, client_index: usize, seats: usize) -> String {
    match decode_transitions(stream, client_index) {
        Ok(transitions) => {
            let (kept, dropped): (Vec<_>, Vec<_>) = transitions.into_iter().partition(|t| t.seat < seats);
            if !dropped.is_empty() {
                warn!(client_index, dropped = dropped.len(), "dropping transitions for unknown seats");
            }
            encode_transitions(&kept)
        }
        Err(e) => {
            warn!(client_index, "discarding malformed actions: {}", e);
            String::new()
        }
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Session is full.
    #[error("Session is full")]
    SessionFull,

    /// Connection already joined.
    #[error("Already joined")]
    AlreadyJoined,

    /// Game in progress.
    #[error("Game in progress")]
    GameInProgress,

    /// No round running.
    #[error("Not playing")]
    NotPlaying,

    /// Invalid session state.
    #[error("Invalid session state")]
    InvalidState,

    /// Starting without clients.
    #[error("No clients")]
    NoClients,

    /// Seat count outside the allowed range.
    #[error("Invalid seat count: {0}")]
    InvalidSeats(usize),

    /// Client not found.
    #[error("Client not found")]
    ClientNotFound,
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Keeps every sequencer a server hosts.
pub struct SessionManager {
    /// Active sessions.
    sessions: RwLock<BTreeMap<SessionId, Arc<RwLock<LockstepSequencer>>>>,
}

impl SessionManager {
    /// Create new session manager.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a new session.
    pub async fn create_session(&self, latency: NetworkLatency) -> SessionId {
        let id = uuid::Uuid::new_v4().into_bytes();
        let sequencer = LockstepSequencer::new(id, latency);

        let mut sessions = self.sessions.write().await;
        sessions.insert(id, Arc::new(RwLock::new(sequencer)));

        id
    }

    /// Get a session by ID.
    pub async fn get_session(&self, id: &SessionId) -> Option<Arc<RwLock<LockstepSequencer>>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// Remove a session.
    pub async fn remove_session(&self, id: &SessionId) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id);
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Drop sessions that went idle.
    pub async fn cleanup(&self) {
        let mut sessions = self.sessions.write().await;
        let mut to_remove = Vec::new();

        for (id, session) in sessions.iter() {
            let s = session.read().await;
            if s.state() == SequencerState::Idle {
                to_remove.push(*id);
            }
        }

        for id in to_remove {
            sessions.remove(&id);
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
