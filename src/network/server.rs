//! WebSocket Game Server
//!
//! Async WebSocket server for the lockstep protocol. Every connection gets
//! a reader task and a writer task; joined clients feed a single game loop
//! task that owns the sequencer and a mirror of the world.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::action::ActionLog;
use crate::game::config::{ClientInfo, GameSettings, PlayerSettings, DEFAULT_GAME_PORT};
use crate::game::tick::TickResult;
use crate::game::world::World;
use crate::network::auth::{check_hello, check_join, AuthConfig};
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage, TickFrame};
use crate::network::session::{
    ConnectionId, LockstepSequencer, SequencerState, SequencerStep, SessionError, SessionManager,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Joined clients needed before a game starts.
    pub min_clients: usize,
    /// Rules of the hosted game; the tick rate comes from here.
    pub settings: GameSettings,
    /// Join gate.
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let settings = GameSettings::default();
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_GAME_PORT)),
            max_connections: 64,
            min_clients: 2,
            auth: AuthConfig::for_game(&settings),
            settings,
        }
    }
}

impl ServerConfig {
    /// Simulation ticks per second.
    pub fn tick_rate(&self) -> u32 {
        self.settings.game_cycle_frequency.max(1)
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Connected socket bookkeeping.
struct ConnectedClient {
    /// Peer address.
    addr: SocketAddr,
    /// Client name once joined.
    name: Option<String>,
    /// Connection time.
    connected_at: Instant,
}

/// Where a connection stands in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    AwaitingHello,
    AwaitingJoin,
    Joined,
}

/// Messages from connection tasks to the game loop.
enum Inbound {
    Join {
        connection: ConnectionId,
        info: ClientInfo,
        sender: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<Result<usize, SessionError>>,
    },
    Actions {
        connection: ConnectionId,
        actions: String,
    },
    Chat {
        connection: ConnectionId,
        text: String,
    },
    Left {
        connection: ConnectionId,
    },
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Session manager.
    sessions: Arc<SessionManager>,
    /// Open sockets.
    clients: Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>,
    /// Next connection id.
    next_connection: AtomicU64,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            sessions: Arc::new(SessionManager::new()),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            next_connection: AtomicU64::new(1),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.run_on(listener).await
    }

    /// Run the server on an already bound listener.
    pub async fn run_on(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);

        let session_id = self.sessions.create_session(self.config.settings.network_latency).await;
        let sequencer = self
            .sessions
            .get_session(&session_id)
            .await
            .ok_or(SessionError::InvalidState)?;

        let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(256);
        let table = GameTable {
            settings: self.config.settings.clone(),
            min_clients: self.config.min_clients.max(1),
            sequencer,
            senders: BTreeMap::new(),
            world: None,
            log: None,
            pending_leaves: Vec::new(),
        };
        let tick_rate = self.config.tick_rate();
        let loop_shutdown = self.shutdown_tx.subscribe();
        let game_loop = tokio::spawn(async move {
            Self::run_game_loop(table, inbound_rx, loop_shutdown, tick_rate).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            let connection = self.next_connection.fetch_add(1, Ordering::Relaxed);
                            info!("New connection {} from {}", connection, addr);
                            self.handle_connection(stream, addr, connection, inbound_tx.clone());
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        // The game loop sees the same signal; give it a moment to wind down
        if tokio::time::timeout(Duration::from_secs(1), game_loop).await.is_err() {
            warn!("Game loop did not stop in time");
        }
        self.sessions.cleanup().await;

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        connection: ConnectionId,
        inbound: mpsc::Sender<Inbound>,
    ) {
        let clients = self.clients.clone();
        let auth = self.config.auth.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            clients.write().await.insert(
                connection,
                ConnectedClient {
                    addr,
                    name: None,
                    connected_at: Instant::now(),
                },
            );

            // Spawn message sender task
            let mut sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let mut handshake = Handshake::AwaitingHello;

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        let client_msg = match msg {
                            Some(Ok(Message::Text(text))) => ClientMessage::from_json(&text).map_err(|e| e.to_string()),
                            Some(Ok(Message::Binary(data))) => ClientMessage::from_bytes(&data).map_err(|e| e.to_string()),
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            Some(Ok(_)) => continue,
                        };

                        let client_msg = match client_msg {
                            Ok(m) => m,
                            Err(e) => {
                                debug!("Invalid message from {}: {}", addr, e);
                                let _ = msg_tx.send(ServerMessage::error(
                                    ErrorCode::InvalidMessage,
                                    "Invalid message format",
                                )).await;
                                continue;
                            }
                        };

                        let keep_open = Self::handle_client_message(
                            connection,
                            client_msg,
                            &mut handshake,
                            &auth,
                            &clients,
                            &msg_tx,
                            &inbound,
                        ).await;
                        if !keep_open {
                            break;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            if handshake == Handshake::Joined {
                let _ = inbound.send(Inbound::Left { connection }).await;
            }
            // The writer drains once the game loop drops its sender too
            drop(msg_tx);
            if tokio::time::timeout(Duration::from_secs(1), &mut sender_task).await.is_err() {
                sender_task.abort();
            }

            if let Some(client) = clients.write().await.remove(&connection) {
                info!(
                    connection,
                    addr = %client.addr,
                    name = client.name.as_deref().unwrap_or("-"),
                    secs = client.connected_at.elapsed().as_secs(),
                    "connection closed"
                );
            }
        });
    }

    /// Handle a client message. Returns false when the connection should close.
    async fn handle_client_message(
        connection: ConnectionId,
        msg: ClientMessage,
        handshake: &mut Handshake,
        auth: &AuthConfig,
        clients: &Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>,
        sender: &mpsc::Sender<ServerMessage>,
        inbound: &mpsc::Sender<Inbound>,
    ) -> bool {
        match (msg, *handshake) {
            (ClientMessage::Hello { identification, version }, Handshake::AwaitingHello) => {
                if let Err(e) = check_hello(&identification, &version, auth) {
                    warn!(connection, "hello refused: {}", e);
                    let _ = sender.send(ServerMessage::Rejected { error: e.to_string() }).await;
                    return false;
                }
                *handshake = Handshake::AwaitingJoin;
                let _ = sender
                    .send(ServerMessage::Welcome {
                        identification: auth.identification.clone(),
                        version: auth.version.clone(),
                    })
                    .await;
                true
            }

            (ClientMessage::Join { name, password, token, players }, Handshake::AwaitingJoin) => {
                Self::handle_join(connection, name, password, token, players, handshake, auth, clients, sender, inbound)
                    .await
            }

            (ClientMessage::ReadyForNextTick { actions }, Handshake::Joined) => {
                inbound.send(Inbound::Actions { connection, actions }).await.is_ok()
            }

            (ClientMessage::Chat { text }, Handshake::Joined) => {
                inbound.send(Inbound::Chat { connection, text }).await.is_ok()
            }

            (ClientMessage::Quit, _) => false,

            (ClientMessage::ReadyForNextTick { .. } | ClientMessage::Chat { .. }, _) => {
                let _ = sender
                    .send(ServerMessage::error(ErrorCode::NotJoined, "Join first"))
                    .await;
                true
            }

            (_, _) => {
                let _ = sender
                    .send(ServerMessage::error(ErrorCode::InvalidState, "Unexpected handshake message"))
                    .await;
                true
            }
        }
    }

    /// Check a join request and hand it to the game loop.
    #[allow(clippy::too_many_arguments)]
    async fn handle_join(
        connection: ConnectionId,
        name: String,
        password: Option<String>,
        token: Option<String>,
        players: Vec<PlayerSettings>,
        handshake: &mut Handshake,
        auth: &AuthConfig,
        clients: &Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>,
        sender: &mpsc::Sender<ServerMessage>,
        inbound: &mpsc::Sender<Inbound>,
    ) -> bool {
        if let Err(e) = check_join(&name, password.as_deref(), token.as_deref(), auth) {
            warn!(connection, name = %name, "join refused: {}", e);
            let _ = sender.send(ServerMessage::Rejected { error: e.to_string() }).await;
            return false;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let join = Inbound::Join {
            connection,
            info: ClientInfo::new(name.clone(), players),
            sender: sender.clone(),
            reply: reply_tx,
        };
        if inbound.send(join).await.is_err() {
            return false;
        }

        match reply_rx.await {
            Ok(Ok(client_index)) => {
                *handshake = Handshake::Joined;
                if let Some(client) = clients.write().await.get_mut(&connection) {
                    client.name = Some(name.clone());
                }
                info!(connection, client_index, name = %name, "client joined");
                true
            }
            Ok(Err(e)) => {
                let _ = sender.send(ServerMessage::Rejected { error: e.to_string() }).await;
                false
            }
            Err(_) => false,
        }
    }

    /// Run the game loop: lockstep ticks plus everything joined clients send.
    async fn run_game_loop(
        mut table: GameTable,
        mut inbound: mpsc::Receiver<Inbound>,
        mut shutdown_rx: broadcast::Receiver<()>,
        tick_rate: u32,
    ) {
        let tick_duration = Duration::from_micros(1_000_000 / tick_rate.max(1) as u64);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => table.step().await,
                message = inbound.recv() => match message {
                    Some(message) => table.handle(message).await,
                    None => break,
                },
                _ = shutdown_rx.recv() => break,
            }
        }

        table.sequencer.write().await.disconnect();
        info!("Game loop stopped");
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }
}

// =============================================================================
// GAME LOOP STATE
// =============================================================================

/// Everything the game loop task owns.
struct GameTable {
    settings: GameSettings,
    min_clients: usize,
    sequencer: Arc<RwLock<LockstepSequencer>>,
    /// Writers of joined clients.
    senders: BTreeMap<ConnectionId, mpsc::Sender<ServerMessage>>,
    /// Mirror of the clients' worlds while a game runs.
    world: Option<World>,
    log: Option<ActionLog>,
    /// Client indices that left mid-round, announced before the next tick frame.
    pending_leaves: Vec<usize>,
}

impl GameTable {
    async fn handle(&mut self, message: Inbound) {
        match message {
            Inbound::Join { connection, info, sender, reply } => {
                self.handle_join(connection, info, sender, reply).await;
            }
            Inbound::Actions { connection, actions } => {
                let result = self.sequencer.write().await.submit_actions(connection, actions);
                match result {
                    Ok(()) => {}
                    // Report for a round that already ended
                    Err(SessionError::NotPlaying) => debug!(connection, "late actions dropped"),
                    Err(e) => {
                        warn!(connection, "actions refused: {}", e);
                        self.send_to(connection, ServerMessage::error(ErrorCode::InvalidState, e.to_string()))
                            .await;
                    }
                }
            }
            Inbound::Chat { connection, text } => {
                let from = {
                    let sequencer = self.sequencer.read().await;
                    sequencer
                        .index_of(connection)
                        .map(|i| sequencer.clients()[i].info.name.clone())
                };
                if let Some(from) = from {
                    self.broadcast(ServerMessage::Chat {
                        from,
                        text,
                        sent_at: Utc::now(),
                    })
                    .await;
                }
            }
            Inbound::Left { connection } => self.handle_left(connection).await,
        }
    }

    async fn handle_join(
        &mut self,
        connection: ConnectionId,
        info: ClientInfo,
        sender: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<Result<usize, SessionError>>,
    ) {
        let result = self.sequencer.write().await.add_client(connection, info.clone());
        let client_index = match result {
            Ok(index) => index,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let clients = self.sequencer.read().await.client_infos();
        self.broadcast(ServerMessage::ClientJoined { client: info }).await;
        let _ = sender.send(ServerMessage::Joined { client_index, clients }).await;
        self.senders.insert(connection, sender);
        let _ = reply.send(Ok(client_index));

        self.maybe_start_game().await;
    }

    async fn handle_left(&mut self, connection: ConnectionId) {
        self.senders.remove(&connection);

        let (removed, playing, remaining) = {
            let mut sequencer = self.sequencer.write().await;
            let removed = sequencer.remove_client(connection);
            (removed, sequencer.state() == SequencerState::Playing, sequencer.client_count())
        };
        let Ok(client_index) = removed else {
            return;
        };

        if self.world.is_some() && remaining == 0 {
            info!("Last client left, abandoning game");
            self.sequencer.write().await.end_game();
            self.world = None;
            self.log = None;
            self.pending_leaves.clear();
            return;
        }

        if self.world.is_some() && playing {
            // Clients apply the leave right before the next tick frame
            self.pending_leaves.push(client_index);
        } else {
            if let Some(world) = self.world.as_mut() {
                world.client_left(client_index);
            }
            self.broadcast(ServerMessage::ClientLeft { client_index }).await;
        }
    }

    async fn maybe_start_game(&mut self) {
        let started = {
            let mut sequencer = self.sequencer.write().await;
            if sequencer.seed().is_some()
                || sequencer.state() != SequencerState::PlayerCollecting
                || sequencer.client_count() < self.min_clients
            {
                return;
            }
            sequencer.start_game().map(|seed| (seed, sequencer.client_infos()))
        };
        let (seed, clients) = match started {
            Ok(started) => started,
            Err(e) => {
                warn!("Cannot start game: {}", e);
                return;
            }
        };

        match World::new(self.settings.clone(), clients, seed) {
            Ok(world) => {
                self.world = Some(world);
                self.log = Some(ActionLog::new(seed));
            }
            Err(e) => {
                error!("Invalid game settings: {}", e);
                self.sequencer.write().await.end_game();
                return;
            }
        }

        self.broadcast(ServerMessage::GameStarting {
            seed,
            settings: self.settings.clone(),
        })
        .await;
        self.start_round().await;
    }

    async fn start_round(&mut self) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        world.start_round();

        if let Err(e) = self.sequencer.write().await.start_round() {
            error!("Cannot start round: {}", e);
            return;
        }
        self.broadcast(ServerMessage::StartRound).await;
    }

    /// One timer period of the lockstep protocol.
    async fn step(&mut self) {
        if self.world.is_none() {
            return;
        }

        let step = self.sequencer.write().await.advance();
        let result = match step {
            SequencerStep::Waiting => return,
            SequencerStep::Local => match self.world.as_mut() {
                Some(world) => world.tick(None),
                None => return,
            },
            SequencerStep::Broadcast(actions) => {
                self.flush_leaves().await;
                let Some(world) = self.world.as_mut() else {
                    return;
                };
                let tick = world.tick_count();
                if let Some(log) = self.log.as_mut() {
                    log.record(tick, &actions);
                }
                let result = world.tick(Some(&actions));
                self.broadcast(ServerMessage::StartTick(TickFrame { tick, actions })).await;
                result
            }
        };

        if result.round_ended {
            self.finish_round(result).await;
        }
    }

    async fn finish_round(&mut self, result: TickResult) {
        self.sequencer.write().await.end_round();
        self.flush_leaves().await;

        let game_over = self.world.as_ref().map_or(true, World::game_ended);
        info!(
            winner = ?result.winner,
            scored = result.winners.len(),
            game_over,
            "Round over"
        );

        if game_over {
            self.end_game().await;
            self.maybe_start_game().await;
        } else {
            self.start_round().await;
        }
    }

    async fn end_game(&mut self) {
        self.sequencer.write().await.end_game();
        if let (Some(world), Some(log)) = (self.world.take(), self.log.take()) {
            info!(
                rounds = world.round(),
                ticks = world.tick_count(),
                batches = log.len(),
                log_hash = %hex::encode(log.hash()),
                state_hash = %hex::encode(world.compute_hash()),
                "Game over"
            );
        }
        self.pending_leaves.clear();
        self.broadcast(ServerMessage::GameEnding).await;
    }

    async fn flush_leaves(&mut self) {
        for client_index in std::mem::take(&mut self.pending_leaves) {
            if let Some(world) = self.world.as_mut() {
                world.client_left(client_index);
            }
            self.broadcast(ServerMessage::ClientLeft { client_index }).await;
        }
    }

    async fn send_to(&self, connection: ConnectionId, message: ServerMessage) {
        if let Some(sender) = self.senders.get(&connection) {
            let _ = sender.send(message).await;
        }
    }

    async fn broadcast(&self, message: ServerMessage) {
        for sender in self.senders.values() {
            // A closed writer means the client is leaving; its Left follows
            let _ = sender.send(message.clone()).await;
        }
    }
}
