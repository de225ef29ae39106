//! Lockstep Client
//!
//! Connects to a sequencer, joins the game and drives a local world.
//! Server-timed ticks wait for the merged batch of that tick; client-timed
//! ticks run on the local timer without a round trip. Own key transitions
//! are never applied directly: they travel through the sequencer like
//! everybody else's.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use std::time::Duration;

use crate::game::action::{encode_transitions, ActionLog, KeyTransition};
use crate::game::config::{ClientInfo, ConfigError, PlayerSettings};
use crate::game::world::World;
use crate::network::protocol::{ClientMessage, ServerMessage, PROTOCOL_IDENTIFICATION};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Message encoding failed.
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The server refused the handshake or the join.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The announced rules are unusable.
    #[error("Invalid game settings: {0}")]
    Config(#[from] ConfigError),

    /// The server closed the connection.
    #[error("Disconnected")]
    Disconnected,

    /// The server is shutting down.
    #[error("Server shutdown: {0}")]
    ServerShutdown(String),

    /// A tick frame arrived for another tick than the local one.
    #[error("Desync: at tick {expected}, got frame for tick {got}")]
    Desync {
        /// Local tick.
        expected: u32,
        /// Tick of the frame.
        got: u32,
    },

    /// Message makes no sense at this point.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// What a client asks for when joining.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    /// Client display name.
    pub name: String,
    /// Game password.
    pub password: Option<String>,
    /// Join token.
    pub token: Option<String>,
    /// Seats.
    pub players: Vec<PlayerSettings>,
}

impl JoinRequest {
    /// Open-game join with the given seats.
    pub fn new(name: impl Into<String>, players: Vec<PlayerSettings>) -> Self {
        Self {
            name: name.into(),
            password: None,
            token: None,
            players,
        }
    }
}

/// A finished game as this client saw it.
#[derive(Debug)]
pub struct FinishedGame {
    /// Final world state.
    pub world: World,
    /// Every merged batch applied, enough to replay the game.
    pub log: ActionLog,
}

/// A joined lockstep participant.
pub struct LockstepClient {
    sink: WsSink,
    inbox: mpsc::Receiver<ServerMessage>,
    client_index: usize,
    clients: Vec<ClientInfo>,
    world: Option<World>,
    log: Option<ActionLog>,
    ticker: Option<Interval>,
}

impl LockstepClient {
    /// Connect, say hello and join.
    pub async fn connect(url: &str, request: JoinRequest) -> Result<Self, ClientError> {
        let (ws, _) = connect_async(url).await?;
        let (sink, mut stream) = ws.split();

        // Reader task: socket to channel
        let (inbox_tx, inbox) = mpsc::channel::<ServerMessage>(256);
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                match ServerMessage::from_json(&text) {
                    Ok(message) => {
                        if inbox_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Invalid server message: {}", e),
                }
            }
        });

        let mut client = Self {
            sink,
            inbox,
            client_index: 0,
            clients: Vec::new(),
            world: None,
            log: None,
            ticker: None,
        };

        client
            .send(ClientMessage::Hello {
                identification: PROTOCOL_IDENTIFICATION.to_string(),
                version: crate::VERSION.to_string(),
            })
            .await?;
        match client.recv().await? {
            ServerMessage::Welcome { .. } => {}
            ServerMessage::Rejected { error } => return Err(ClientError::Rejected(error)),
            other => return Err(ClientError::Protocol(format!("expected welcome, got {other:?}"))),
        }

        client
            .send(ClientMessage::Join {
                name: request.name,
                password: request.password,
                token: request.token,
                players: request.players,
            })
            .await?;
        match client.recv().await? {
            ServerMessage::Joined { client_index, clients } => {
                info!(client_index, clients = clients.len(), "joined");
                client.client_index = client_index;
                client.clients = clients;
            }
            ServerMessage::Rejected { error } => return Err(ClientError::Rejected(error)),
            other => return Err(ClientError::Protocol(format!("expected joined, got {other:?}"))),
        }

        Ok(client)
    }

    /// Own client index; shifts down when a lower client leaves.
    pub fn client_index(&self) -> usize {
        self.client_index
    }

    /// Known clients in index order.
    pub fn clients(&self) -> &[ClientInfo] {
        &self.clients
    }

    /// Local world of the running game.
    pub fn world(&self) -> Option<&World> {
        self.world.as_ref()
    }

    /// Send a chat line.
    pub async fn chat(&mut self, text: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientMessage::Chat { text: text.into() }).await
    }

    /// Leave the game and close the connection.
    pub async fn quit(mut self) -> Result<(), ClientError> {
        self.send(ClientMessage::Quit).await?;
        self.sink.close().await?;
        Ok(())
    }

    /// Play one game to its end.
    ///
    /// Key transitions read from `input` are sent with the next ready message.
    pub async fn run_game(&mut self, input: &mut mpsc::Receiver<KeyTransition>) -> Result<FinishedGame, ClientError> {
        loop {
            let Some(world) = self.world.as_ref() else {
                self.wait_between_rounds(input).await?;
                continue;
            };
            if world.round() == 0 || world.round_ended() {
                if let Some(finished) = self.wait_between_rounds(input).await? {
                    return Ok(finished);
                }
                continue;
            }

            let tick = world.tick_count();
            let mask = world.settings().network_latency.mask();
            if tick & mask == 0 {
                self.server_timed_tick(tick, input).await?;
            } else {
                self.client_timed_tick().await;
            }
        }
    }

    /// Handle messages while no round runs. Returns the game once it ends.
    async fn wait_between_rounds(
        &mut self,
        input: &mut mpsc::Receiver<KeyTransition>,
    ) -> Result<Option<FinishedGame>, ClientError> {
        match self.recv().await? {
            ServerMessage::GameStarting { seed, settings } => {
                let frequency = settings.game_cycle_frequency.max(1);
                let mut ticker = interval(Duration::from_micros(1_000_000 / frequency as u64));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.ticker = Some(ticker);
                self.world = Some(World::new(settings, self.clients.clone(), seed)?);
                self.log = Some(ActionLog::new(seed));
                info!(seed, "game starting");
                Ok(None)
            }
            ServerMessage::StartRound => {
                let world = self
                    .world
                    .as_mut()
                    .ok_or_else(|| ClientError::Protocol("round start without a game".into()))?;
                world.start_round();
                debug!(round = world.round(), "round started");
                self.send_ready(input).await?;
                Ok(None)
            }
            ServerMessage::GameEnding => {
                self.ticker = None;
                match (self.world.take(), self.log.take()) {
                    (Some(world), Some(log)) => Ok(Some(FinishedGame { world, log })),
                    _ => Err(ClientError::Protocol("game ending without a game".into())),
                }
            }
            other => {
                self.handle_common(other)?;
                Ok(None)
            }
        }
    }

    /// Wait for the frame of `tick`, run it and report the next actions.
    async fn server_timed_tick(
        &mut self,
        tick: u32,
        input: &mut mpsc::Receiver<KeyTransition>,
    ) -> Result<(), ClientError> {
        let frame = match self.recv().await? {
            ServerMessage::StartTick(frame) => frame,
            other => return self.handle_common(other),
        };
        if frame.tick != tick {
            return Err(ClientError::Desync {
                expected: tick,
                got: frame.tick,
            });
        }

        let world = self
            .world
            .as_mut()
            .ok_or_else(|| ClientError::Protocol("tick without a game".into()))?;
        if let Some(log) = self.log.as_mut() {
            log.record(tick, &frame.actions);
        }
        let result = world.tick(Some(&frame.actions));

        // No report after the last tick of a round; the next round asks again
        if !result.round_ended {
            self.send_ready(input).await?;
        }
        Ok(())
    }

    async fn client_timed_tick(&mut self) {
        if let Some(ticker) = self.ticker.as_mut() {
            ticker.tick().await;
        }
        if let Some(world) = self.world.as_mut() {
            world.tick(None);
        }
    }

    /// Messages that may arrive at any point.
    fn handle_common(&mut self, message: ServerMessage) -> Result<(), ClientError> {
        match message {
            ServerMessage::ClientJoined { client } => {
                debug!(name = %client.name, "client joined");
                self.clients.push(client);
            }
            ServerMessage::ClientLeft { client_index } => {
                if client_index == self.client_index {
                    return Err(ClientError::Protocol("told that we left".into()));
                }
                if client_index < self.client_index {
                    self.client_index -= 1;
                }
                if client_index < self.clients.len() {
                    self.clients.remove(client_index);
                }
                if let Some(world) = self.world.as_mut() {
                    world.client_left(client_index);
                }
                info!(client_index, own_index = self.client_index, "client left");
            }
            ServerMessage::Chat { from, text, sent_at } => {
                info!(from = %from, sent_at = %sent_at, "{}", text);
            }
            ServerMessage::Error(e) => {
                warn!(code = ?e.code, "server error: {}", e.message);
            }
            ServerMessage::Shutdown { reason } => return Err(ClientError::ServerShutdown(reason)),
            other => return Err(ClientError::Protocol(format!("unexpected {other:?}"))),
        }
        Ok(())
    }

    async fn send_ready(&mut self, input: &mut mpsc::Receiver<KeyTransition>) -> Result<(), ClientError> {
        let seats = self.clients.get(self.client_index).map_or(0, |c| c.players.len());
        let mut transitions = Vec::new();
        while let Ok(transition) = input.try_recv() {
            if transition.seat < seats {
                transitions.push(transition);
            } else {
                warn!(seat = transition.seat, "dropping transition for unknown seat");
            }
        }
        let actions = encode_transitions(&transitions);
        self.send(ClientMessage::ReadyForNextTick { actions }).await
    }

    async fn send(&mut self, message: ClientMessage) -> Result<(), ClientError> {
        let text = message.to_json()?;
        self.sink.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<ServerMessage, ClientError> {
        self.inbox.recv().await.ok_or(ClientError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::action::ControlKey;
    use crate::game::config::{GameSettings, NetworkLatency};
    use crate::game::tick::replay_hash;
    use crate::network::server::{GameServer, ServerConfig};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn spawn_server(settings: GameSettings) -> (Arc<GameServer>, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig {
            min_clients: 2,
            auth: Default::default(),
            settings,
            ..Default::default()
        };
        let server = Arc::new(GameServer::new(config));
        let running = server.clone();
        tokio::spawn(async move { running.run_on(listener).await });
        (server, format!("ws://{addr}"))
    }

    fn short_game(latency: NetworkLatency) -> GameSettings {
        GameSettings {
            round_time_limit: 1,
            game_point_limit: 1,
            game_cycle_frequency: 60,
            network_latency: latency,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_rejected_join() {
        let settings = GameSettings {
            password: "secret".into(),
            ..Default::default()
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig {
            auth: crate::network::auth::AuthConfig {
                password: Some(settings.password.clone()),
                ..Default::default()
            },
            settings,
            ..Default::default()
        };
        let server = Arc::new(GameServer::new(config));
        let running = server.clone();
        tokio::spawn(async move { running.run_on(listener).await });

        let request = JoinRequest::new("eve", vec![PlayerSettings::new("eve", 0)]);
        let result = LockstepClient::connect(&format!("ws://{addr}"), request).await;
        assert!(matches!(result, Err(ClientError::Rejected(_))));
        server.shutdown();
    }

    #[tokio::test]
    async fn test_two_clients_stay_in_lockstep() {
        let settings = short_game(NetworkLatency::ExtraHigh);
        let (server, url) = spawn_server(settings.clone()).await;

        let mut alice = LockstepClient::connect(&url, JoinRequest::new("alice", vec![PlayerSettings::new("a", 0)]))
            .await
            .unwrap();
        let mut bob = LockstepClient::connect(&url, JoinRequest::new("bob", vec![PlayerSettings::new("b", 1)]))
            .await
            .unwrap();
        assert_eq!(alice.client_index(), 0);
        assert_eq!(bob.client_index(), 1);
        assert_eq!(bob.clients().len(), 2);

        let (alice_keys, mut alice_input) = mpsc::channel(16);
        let (_bob_keys, mut bob_input) = mpsc::channel(16);
        alice_keys.send(KeyTransition::new(0, ControlKey::Right, true)).await.unwrap();

        let games = tokio::time::timeout(Duration::from_secs(20), async {
            tokio::join!(alice.run_game(&mut alice_input), bob.run_game(&mut bob_input))
        })
        .await
        .expect("game finished in time");
        let (a, b) = (games.0.unwrap(), games.1.unwrap());

        assert_eq!(a.world.tick_count(), b.world.tick_count());
        assert_eq!(a.world.compute_hash(), b.world.compute_hash());
        assert_eq!(a.log.hash(), b.log.hash());
        assert!(a.world.game_ended());
        // Alice's key press went through the sequencer
        assert!(!a.log.is_empty());

        let replayed = replay_hash(settings, a.world.clients().to_vec(), &a.log, a.world.tick_count()).unwrap();
        assert_eq!(replayed, a.world.compute_hash());

        server.shutdown();
    }

    #[tokio::test]
    async fn test_low_latency_game_finishes() {
        let (server, url) = spawn_server(short_game(NetworkLatency::Low)).await;
        let mut alice = LockstepClient::connect(&url, JoinRequest::new("alice", vec![PlayerSettings::new("a", 0)]))
            .await
            .unwrap();
        let mut bob = LockstepClient::connect(&url, JoinRequest::new("bob", vec![PlayerSettings::new("b", 1)]))
            .await
            .unwrap();

        let (_a_keys, mut alice_input) = mpsc::channel(1);
        let (_b_keys, mut bob_input) = mpsc::channel(1);
        let games = tokio::time::timeout(Duration::from_secs(20), async {
            tokio::join!(alice.run_game(&mut alice_input), bob.run_game(&mut bob_input))
        })
        .await
        .expect("game finished in time");

        let (a, b) = (games.0.unwrap(), games.1.unwrap());
        assert_eq!(a.world.compute_hash(), b.world.compute_hash());
        // Time ran out with both alive: each scored once
        assert!(a.world.players().iter().flatten().all(|p| p.points == 1));
        server.shutdown();
    }
}
