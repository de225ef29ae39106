//! Network Layer
//!
//! Lockstep protocol over WebSocket: the sequencer side and the client side.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod auth;
pub mod client;
pub mod protocol;
pub mod server;
pub mod session;

pub use auth::{check_hello, check_join, validate_token, AuthConfig, AuthError, TokenClaims};
pub use client::{ClientError, FinishedGame, JoinRequest, LockstepClient};
pub use protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage, TickFrame, PROTOCOL_IDENTIFICATION};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{LockstepSequencer, SequencerState, SequencerStep, SessionError, SessionId, SessionManager};
