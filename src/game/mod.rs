//! Game Logic Module
//!
//! All game simulation code. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `config`: Rules, level and per-seat settings
//! - `item`: Item kinds, holdings and the neutralizer table
//! - `grid`: Walls, items and fire occupants per cell
//! - `entity`: Position/direction/counter shared by players and bombs
//! - `player`: Activity state machine, movement correction, pickups
//! - `bomb`: Flying, rolling and standing bombs
//! - `fire`: Burn timers
//! - `detonation`: Chain reaction resolution
//! - `round`: Board setup and spawn search
//! - `world`: The world orchestrator and its queries
//! - `action`: Wire codec for control-key transitions
//! - `tick`: Authoritative simulation loop and replay
//! - `events`: Game events for replay/verification

pub mod action;
pub mod bomb;
pub mod config;
pub mod entity;
pub mod events;
pub mod fire;
pub mod grid;
pub mod item;
pub mod player;
pub mod tick;
pub mod world;

mod detonation;
mod round;

// Re-export key types
pub use action::{ActionBatch, ActionError, ActionLog, ClientActions, ControlKey, KeyTransition};
pub use bomb::{Bomb, BombPhase, BombType};
pub use config::{ClientInfo, ConfigError, GameSettings, GameType, LevelSettings, NetworkLatency, PlayerSettings};
pub use entity::PlayerHandle;
pub use events::{GameEvent, GameEventData};
pub use fire::{Fire, FireShape};
pub use grid::{Cell, Grid, Wall};
pub use item::ItemKind;
pub use player::{Activity, Player};
pub use tick::{replay, replay_hash, TickResult};
pub use world::{Side, World, WorldView};
