//! # Bomber Arena Server
//!
//! Deterministic bomber arena simulation kept in sync across participants
//! by a lockstep network protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    BOMBER ARENA SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── geometry.rs - Sub-tile units, directions, positions     │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State hashing for desync detection        │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── config.rs   - Rules, level and seat settings            │
//! │  ├── item.rs     - Item kinds and neutralizers               │
//! │  ├── grid.rs     - Walls, items and fire per cell            │
//! │  ├── entity.rs   - Shared position state, player handles     │
//! │  ├── player.rs   - Activity state machine and movement       │
//! │  ├── bomb.rs     - Flying, rolling and standing bombs        │
//! │  ├── fire.rs     - Burn timers                               │
//! │  ├── detonation.rs - Chain reactions                         │
//! │  ├── round.rs    - Board setup and spawn search              │
//! │  ├── world.rs    - World orchestrator and queries            │
//! │  ├── action.rs   - Control-key transition codec              │
//! │  ├── events.rs   - Game events                               │
//! │  └── tick.rs     - Authoritative simulation loop, replay     │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── auth.rs     - Handshake and join gate                   │
//! │  ├── session.rs  - Lockstep sequencer                        │
//! │  ├── server.rs   - WebSocket server                          │
//! │  └── client.rs   - Lockstep client                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are **100% deterministic**:
//! - No floating-point arithmetic in game logic
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from seeded Xorshift128+
//!
//! Given the same seed and the same sequence of merged action batches,
//! every participant's world is **bit-identical** after every tick.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::geometry::{Direction, Position, GRANULARITY};
pub use core::hash::StateHash;
pub use core::rng::DeterministicRng;
pub use game::{ActionLog, GameSettings, PlayerHandle, TickResult, World};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
