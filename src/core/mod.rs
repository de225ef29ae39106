//! Core deterministic primitives.
//!
//! All types in this module are designed for perfect cross-platform determinism.
//! Every lockstep participant builds its world on top of them.

pub mod geometry;
pub mod rng;
pub mod hash;

// Re-export core types
pub use geometry::{Direction, Position, GRANULARITY};
pub use rng::DeterministicRng;
pub use hash::{compute_state_hash, StateHash};
