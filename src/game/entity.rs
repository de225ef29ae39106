//! Entity State
//!
//! Position, direction and iteration-counter primitives shared by players
//! and bombs, plus the handle type used for every back-reference to a player.

use serde::{Deserialize, Serialize};

use crate::core::geometry::{align_to_center, tile_center, Direction, Position};
use crate::core::hash::StateHasher;

/// Index-based reference to a player: which client, which seat.
///
/// Handles are renumbered when a client leaves; see `World::client_left`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerHandle {
    /// Index of the owning client.
    pub client: usize,
    /// Seat on that client.
    pub seat: usize,
}

impl PlayerHandle {
    /// Create a handle.
    #[inline]
    pub const fn new(client: usize, seat: usize) -> Self {
        Self { client, seat }
    }

    /// Fold an optional handle into a state hash.
    pub fn hash_opt(handle: Option<PlayerHandle>, hasher: &mut StateHasher) {
        match handle {
            Some(h) => {
                hasher.update_u8(1);
                hasher.update_u32(h.client as u32);
                hasher.update_u32(h.seat as u32);
            }
            None => hasher.update_u8(0),
        }
    }
}

/// Positioned, animated object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Sub-tile position.
    pub pos: Position,
    /// Facing.
    pub direction: Direction,
    /// Ticks spent in the current activity / animation phase.
    pub iteration_counter: u32,
}

impl Default for Entity {
    fn default() -> Self {
        Self {
            pos: Position::default(),
            direction: Direction::Down,
            iteration_counter: 0,
        }
    }
}

impl Entity {
    /// Entity at a tile center, facing down.
    pub fn at_tile(tile_x: i32, tile_y: i32) -> Self {
        Self {
            pos: Position::new(tile_center(tile_x), tile_center(tile_y)),
            ..Self::default()
        }
    }

    /// Tile column.
    #[inline]
    pub fn tile_x(&self) -> i32 {
        self.pos.tile_x()
    }

    /// Tile row.
    #[inline]
    pub fn tile_y(&self) -> i32 {
        self.pos.tile_y()
    }

    /// Tile coordinates.
    #[inline]
    pub fn tile(&self) -> (i32, i32) {
        self.pos.tile()
    }

    /// Tile one step ahead in the facing direction.
    #[inline]
    pub fn tile_ahead(&self) -> (i32, i32) {
        (
            self.tile_x() + self.direction.x_multiplier(),
            self.tile_y() + self.direction.y_multiplier(),
        )
    }

    /// Snap x to the tile center.
    #[inline]
    pub fn align_x_to_center(&mut self) {
        self.pos.x = align_to_center(self.pos.x);
    }

    /// Snap y to the tile center.
    #[inline]
    pub fn align_y_to_center(&mut self) {
        self.pos.y = align_to_center(self.pos.y);
    }

    /// Advance the counter within a cycle of `length` ticks.
    ///
    /// Repeatable cycles wrap to 0; others freeze on their last tick.
    #[inline]
    pub fn advance_iteration(&mut self, length: u32, repeatable: bool) {
        if self.iteration_counter + 1 < length {
            self.iteration_counter += 1;
        } else if repeatable {
            self.iteration_counter = 0;
        }
    }

    /// Fold into a state hash.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_i32(self.pos.x);
        hasher.update_i32(self.pos.y);
        hasher.update_u8(self.direction as u8);
        hasher.update_u32(self.iteration_counter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::GRANULARITY;

    #[test]
    fn test_advance_iteration() {
        let mut entity = Entity::default();
        entity.advance_iteration(3, true);
        entity.advance_iteration(3, true);
        assert_eq!(entity.iteration_counter, 2);
        entity.advance_iteration(3, true);
        assert_eq!(entity.iteration_counter, 0);

        let mut entity = Entity::default();
        for _ in 0..10 {
            entity.advance_iteration(3, false);
        }
        assert_eq!(entity.iteration_counter, 2);
    }

    #[test]
    fn test_alignment_and_ahead() {
        let mut entity = Entity::at_tile(3, 4);
        entity.pos.x += 100;
        entity.pos.y -= 200;
        entity.align_x_to_center();
        assert_eq!(entity.pos.x, 3 * GRANULARITY + GRANULARITY / 2);
        entity.align_y_to_center();
        assert_eq!(entity.tile(), (3, 4));

        entity.direction = Direction::Left;
        assert_eq!(entity.tile_ahead(), (2, 4));
    }
}
