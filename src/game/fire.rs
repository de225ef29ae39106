//! Fire Simulation
//!
//! A fire occupant lives on one cell for `FIRE_ITERATIONS` ticks. When its
//! time is up it does not vanish by itself: the world detaches it and
//! resolves the cell (brick burns away, an exposed item is consumed).

use serde::{Deserialize, Serialize};

use crate::core::geometry::FIRE_ITERATIONS;
use crate::core::hash::StateHasher;
use crate::game::entity::PlayerHandle;

/// Display shape of a fire occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FireShape {
    /// Horizontal leg.
    Horizontal = 0,
    /// Vertical leg.
    Vertical = 1,
    /// Center of an explosion.
    Crossing = 2,
}

/// One fire occupant of a cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fire {
    /// Shape.
    pub shape: FireShape,
    /// Owner of the bomb that produced it.
    pub owner: Option<PlayerHandle>,
    /// Player credited with setting the bomb off.
    pub triggerer: Option<PlayerHandle>,
    /// Ticks burnt so far.
    pub iteration_counter: u32,
}

impl Fire {
    /// Fresh fire.
    pub fn new(shape: FireShape, owner: Option<PlayerHandle>, triggerer: Option<PlayerHandle>) -> Self {
        Self {
            shape,
            owner,
            triggerer,
            iteration_counter: 0,
        }
    }

    /// Advance one tick. Returns true when the fire has burnt out and must
    /// be detached from its cell; the counter is left untouched in that case.
    #[inline]
    pub fn advance(&mut self) -> bool {
        if self.iteration_counter + 1 < FIRE_ITERATIONS {
            self.iteration_counter += 1;
            false
        } else {
            true
        }
    }

    /// Fold into a state hash.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u8(self.shape as u8);
        PlayerHandle::hash_opt(self.owner, hasher);
        PlayerHandle::hash_opt(self.triggerer, hasher);
        hasher.update_u32(self.iteration_counter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_lifetime() {
        let mut fire = Fire::new(FireShape::Crossing, None, None);
        let mut ticks = 0;
        while !fire.advance() {
            ticks += 1;
        }
        // 17 increments, then expiry on the 18th tick.
        assert_eq!(ticks, FIRE_ITERATIONS - 1);
        assert_eq!(fire.iteration_counter, FIRE_ITERATIONS - 1);
    }
}
