//! Sub-tile Geometry
//!
//! Integer coordinate system shared by players, bombs and fire.
//!
//! A tile is `GRANULARITY` units wide. The constant is odd and divisible by
//! 3, 5, 7 and 11 so every speed below is exact and a tile has a true center
//! at `GRANULARITY / 2`. No floating point is used anywhere in the simulation.

use serde::{Deserialize, Serialize};

/// Sub-tile units per tile.
pub const GRANULARITY: i32 = 1155;

/// Half a tile, the offset of a tile center.
pub const HALF_TILE: i32 = GRANULARITY / 2;

/// Walking speed without roller skates (units per tick).
pub const BASIC_SPEED: i32 = GRANULARITY / 6;

/// Speed added per roller skates item.
pub const ROLLER_SKATES_INCREMENT: i32 = BASIC_SPEED * 15 / 100;

/// Walking speed cap.
pub const MAX_SPEED: i32 = BASIC_SPEED * 3;

/// Default width of the movement correction band near a tile edge.
pub const DEFAULT_CORRECTION_SENSITIVITY: i32 = GRANULARITY * 5 / 12;

/// Speed of a thrown or punched bomb.
pub const BOMB_FLYING_SPEED: i32 = GRANULARITY / 5;

/// Distance a thrown or punched bomb aims for.
pub const BOMB_FLYING_DISTANCE: i32 = GRANULARITY * 3;

/// Speed of a kicked bomb.
pub const BOMB_ROLLING_SPEED: i32 = GRANULARITY / 5;

/// Animation cycle length of a bomb.
pub const BOMB_ITERATIONS: u32 = 30;

/// Ticks a non-triggered bomb ticks before it detonates.
pub const BOMB_DETONATION_ITERATIONS: u32 = 60;

/// Lifetime of a single fire occupant.
pub const FIRE_ITERATIONS: u32 = 18;

/// Full player vitality.
pub const MAX_VITALITY: i32 = 1000;

/// Vitality restored by a heart.
pub const HEART_VITALITY: i32 = MAX_VITALITY / 3;

/// Dying ticks before a dead player's items are put back on the grid.
pub const DEAD_ITERATIONS_BEFORE_REPLACING_ITEMS: u32 = 80;

/// Bomb range sentinel used by super fire.
pub const INFINITE_RANGE: i32 = i32::MAX;

/// Tile index containing a sub-tile coordinate.
#[inline]
pub const fn tile_of(pos: i32) -> i32 {
    pos / GRANULARITY
}

/// Sub-tile coordinate of a tile's center.
#[inline]
pub const fn tile_center(tile: i32) -> i32 {
    tile * GRANULARITY + HALF_TILE
}

/// Snap a coordinate to the center of its tile.
#[inline]
pub const fn align_to_center(pos: i32) -> i32 {
    pos + HALF_TILE - pos % GRANULARITY
}

/// Facing / movement direction.
///
/// The declaration order is significant: detonation rays and random
/// direction picks both iterate it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// +y
    Down = 0,
    /// -y
    Up = 1,
    /// +x
    Right = 2,
    /// -x
    Left = 3,
}

impl Direction {
    /// All directions in declaration order.
    pub const ALL: [Direction; 4] = [
        Direction::Down,
        Direction::Up,
        Direction::Right,
        Direction::Left,
    ];

    /// Horizontal component of the unit vector.
    #[inline]
    pub const fn x_multiplier(self) -> i32 {
        match self {
            Direction::Left => -1,
            Direction::Right => 1,
            _ => 0,
        }
    }

    /// Vertical component of the unit vector.
    #[inline]
    pub const fn y_multiplier(self) -> i32 {
        match self {
            Direction::Up => -1,
            Direction::Down => 1,
            _ => 0,
        }
    }

    /// The reverse direction.
    #[inline]
    pub const fn opposite(self) -> Direction {
        match self {
            Direction::Down => Direction::Up,
            Direction::Up => Direction::Down,
            Direction::Right => Direction::Left,
            Direction::Left => Direction::Right,
        }
    }

    /// True for Left and Right.
    #[inline]
    pub const fn is_horizontal(self) -> bool {
        self.x_multiplier() != 0
    }

    /// Direction for a dense index (wraps modulo 4).
    #[inline]
    pub const fn from_index(index: u32) -> Direction {
        Self::ALL[(index % 4) as usize]
    }
}

/// A sub-tile position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: i32,
    /// Vertical coordinate.
    pub y: i32,
}

impl Position {
    /// Create a position.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Center of the given tile.
    #[inline]
    pub const fn tile_center(tile_x: i32, tile_y: i32) -> Self {
        Self::new(tile_center(tile_x), tile_center(tile_y))
    }

    /// Tile column.
    #[inline]
    pub const fn tile_x(self) -> i32 {
        tile_of(self.x)
    }

    /// Tile row.
    #[inline]
    pub const fn tile_y(self) -> i32 {
        tile_of(self.y)
    }

    /// Tile coordinates.
    #[inline]
    pub const fn tile(self) -> (i32, i32) {
        (self.tile_x(), self.tile_y())
    }

    /// Offset along a direction.
    #[inline]
    pub const fn offset(self, direction: Direction, amount: i32) -> Self {
        Self::new(
            self.x + direction.x_multiplier() * amount,
            self.y + direction.y_multiplier() * amount,
        )
    }

    /// Snap both axes to the tile center.
    #[inline]
    pub const fn centered(self) -> Self {
        Self::new(align_to_center(self.x), align_to_center(self.y))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_divisibility() {
        assert_eq!(GRANULARITY % 2, 1);
        assert_eq!(GRANULARITY % 6, 3);
        assert_eq!(BASIC_SPEED * 6 + 3, GRANULARITY);
        assert_eq!(ROLLER_SKATES_INCREMENT, 28);
        assert_eq!(MAX_SPEED, 576);
        assert_eq!(DEFAULT_CORRECTION_SENSITIVITY, 481);
    }

    #[test]
    fn test_tile_math() {
        assert_eq!(tile_of(0), 0);
        assert_eq!(tile_of(GRANULARITY - 1), 0);
        assert_eq!(tile_of(GRANULARITY), 1);
        assert_eq!(tile_center(2), 2 * 1155 + 577);
        assert_eq!(align_to_center(GRANULARITY * 3 + 12), tile_center(3));
        assert_eq!(align_to_center(tile_center(4)), tile_center(4));
    }

    #[test]
    fn test_direction_multipliers() {
        assert_eq!((Direction::Left.x_multiplier(), Direction::Left.y_multiplier()), (-1, 0));
        assert_eq!((Direction::Right.x_multiplier(), Direction::Right.y_multiplier()), (1, 0));
        assert_eq!((Direction::Up.x_multiplier(), Direction::Up.y_multiplier()), (0, -1));
        assert_eq!((Direction::Down.x_multiplier(), Direction::Down.y_multiplier()), (0, 1));

        for dir in Direction::ALL {
            assert_eq!(dir.opposite().opposite(), dir);
            assert_ne!(dir.opposite(), dir);
        }
        assert_eq!(Direction::from_index(5), Direction::Up);
    }

    #[test]
    fn test_position_offset() {
        let pos = Position::tile_center(3, 3);
        let moved = pos.offset(Direction::Left, GRANULARITY);
        assert_eq!(moved.tile(), (2, 3));
        assert_eq!(moved.centered(), Position::tile_center(2, 3));
    }
}
