//! Bomb Simulation
//!
//! Phase state machine (flying, rolling, standing) and fuse timers.
//! Bombs live in `World::bombs` in insertion order; the step function
//! works on an index so it can consult the rest of the world.

use serde::{Deserialize, Serialize};

use crate::core::geometry::{
    Direction, Position, BOMB_DETONATION_ITERATIONS, BOMB_FLYING_SPEED, BOMB_ITERATIONS,
    BOMB_ROLLING_SPEED, GRANULARITY,
};
use crate::core::hash::StateHasher;
use crate::game::entity::{Entity, PlayerHandle};
use crate::game::grid::Wall;
use crate::game::world::World;

/// Bomb type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BombType {
    /// Ticks down and explodes.
    Normal = 0,
    /// Bounces instead of stopping.
    Jelly = 1,
    /// Waits for its owner's Function-2.
    Triggered = 2,
}

/// Movement phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BombPhase {
    /// Thrown or punched through the air.
    Flying = 0,
    /// Kicked along the ground.
    Rolling = 1,
    /// At rest.
    Standing = 2,
}

/// A live bomb.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bomb {
    /// Position, direction and animation counter.
    pub entity: Entity,
    /// Type.
    pub bomb_type: BombType,
    /// Phase.
    pub phase: BombPhase,
    /// Player who placed it; `None` once that player's client left.
    pub owner: Option<PlayerHandle>,
    /// Player credited with setting it off.
    pub triggerer: Option<PlayerHandle>,
    /// Ray length including the center; `INFINITE_RANGE` for super fire.
    pub range: i32,
    /// Fuse progress.
    pub ticking_iterations: u32,
    /// Ticks spent in the current phase.
    pub iterations_during_phase: u32,
    /// Landing point while flying.
    pub flying_target: Position,
    /// Flew off the board.
    pub dead: bool,
    /// Will explode in the next detonation pass.
    pub about_to_detonate: bool,
    /// Has exploded.
    pub detonated: bool,
    excluded_directions: [bool; 4],
}

impl Bomb {
    /// Standing bomb at a tile center.
    pub fn new(owner: PlayerHandle, tile_x: i32, tile_y: i32, range: i32, bomb_type: BombType) -> Self {
        Self {
            entity: Entity::at_tile(tile_x, tile_y),
            bomb_type,
            phase: BombPhase::Standing,
            owner: Some(owner),
            triggerer: None,
            range,
            ticking_iterations: 0,
            iterations_during_phase: 0,
            flying_target: Position::default(),
            dead: false,
            about_to_detonate: false,
            detonated: false,
            excluded_directions: [false; 4],
        }
    }

    /// Tile coordinates.
    #[inline]
    pub fn tile(&self) -> (i32, i32) {
        self.entity.tile()
    }

    /// Switch phase, restarting the phase counter.
    pub fn set_phase(&mut self, phase: BombPhase) {
        self.phase = phase;
        self.iterations_during_phase = 0;
        if phase == BombPhase::Flying {
            self.entity.iteration_counter = 0;
        }
    }

    /// Block a detonation ray in `direction`.
    #[inline]
    pub fn exclude_direction(&mut self, direction: Direction) {
        self.excluded_directions[direction as usize] = true;
    }

    /// Whether the ray in `direction` is blocked.
    #[inline]
    pub fn is_direction_excluded(&self, direction: Direction) -> bool {
        self.excluded_directions[direction as usize]
    }

    /// Fold into a state hash.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        self.entity.hash_into(hasher);
        hasher.update_u8(self.bomb_type as u8);
        hasher.update_u8(self.phase as u8);
        PlayerHandle::hash_opt(self.owner, hasher);
        PlayerHandle::hash_opt(self.triggerer, hasher);
        hasher.update_i32(self.range);
        hasher.update_u32(self.ticking_iterations);
        hasher.update_u32(self.iterations_during_phase);
        hasher.update_i32(self.flying_target.x);
        hasher.update_i32(self.flying_target.y);
        hasher.update_bool(self.dead);
        hasher.update_bool(self.about_to_detonate);
        hasher.update_bool(self.detonated);
        for excluded in self.excluded_directions {
            hasher.update_bool(excluded);
        }
    }
}

/// Advance the bomb at `index` by one tick.
pub(crate) fn advance_bomb(world: &mut World, index: usize) {
    step_bomb(world, index);

    let bomb = &mut world.bombs[index];
    bomb.iterations_during_phase += 1;

    if bomb.phase != BombPhase::Flying {
        bomb.entity.advance_iteration(BOMB_ITERATIONS, true);

        if bomb.bomb_type != BombType::Triggered {
            bomb.ticking_iterations += 1;
            if bomb.ticking_iterations >= BOMB_DETONATION_ITERATIONS {
                bomb.about_to_detonate = true;
            }
        }
    }
}

fn step_bomb(world: &mut World, index: usize) {
    match world.bombs[index].phase {
        BombPhase::Flying => step_flying(world, index),
        BombPhase::Rolling => step_rolling(world, index),
        BombPhase::Standing => {}
    }
}

fn step_flying(world: &mut World, index: usize) {
    let max_x = world.grid.width() * GRANULARITY - 1;
    let max_y = world.grid.height() * GRANULARITY - 1;
    let wraps = world.settings.punched_bombs_come_back_at_the_opposite_end;

    let bomb = &mut world.bombs[index];
    let direction = bomb.entity.direction;
    let mut next = bomb.entity.pos.offset(direction, BOMB_FLYING_SPEED);

    if wraps {
        if next.x < 0 {
            next.x = max_x;
        } else if next.x > max_x {
            next.x = 0;
        }
        if next.y < 0 {
            next.y = max_y;
        } else if next.y > max_y {
            next.y = 0;
        }
    } else if next.x < 0 || next.x > max_x || next.y < 0 || next.y > max_y {
        bomb.dead = true;
        return;
    }
    bomb.entity.pos = next;

    let target = bomb.flying_target;
    // A wrapped target on the far side is not reached yet
    let reached = if direction.x_multiplier() != 0 && (next.x - target.x).abs() > GRANULARITY {
        false
    } else if direction.y_multiplier() != 0 && (next.y - target.y).abs() > GRANULARITY {
        false
    } else {
        match direction {
            Direction::Left => next.x <= target.x,
            Direction::Right => next.x >= target.x,
            Direction::Up => next.y <= target.y,
            Direction::Down => next.y >= target.y,
        }
    };
    if !reached {
        return;
    }

    let (tile_x, tile_y) = next.tile();
    let permanent = world.grid.get(tile_x, tile_y).is_some_and(|c| c.is_clear())
        && world.bomb_index_at(tile_x, tile_y).is_none()
        && !world.is_player_at(tile_x, tile_y, None);

    if permanent {
        let bomb = &mut world.bombs[index];
        bomb.set_phase(BombPhase::Standing);
        bomb.entity.pos = bomb.flying_target;
        return;
    }

    if world.bombs[index].bomb_type == BombType::Jelly {
        let new_direction = Direction::from_index(world.rng.next_int(4));
        let bomb = &mut world.bombs[index];
        bomb.entity.pos = bomb.flying_target;
        bomb.entity.direction = new_direction;
    }

    // Keep flying one more tile
    let bomb = &world.bombs[index];
    let next_target = bomb.flying_target.offset(bomb.entity.direction, GRANULARITY);
    let next_target = world.validate_flying_target(next_target);
    world.bombs[index].flying_target = next_target;
}

fn step_rolling(world: &mut World, index: usize) {
    let bomb = &world.bombs[index];
    let (ahead_x, ahead_y) = bomb.entity.tile_ahead();

    if world.can_bomb_roll_to(index, ahead_x, ahead_y) {
        let bomb = &mut world.bombs[index];
        bomb.entity.pos = bomb.entity.pos.offset(bomb.entity.direction, BOMB_ROLLING_SPEED);
        let (tile_x, tile_y) = bomb.tile();
        if let Some(cell) = world.grid.get_mut(tile_x, tile_y) {
            // Rolled-over items are crushed
            if cell.wall == Wall::Empty {
                cell.item = None;
            }
        }
    } else {
        let bomb = &mut world.bombs[index];
        bomb.entity.align_x_to_center();
        bomb.entity.align_y_to_center();
        if bomb.bomb_type == BombType::Jelly {
            bomb.entity.direction = bomb.entity.direction.opposite();
        } else {
            bomb.set_phase(BombPhase::Standing);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
