//! Player Simulation
//!
//! Per-tick activity state machine driven by control-key state:
//! movement with correction, item pickup, bomb placement, kicking,
//! punching, throwing and dying.
//!
//! Step functions take the whole `World` and a `PlayerHandle` so they can
//! read the grid and the bomb pool while mutating the player.

use serde::{Deserialize, Serialize};

use crate::core::geometry::{
    Direction, Position, BASIC_SPEED, BOMB_FLYING_DISTANCE, DEAD_ITERATIONS_BEFORE_REPLACING_ITEMS,
    GRANULARITY, HALF_TILE, HEART_VITALITY, INFINITE_RANGE, MAX_SPEED, MAX_VITALITY,
    ROLLER_SKATES_INCREMENT,
};
use crate::core::hash::StateHasher;
use crate::game::action::{ControlKey, CONTROL_KEY_COUNT};
use crate::game::bomb::{Bomb, BombPhase, BombType};
use crate::game::config::{LevelSettings, PlayerSettings};
use crate::game::entity::{Entity, PlayerHandle};
use crate::game::events::GameEvent;
use crate::game::grid::Wall;
use crate::game::item::{ItemHoldings, ItemKind};
use crate::game::world::World;

// =============================================================================
// ACTIVITY
// =============================================================================

/// What a player is doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Activity {
    /// Idle.
    #[default]
    Standing = 0,
    /// Idle, holding a bomb.
    StandingWithBomb = 1,
    /// Moving.
    Walking = 2,
    /// Moving, holding a bomb.
    WalkingWithBomb = 3,
    /// Kicked a bomb.
    Kicking = 4,
    /// Kicked a bomb while holding one.
    KickingWithBomb = 5,
    /// Punched.
    Punching = 6,
    /// Lifting a bomb.
    PickingUp = 7,
    /// Out for the round.
    Dying = 8,
}

impl Activity {
    /// Length of one run of the activity in ticks.
    pub const fn iterations(self) -> u32 {
        match self {
            Activity::Standing | Activity::StandingWithBomb => 1,
            Activity::Walking | Activity::WalkingWithBomb => 10,
            Activity::Kicking => 6,
            Activity::KickingWithBomb => 5,
            Activity::Punching => 5,
            Activity::PickingUp => 6,
            Activity::Dying => 30,
        }
    }

    /// Whether the activity loops instead of freezing on its last tick.
    pub const fn repeatable(self) -> bool {
        matches!(
            self,
            Activity::Standing | Activity::StandingWithBomb | Activity::Walking | Activity::WalkingWithBomb
        )
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// One seat of one client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    /// Position, direction and activity counter.
    pub entity: Entity,
    /// Current activity.
    pub activity: Activity,
    /// 0..=MAX_VITALITY.
    pub vitality: i32,
    /// Item counts and flags.
    pub items: ItemHoldings,
    /// Accumulative items picked up this round, in order.
    pub picked_up_accumulative: Vec<ItemKind>,
    /// Non-accumulative items picked up this round, each at most once.
    pub picked_up_non_accumulative: Vec<ItemKind>,
    /// Budget of triggered bombs.
    pub placable_triggered_bombs: u32,
    /// Bomb carried with blue gloves.
    pub held_bomb: Option<Bomb>,
    key_states: [bool; CONTROL_KEY_COUNT],
    last_key_states: [bool; CONTROL_KEY_COUNT],
    /// Public seat settings.
    pub settings: PlayerSettings,
    /// Rounds survived.
    pub points: u32,
    /// Tile the player spawned on this round.
    pub spawn_tile: Option<(i32, i32)>,
}

impl Player {
    /// Fresh player; positioned by the first round setup.
    pub fn new(settings: PlayerSettings) -> Self {
        Self {
            entity: Entity::default(),
            activity: Activity::Standing,
            vitality: MAX_VITALITY,
            items: ItemHoldings::default(),
            picked_up_accumulative: Vec::new(),
            picked_up_non_accumulative: Vec::new(),
            placable_triggered_bombs: 0,
            held_bomb: None,
            key_states: [false; CONTROL_KEY_COUNT],
            last_key_states: [false; CONTROL_KEY_COUNT],
            settings,
            points: 0,
            spawn_tile: None,
        }
    }

    /// Reset for a new round at a tile.
    pub fn init_for_next_round(&mut self, tile_x: i32, tile_y: i32, level: &LevelSettings) {
        self.entity = Entity::at_tile(tile_x, tile_y);
        self.activity = Activity::Standing;
        self.vitality = MAX_VITALITY;
        self.held_bomb = None;

        self.items = ItemHoldings::default();
        self.items.set_count(ItemKind::Bomb, level.initial_bombs);
        self.items.set_count(ItemKind::Fire, level.initial_fire);
        self.items.set_count(ItemKind::RollerSkates, level.initial_roller_skates);
        for &item in &level.initial_items {
            if !item.is_accumulative() {
                self.items.set_flag(item, true);
            }
        }
        self.picked_up_accumulative.clear();
        self.picked_up_non_accumulative.clear();

        self.placable_triggered_bombs = if self.items.has(ItemKind::Trigger) {
            self.items.count(ItemKind::Bomb)
        } else {
            0
        };

        self.key_states = [false; CONTROL_KEY_COUNT];
        self.last_key_states = [false; CONTROL_KEY_COUNT];
        self.spawn_tile = Some((tile_x, tile_y));
    }

    /// Switch activity, restarting its counter.
    #[inline]
    pub fn set_activity(&mut self, activity: Activity) {
        self.activity = activity;
        self.entity.iteration_counter = 0;
    }

    /// Record a key state; the previous one is kept for edge detection.
    #[inline]
    pub fn set_control_key_state(&mut self, key: ControlKey, pressed: bool) {
        self.last_key_states[key.index()] = self.key_states[key.index()];
        self.key_states[key.index()] = pressed;
    }

    /// Current key state.
    #[inline]
    pub fn key(&self, key: ControlKey) -> bool {
        self.key_states[key.index()]
    }

    /// Key state before the last update.
    #[inline]
    pub fn last_key(&self, key: ControlKey) -> bool {
        self.last_key_states[key.index()]
    }

    /// Key went down since the last update.
    #[inline]
    pub fn key_just_pressed(&self, key: ControlKey) -> bool {
        self.key(key) && !self.last_key(key)
    }

    /// Any movement key held.
    pub fn is_direction_key_pressed(&self) -> bool {
        ControlKey::ALL
            .iter()
            .filter(|k| k.is_direction())
            .any(|&k| self.key(k))
    }

    /// Tile coordinates.
    #[inline]
    pub fn tile(&self) -> (i32, i32) {
        self.entity.tile()
    }

    /// True while in the Dying activity.
    #[inline]
    pub fn is_dying(&self) -> bool {
        self.activity == Activity::Dying
    }

    /// Dying animation fully played.
    pub fn has_finished_dying(&self) -> bool {
        self.is_dying() && self.entity.iteration_counter + 1 >= Activity::Dying.iterations()
    }

    /// Bomb range a new bomb would get.
    pub fn bomb_range(&self) -> i32 {
        if self.items.has(ItemKind::SuperFire) {
            INFINITE_RANGE
        } else {
            self.items.count(ItemKind::Fire) as i32 + 1
        }
    }

    /// Walking speed in sub-tile units per tick.
    pub fn speed(&self) -> i32 {
        (BASIC_SPEED + self.items.count(ItemKind::RollerSkates) as i32 * ROLLER_SKATES_INCREMENT).min(MAX_SPEED)
    }

    /// Fold into a state hash.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        self.entity.hash_into(hasher);
        hasher.update_u8(self.activity as u8);
        hasher.update_i32(self.vitality);
        for count in self.items.counts() {
            hasher.update_u32(*count);
        }
        for flag in self.items.flags() {
            hasher.update_bool(*flag);
        }
        hasher.update_u32(self.picked_up_accumulative.len() as u32);
        for item in &self.picked_up_accumulative {
            hasher.update_u8(*item as u8);
        }
        hasher.update_u32(self.picked_up_non_accumulative.len() as u32);
        for item in &self.picked_up_non_accumulative {
            hasher.update_u8(*item as u8);
        }
        hasher.update_u32(self.placable_triggered_bombs);
        match &self.held_bomb {
            Some(bomb) => {
                hasher.update_u8(1);
                bomb.hash_into(hasher);
            }
            None => hasher.update_u8(0),
        }
        for (current, last) in self.key_states.iter().zip(&self.last_key_states) {
            hasher.update_bool(*current);
            hasher.update_bool(*last);
        }
        hasher.update_u32(self.points);
    }
}

// =============================================================================
// PER-TICK SIMULATION
// =============================================================================

/// Advance one player by one tick.
pub(crate) fn advance_player(world: &mut World, handle: PlayerHandle) {
    let player = world.player_mut(handle);

    if player.activity == Activity::Dying {
        // Just counting; the items go back after a while
        player.entity.iteration_counter += 1;
        if player.entity.iteration_counter == DEAD_ITERATIONS_BEFORE_REPLACING_ITEMS {
            let items: Vec<ItemKind> = player
                .picked_up_non_accumulative
                .iter()
                .chain(&player.picked_up_accumulative)
                .copied()
                .collect();
            for item in items {
                world.replace_item_on_level(item);
            }
        }
        return;
    }

    process_activity_transitions(world, handle);
    step_player(world, handle, 0);

    let player = world.player_mut(handle);
    let activity = player.activity;
    player.entity.advance_iteration(activity.iterations(), activity.repeatable());

    // Function keys are edge-triggered: step their last state
    for key in [ControlKey::Function1, ControlKey::Function2] {
        let pressed = player.key(key);
        player.set_control_key_state(key, pressed);
    }
}

fn process_activity_transitions(world: &mut World, handle: PlayerHandle) {
    let player = world.player_mut(handle);
    let direction_pressed = player.is_direction_key_pressed();
    let on_last_tick = player.entity.iteration_counter + 1 == player.activity.iterations();

    match player.activity {
        Activity::Standing | Activity::Walking => {
            if player.activity == Activity::Standing && direction_pressed {
                player.set_activity(Activity::Walking);
            } else if player.activity == Activity::Walking && !direction_pressed {
                player.set_activity(Activity::Standing);
            }
            if player.key_just_pressed(ControlKey::Function1) {
                handle_function1_without_bomb(world, handle);
            } else if player.key_just_pressed(ControlKey::Function2) {
                handle_function2(world, handle);
            }
        }
        Activity::StandingWithBomb | Activity::WalkingWithBomb => {
            if player.activity == Activity::StandingWithBomb && direction_pressed {
                player.set_activity(Activity::WalkingWithBomb);
            } else if player.activity == Activity::WalkingWithBomb && !direction_pressed {
                player.set_activity(Activity::StandingWithBomb);
            }
            if !player.key(ControlKey::Function1) {
                throw_bomb_away(world, handle);
            }
        }
        Activity::Kicking | Activity::Punching => {
            if on_last_tick {
                player.set_activity(if direction_pressed { Activity::Walking } else { Activity::Standing });
            }
        }
        Activity::KickingWithBomb | Activity::PickingUp => {
            if on_last_tick {
                player.set_activity(if direction_pressed {
                    Activity::WalkingWithBomb
                } else {
                    Activity::StandingWithBomb
                });
            }
        }
        Activity::Dying => {}
    }
}

/// Place bombs, or pick one up with blue gloves.
fn handle_function1_without_bomb(world: &mut World, handle: PlayerHandle) {
    let player = world.player(handle);
    let (player_x, player_y) = player.tile();
    let direction = player.entity.direction;
    let bombs_count = player.items.count(ItemKind::Bomb);
    let has_blue_gloves = player.items.has(ItemKind::BlueGloves);
    let has_sprinkle = player.items.has(ItemKind::BombSprinkle);

    let (mut x, mut y) = (player_x, player_y);
    let mut max_placable = bombs_count.min(1);

    if let Some(index) = world.bomb_index_at(x, y) {
        if has_blue_gloves {
            // Own bombs only
            if world.bombs[index].owner != Some(handle) {
                return;
            }
            let bomb = world.bombs.remove(index);
            let player = world.player_mut(handle);
            player.held_bomb = Some(bomb);
            player.set_activity(Activity::PickingUp);
            return;
        }
        if has_sprinkle {
            max_placable = bombs_count;
            x += direction.x_multiplier();
            y += direction.y_multiplier();
        }
    }

    for _ in 0..max_placable {
        let Some(cell) = world.grid.get(x, y) else {
            break;
        };
        if cell.wall != Wall::Empty || cell.item.is_some() || world.bomb_index_at(x, y).is_some() {
            break;
        }
        if (x, y) != (player_x, player_y) && world.is_player_at(x, y, Some(handle)) {
            break;
        }

        let player = world.player_mut(handle);
        player.items.decrement(ItemKind::Bomb);
        let bomb_type = if player.items.has(ItemKind::Jelly) {
            BombType::Jelly
        } else if player.items.has(ItemKind::Trigger) && player.placable_triggered_bombs > 0 {
            player.placable_triggered_bombs -= 1;
            BombType::Triggered
        } else {
            BombType::Normal
        };
        let bomb = Bomb::new(handle, x, y, player.bomb_range(), bomb_type);
        world.bombs.push(bomb);
        let tick = world.tick;
        world.push_event(GameEvent::bomb_placed(tick, handle, (x, y), bomb_type));

        x += direction.x_multiplier();
        y += direction.y_multiplier();
    }
}

/// Throw the carried bomb ahead.
fn throw_bomb_away(world: &mut World, handle: PlayerHandle) {
    let player = world.player_mut(handle);
    let next_activity = if player.activity == Activity::StandingWithBomb {
        Activity::Standing
    } else {
        Activity::Walking
    };
    let Some(mut bomb) = player.held_bomb.take() else {
        player.set_activity(next_activity);
        return;
    };
    let (tile_x, tile_y) = player.tile();

    bomb.ticking_iterations = 0;
    bomb.entity.direction = player.entity.direction;
    bomb.entity.pos = Position::tile_center(tile_x, tile_y);
    bomb.set_phase(BombPhase::Flying);
    player.set_activity(next_activity);

    bomb.flying_target = world.validate_flying_target(bomb.entity.pos.offset(bomb.entity.direction, BOMB_FLYING_DISTANCE));
    world.bombs.push(bomb);
}

/// Stop rolling bombs, then punch, trigger or build.
fn handle_function2(world: &mut World, handle: PlayerHandle) {
    for bomb in world.bombs.iter_mut() {
        if bomb.owner == Some(handle) && bomb.bomb_type == BombType::Normal && bomb.phase == BombPhase::Rolling {
            bomb.set_phase(BombPhase::Standing);
            bomb.entity.align_x_to_center();
            bomb.entity.align_y_to_center();
        }
    }

    let player = world.player(handle);
    let direction = player.entity.direction;
    let (ahead_x, ahead_y) = player.entity.tile_ahead();

    if player.items.has(ItemKind::BoxingGloves) {
        world.player_mut(handle).set_activity(Activity::Punching);

        if let Some(index) = world.bomb_index_at(ahead_x, ahead_y) {
            let bomb = &mut world.bombs[index];
            bomb.entity.direction = direction;
            bomb.entity.pos = bomb.entity.pos.centered();
            bomb.set_phase(BombPhase::Flying);
            let landing = bomb.entity.pos.offset(direction, BOMB_FLYING_DISTANCE);
            world.bombs[index].flying_target = world.validate_flying_target(landing);
        }
    } else if player.items.has(ItemKind::Trigger) {
        // One triggered bomb per press, earliest first
        if let Some(bomb) = world.bombs.iter_mut().find(|b| {
            b.owner == Some(handle) && b.bomb_type == BombType::Triggered && b.phase != BombPhase::Flying
        }) {
            bomb.about_to_detonate = true;
        }
    } else if player.items.has(ItemKind::WallBuilding) {
        let stopped = world.settings.building_up_walls_stops_after_one_remained && world.one_side_remained();
        if !stopped && world.is_free_for_wall_building(ahead_x, ahead_y) {
            world.grid.cell_mut(ahead_x, ahead_y).wall = Wall::Brick;
        }
    }
}

/// Movement with correction. Re-invokes itself once when a step was cut
/// short to make a turn.
fn step_player(world: &mut World, handle: PlayerHandle, depth: u32) {
    let mut cut_to_turn = false;

    let player = world.player(handle);
    let can_move = match player.activity {
        Activity::Walking | Activity::WalkingWithBomb => true,
        Activity::Punching => player.is_direction_key_pressed(),
        _ => false,
    };

    if can_move {
        let correction = determine_new_direction(world, handle);

        let player = world.player(handle);
        let mut speed = player.speed();
        let pos = player.entity.pos;
        let direction = player.entity.direction;
        let ahead = pos.offset(direction, GRANULARITY);

        if correction || !can_player_step_to(world, handle, ahead.x, ahead.y) {
            let bomb_ahead = world.bomb_index_at(ahead.tile_x(), ahead.tile_y()).is_some();
            // Stop at the tile center instead of overshooting it
            let contained = match direction {
                Direction::Left if bomb_ahead && pos.x % GRANULARITY < HALF_TILE => 0,
                Direction::Left => speed - (HALF_TILE - (pos.x - speed) % GRANULARITY),
                Direction::Right if bomb_ahead && pos.x % GRANULARITY > HALF_TILE => 0,
                Direction::Right => speed - ((pos.x + speed) % GRANULARITY - HALF_TILE),
                Direction::Up if bomb_ahead && pos.y % GRANULARITY < HALF_TILE => 0,
                Direction::Up => speed - (HALF_TILE - (pos.y - speed) % GRANULARITY),
                Direction::Down if bomb_ahead && pos.y % GRANULARITY > HALF_TILE => 0,
                Direction::Down => speed - ((pos.y + speed) % GRANULARITY - HALF_TILE),
            };
            // Negative means the center is more than a step away
            if contained >= 0 && contained < speed {
                cut_to_turn = correction;
                speed = contained;
            }
        }

        if speed > 0 {
            let player = world.player_mut(handle);
            player.entity.pos = player.entity.pos.offset(direction, speed);
            check_and_handle_item_picking_up(world, handle);
        } else if world.player(handle).items.has(ItemKind::Boots) {
            try_to_kick(world, handle);
        }
    }

    if cut_to_turn && depth == 0 {
        step_player(world, handle, depth + 1);
    }
}

/// Pick the facing direction from the held keys. Returns true when
/// movement correction redirected the player.
fn determine_new_direction(world: &mut World, handle: PlayerHandle) -> bool {
    let player = world.player(handle);
    let Position { x, y } = player.entity.pos;
    let sensitivity = player.settings.movement_correction_sensitivity;

    let wanted = if player.key(ControlKey::Down) {
        Direction::Down
    } else if player.key(ControlKey::Up) {
        Direction::Up
    } else if player.key(ControlKey::Left) {
        Direction::Left
    } else if player.key(ControlKey::Right) {
        Direction::Right
    } else {
        return false;
    };

    let corrected = correct_direction(world, handle, wanted, x, y, sensitivity);
    world.player_mut(handle).entity.direction = corrected.unwrap_or(wanted);
    corrected.is_some()
}

fn correct_direction(
    world: &World,
    handle: PlayerHandle,
    wanted: Direction,
    x: i32,
    y: i32,
    sensitivity: i32,
) -> Option<Direction> {
    let free = |px: i32, py: i32| can_player_step_to(world, handle, px, py);
    let g = GRANULARITY;

    // Offsets along the wanted axis and across it
    let (along, across, lower, upper) = if wanted.is_horizontal() {
        (wanted.x_multiplier(), y % g, Direction::Up, Direction::Down)
    } else {
        (wanted.y_multiplier(), x % g, Direction::Left, Direction::Right)
    };
    // Position shifted by `side` tiles across and `fwd` tiles along
    let shifted = |side: i32, fwd: i32| {
        if wanted.is_horizontal() {
            (x + fwd * g, y + side * g)
        } else {
            (x + side * g, y + fwd * g)
        }
    };
    let ahead = if wanted.is_horizontal() {
        (x + along * (HALF_TILE + 1), y)
    } else {
        (x, y + along * (HALF_TILE + 1))
    };

    if !free(ahead.0, ahead.1) {
        // Blocked ahead: slide into a corridor on the side
        if across < sensitivity {
            let (sx, sy) = shifted(-1, 0);
            let (tx, ty) = shifted(-1, along);
            if free(sx, sy) && free(tx, ty) {
                return Some(lower);
            }
        }
        if across >= g - sensitivity {
            let (sx, sy) = shifted(1, 0);
            let (tx, ty) = shifted(1, along);
            if free(sx, sy) && free(tx, ty) {
                return Some(upper);
            }
        }
    } else {
        // Open ahead but a side obstruction is near: center up
        if across < HALF_TILE {
            let (tx, ty) = shifted(-1, along);
            if !free(tx, ty) {
                return Some(upper);
            }
        }
        if across > HALF_TILE {
            let (tx, ty) = shifted(1, along);
            if !free(tx, ty) {
                return Some(lower);
            }
        }
    }

    None
}

/// Walls and non-flying bombs block; wall climbing passes bricks.
fn can_player_step_to(world: &World, handle: PlayerHandle, pos_x: i32, pos_y: i32) -> bool {
    let tile_x = pos_x / GRANULARITY;
    let tile_y = pos_y / GRANULARITY;
    let wall = world.grid.wall_at(tile_x, tile_y);

    let passable = if world.player(handle).items.has(ItemKind::WallClimbing) {
        wall != Wall::Concrete
    } else {
        wall == Wall::Empty
    };

    passable && world.bomb_index_at(tile_x, tile_y).is_none()
}

fn check_and_handle_item_picking_up(world: &mut World, handle: PlayerHandle) {
    let (x, y) = world.player(handle).tile();
    let Some(cell) = world.grid.get(x, y) else {
        return;
    };
    let Some(item) = cell.item else {
        return;
    };
    if cell.wall != Wall::Empty || cell.is_burning() {
        return;
    }

    let player = world.player_mut(handle);
    if item.is_accumulative() {
        player.items.increment(item);
        player.picked_up_accumulative.push(item);
    } else {
        player.items.set_flag(item, true);
        if !player.picked_up_non_accumulative.contains(&item) {
            player.picked_up_non_accumulative.push(item);
        }

        for &neutralized in item.neutralizes() {
            let player = world.player_mut(handle);
            if !player.items.has(neutralized) {
                continue;
            }
            player.items.set_flag(neutralized, false);
            let was_picked_up = match player.picked_up_non_accumulative.iter().position(|&i| i == neutralized) {
                Some(position) => {
                    player.picked_up_non_accumulative.remove(position);
                    true
                }
                None => false,
            };
            let has_jelly = player.items.has(ItemKind::Jelly);
            if was_picked_up {
                world.replace_item_on_level(neutralized);
            }

            // Triggered bombs fall back to their plain kind
            if neutralized == ItemKind::Trigger {
                for bomb in world.bombs.iter_mut() {
                    if bomb.owner == Some(handle) && bomb.bomb_type == BombType::Triggered {
                        bomb.bomb_type = if has_jelly { BombType::Jelly } else { BombType::Normal };
                        bomb.entity.iteration_counter = 0;
                        bomb.ticking_iterations = 0;
                    }
                }
            }
        }
    }

    world.grid.cell_mut(x, y).item = None;

    match item {
        ItemKind::Trigger => {
            let live = world.bombs.iter().filter(|b| b.owner == Some(handle)).count() as u32;
            let player = world.player_mut(handle);
            player.placable_triggered_bombs = player.items.count(ItemKind::Bomb) + live;
        }
        ItemKind::Bomb => {
            let player = world.player_mut(handle);
            if player.items.has(ItemKind::Trigger) {
                player.placable_triggered_bombs += 1;
            }
        }
        ItemKind::Heart => {
            let player = world.player_mut(handle);
            player.vitality = (player.vitality + HEART_VITALITY).min(MAX_VITALITY);
        }
        _ => {}
    }

    let tick = world.tick;
    world.push_event(GameEvent::item_picked_up(tick, handle, item));
}

/// Kick the bomb ahead if it can roll.
fn try_to_kick(world: &mut World, handle: PlayerHandle) {
    let player = world.player(handle);
    let direction = player.entity.direction;
    let (ahead_x, ahead_y) = player.entity.tile_ahead();

    let Some(index) = world.bomb_index_at(ahead_x, ahead_y) else {
        return;
    };
    if !world.can_bomb_roll_to(index, ahead_x + direction.x_multiplier(), ahead_y + direction.y_multiplier()) {
        return;
    }

    let player = world.player_mut(handle);
    player.set_activity(if player.activity == Activity::WalkingWithBomb {
        Activity::KickingWithBomb
    } else {
        Activity::Kicking
    });

    let bomb = &mut world.bombs[index];
    bomb.set_phase(BombPhase::Rolling);
    bomb.entity.direction = direction;
    if direction.is_horizontal() {
        bomb.entity.align_y_to_center();
    } else {
        bomb.entity.align_x_to_center();
    }
}

// =============================================================================
// TESTS
// =============================================================================
