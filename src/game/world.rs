//! World Orchestrator
//!
//! Owns the grid, every player (grouped by client), the live bomb pool and
//! the shared random source. The per-tick algorithm lives in `tick.rs`,
//! chain reactions in `detonation.rs` and round setup in `round.rs`; this
//! module holds the state plus the queries they share.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::geometry::{Position, GRANULARITY, HALF_TILE};
use crate::core::hash::{compute_state_hash, StateHash};
use crate::core::rng::DeterministicRng;
use crate::game::bomb::Bomb;
use crate::game::config::{ClientInfo, ConfigError, GameSettings, GameType};
use crate::game::entity::PlayerHandle;
use crate::game::events::GameEvent;
use crate::game::fire::Fire;
use crate::game::grid::{Grid, Wall};
use crate::game::item::ItemKind;
use crate::game::player::Player;
use crate::game::round;
use crate::game::tick::{self, TickResult};

/// A competing side: a lone player in free-for-all, a team in team play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Free-for-all player.
    Player(PlayerHandle),
    /// Team number.
    Team(u8),
}

/// The simulated game.
#[derive(Clone, Debug)]
pub struct World {
    pub(crate) settings: GameSettings,
    pub(crate) clients: Vec<ClientInfo>,
    pub(crate) players: Vec<Vec<Player>>,
    pub(crate) bombs: Vec<Bomb>,
    pub(crate) grid: Grid,
    pub(crate) stored_level: Option<Grid>,
    pub(crate) rng: DeterministicRng,
    /// Ticks since the game started; drives animation.
    pub(crate) tick: u32,
    pub(crate) round: u32,
    pub(crate) round_tick: u32,
    pub(crate) initial_sides: usize,
    pub(crate) round_over: bool,
    pub(crate) events: Vec<GameEvent>,
}

impl World {
    /// Create a game for the given clients. No round is running yet.
    pub fn new(settings: GameSettings, clients: Vec<ClientInfo>, seed: u64) -> Result<Self, ConfigError> {
        settings.validate()?;
        for client in &clients {
            client.validate()?;
        }

        let players = clients
            .iter()
            .map(|c| c.players.iter().cloned().map(Player::new).collect())
            .collect();
        let grid = Grid::new(settings.level.width, settings.level.height);

        Ok(Self {
            settings,
            clients,
            players,
            bombs: Vec::new(),
            grid,
            stored_level: None,
            rng: DeterministicRng::new(seed),
            tick: 0,
            round: 0,
            round_tick: 0,
            initial_sides: 0,
            round_over: false,
            events: Vec::new(),
        })
    }

    /// Play every round on a copy of `level` instead of a random board.
    pub fn with_stored_level(mut self, level: Grid) -> Self {
        self.stored_level = Some(level);
        self
    }

    /// Set up the next round: board, spawn tiles, fresh players.
    pub fn start_round(&mut self) {
        round::init_next_round(self);
    }

    /// Advance one tick with an optional merged action batch.
    pub fn tick(&mut self, batch: Option<&str>) -> TickResult {
        tick::tick(self, batch)
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Rules of this game.
    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// Connected clients in index order.
    pub fn clients(&self) -> &[ClientInfo] {
        &self.clients
    }

    /// Players grouped by client.
    pub fn players(&self) -> &[Vec<Player>] {
        &self.players
    }

    /// Live bombs in insertion order.
    pub fn bombs(&self) -> &[Bomb] {
        &self.bombs
    }

    /// The board.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Ticks since the game started.
    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    /// Current round, starting at 1.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Random source state.
    pub fn rng_state(&self) -> [u64; 2] {
        self.rng.state()
    }

    /// Player behind a handle.
    pub fn get_player(&self, handle: PlayerHandle) -> Option<&Player> {
        self.players.get(handle.client)?.get(handle.seat)
    }

    /// Every handle in client, then seat order.
    pub fn handles(&self) -> Vec<PlayerHandle> {
        self.players
            .iter()
            .enumerate()
            .flat_map(|(client, seats)| (0..seats.len()).map(move |seat| PlayerHandle::new(client, seat)))
            .collect()
    }

    /// Read-only view for renderers.
    pub fn view(&self) -> WorldView<'_> {
        WorldView {
            grid: &self.grid,
            players: &self.players,
            bombs: &self.bombs,
            tick: self.tick,
            round: self.round,
        }
    }

    /// Drain events produced since the last call.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    #[inline]
    pub(crate) fn player(&self, handle: PlayerHandle) -> &Player {
        &self.players[handle.client][handle.seat]
    }

    #[inline]
    pub(crate) fn player_mut(&mut self, handle: PlayerHandle) -> &mut Player {
        &mut self.players[handle.client][handle.seat]
    }

    pub(crate) fn push_event(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Index of the latest non-flying bomb on a tile.
    pub fn bomb_index_at(&self, x: i32, y: i32) -> Option<usize> {
        self.bombs
            .iter()
            .rposition(|b| b.phase != crate::game::bomb::BombPhase::Flying && b.tile() == (x, y))
    }

    /// Whether a non-dying player other than `exclude` stands on a tile.
    pub fn is_player_at(&self, x: i32, y: i32, exclude: Option<PlayerHandle>) -> bool {
        self.players.iter().enumerate().any(|(client, seats)| {
            seats.iter().enumerate().any(|(seat, p)| {
                Some(PlayerHandle::new(client, seat)) != exclude && !p.is_dying() && p.tile() == (x, y)
            })
        })
    }

    /// Whether the bomb at `index` may roll onto a tile.
    pub fn can_bomb_roll_to(&self, index: usize, x: i32, y: i32) -> bool {
        let Some(cell) = self.grid.get(x, y) else {
            return false;
        };
        if cell.wall != Wall::Empty {
            return false;
        }
        if cell.item.is_some() && self.settings.items_stop_rolling_bombs {
            return false;
        }

        let bomb_tile = self.bombs[index].tile();
        let blocked_by_player = self
            .players
            .iter()
            .flatten()
            .any(|p| !p.is_dying() && p.tile() == (x, y) && p.tile() != bomb_tile);
        if blocked_by_player {
            return false;
        }

        !matches!(self.bomb_index_at(x, y), Some(other) if other != index)
    }

    /// Clamp a flying target that left the board to the opposite edge.
    pub fn validate_flying_target(&self, target: Position) -> Position {
        let clamp = |value: i32, tiles: i32| {
            if value < 0 {
                (tiles - 1) * GRANULARITY + HALF_TILE
            } else if value > tiles * GRANULARITY {
                HALF_TILE
            } else {
                value
            }
        };
        Position::new(clamp(target.x, self.grid.width()), clamp(target.y, self.grid.height()))
    }

    /// Empty, item-free tile with no bomb and no living player.
    pub fn is_free_for_wall_building(&self, x: i32, y: i32) -> bool {
        self.grid.get(x, y).is_some_and(|c| c.is_clear())
            && self.bomb_index_at(x, y).is_none()
            && !self.is_player_at(x, y, None)
    }

    // =========================================================================
    // FIRE AND ITEMS
    // =========================================================================

    /// Set a fire on a tile. A brick without an item may roll one.
    pub(crate) fn add_fire(&mut self, x: i32, y: i32, fire: Fire) {
        let probability = self.settings.getting_item_probability;
        let cell = self.grid.cell_mut(x, y);
        cell.fires.push(fire);

        if cell.wall == Wall::Brick && cell.item.is_none() && self.rng.chance_percent(probability) {
            let index = self.rng.pick_weighted(&self.settings.level.item_weights);
            self.grid.cell_mut(x, y).item = ItemKind::from_index(index);
        }
    }

    /// Detach a burnt-out fire and resolve what it burnt.
    pub(crate) fn remove_fire(&mut self, x: i32, y: i32, fire_index: usize) {
        let annihilates = self.settings.explosion_annihilates_diseases;
        let cell = self.grid.cell_mut(x, y);
        let mut respawn = None;

        if cell.wall == Wall::Brick {
            cell.wall = Wall::Empty;
        } else if let Some(item) = cell.item.take() {
            if item == ItemKind::Disease && !annihilates {
                respawn = Some(item);
            }
        }
        cell.fires.remove(fire_index);

        if let Some(item) = respawn {
            self.replace_item_on_level(item);
        }
    }

    /// Advance every fire; expired ones are detached.
    pub(crate) fn advance_level(&mut self) {
        for y in 0..self.grid.height() {
            for x in 0..self.grid.width() {
                let mut index = self.grid.cell(x, y).fires.len();
                while index > 0 {
                    index -= 1;
                    if self.grid.cell_mut(x, y).fires[index].advance() {
                        self.remove_fire(x, y, index);
                    }
                }
            }
        }
    }

    /// Put an item back on a random free inner tile. Dropped if none is free.
    pub(crate) fn replace_item_on_level(&mut self, item: ItemKind) {
        let max_x = self.grid.width() - 2;
        let max_y = self.grid.height() - 2;
        if max_x < 1 || max_y < 1 {
            return;
        }

        let mut x = 1 + self.rng.next_below(max_x);
        let mut y = 1 + self.rng.next_below(max_y);

        let mut trials = max_x * max_y;
        while trials > 0 {
            trials -= 1;

            x -= 1;
            if x < 1 {
                x = max_x;
                y -= 1;
                if y < 1 {
                    y = max_y;
                }
            }

            if !self.grid.cell(x, y).is_clear() || self.bomb_index_at(x, y).is_some() || self.is_player_at(x, y, None) {
                continue;
            }

            self.grid.cell_mut(x, y).item = Some(item);
            return;
        }

        debug!(?item, "no free tile to replace item on");
    }

    // =========================================================================
    // SIDES AND ROUND END
    // =========================================================================

    /// Side a player competes for.
    pub fn side_of(&self, handle: PlayerHandle) -> Side {
        match self.settings.game_type {
            GameType::FreeForAll => Side::Player(handle),
            GameType::TeamPlay => Side::Team(self.player(handle).settings.team),
        }
    }

    /// Sides that still have a non-dying player.
    pub fn living_sides(&self) -> BTreeSet<Side> {
        self.handles()
            .into_iter()
            .filter(|&h| !self.player(h).is_dying())
            .map(|h| self.side_of(h))
            .collect()
    }

    /// At most one side still standing in a round that started with more.
    pub fn one_side_remained(&self) -> bool {
        self.initial_sides > 1 && self.living_sides().len() <= 1
    }

    /// Whether the current round is over.
    pub fn round_ended(&self) -> bool {
        self.round_over
    }

    /// Whether a player reached the point limit.
    pub fn game_ended(&self) -> bool {
        let limit = self.settings.game_point_limit;
        limit > 0 && self.players.iter().flatten().any(|p| p.points >= limit)
    }

    /// Decide whether the round just ended; scores survivors when it did.
    pub(crate) fn check_round_end(&mut self) -> Option<Vec<PlayerHandle>> {
        if self.round_over || self.round == 0 {
            return None;
        }

        let alive = self.living_sides().len();
        let threshold = if self.initial_sides > 1 { 1 } else { 0 };
        let animations_done = self
            .players
            .iter()
            .flatten()
            .all(|p| !p.is_dying() || p.has_finished_dying());
        let time_up = self
            .settings
            .round_tick_limit()
            .is_some_and(|limit| self.round_tick >= limit);

        if !(time_up || (alive <= threshold && animations_done)) {
            return None;
        }

        let winners: Vec<PlayerHandle> = self
            .handles()
            .into_iter()
            .filter(|&h| !self.player(h).is_dying())
            .collect();
        for &handle in &winners {
            self.player_mut(handle).points += 1;
        }
        self.round_over = true;

        let event = GameEvent::round_ended(self.tick, self.round, winners.clone());
        self.push_event(event);
        Some(winners)
    }

    // =========================================================================
    // CLIENTS
    // =========================================================================

    /// Drop a client that left mid-game.
    ///
    /// Its players disappear, later clients move down one index, and bombs
    /// or fires it owned or triggered lose that reference.
    pub fn client_left(&mut self, index: usize) {
        if index >= self.players.len() {
            warn!(index, clients = self.players.len(), "client_left for unknown client");
            return;
        }

        self.players.remove(index);
        self.clients.remove(index);

        let remap = |handle: Option<PlayerHandle>| match handle {
            Some(h) if h.client == index => None,
            Some(h) if h.client > index => Some(PlayerHandle::new(h.client - 1, h.seat)),
            other => other,
        };

        for bomb in self.bombs.iter_mut() {
            bomb.owner = remap(bomb.owner);
            bomb.triggerer = remap(bomb.triggerer);
        }
        for player in self.players.iter_mut().flatten() {
            if let Some(bomb) = player.held_bomb.as_mut() {
                bomb.owner = remap(bomb.owner);
                bomb.triggerer = remap(bomb.triggerer);
            }
        }
        for cell in self.grid.cells_mut() {
            for fire in cell.fires.iter_mut() {
                fire.owner = remap(fire.owner);
                fire.triggerer = remap(fire.triggerer);
            }
        }

        debug!(index, remaining = self.players.len(), "client left");
    }

    // =========================================================================
    // HASHING
    // =========================================================================

    /// Hash of the whole simulation state.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.tick, self.rng.state(), |hasher| {
            hasher.update_u32(self.round);
            hasher.update_u32(self.round_tick);
            hasher.update_bool(self.round_over);
            self.grid.hash_into(hasher);

            hasher.update_u32(self.players.len() as u32);
            for seats in &self.players {
                hasher.update_u32(seats.len() as u32);
                for player in seats {
                    player.hash_into(hasher);
                }
            }

            hasher.update_u32(self.bombs.len() as u32);
            for bomb in &self.bombs {
                bomb.hash_into(hasher);
            }
        })
    }
}

// =============================================================================
// RENDER VIEW
// =============================================================================

/// Borrowed snapshot handed to renderers.
#[derive(Clone, Copy, Debug)]
pub struct WorldView<'a> {
    /// Board.
    pub grid: &'a Grid,
    /// Players grouped by client.
    pub players: &'a [Vec<Player>],
    /// Live bombs.
    pub bombs: &'a [Bomb],
    /// Ticks since the game started.
    pub tick: u32,
    /// Current round.
    pub round: u32,
}

impl WorldView<'_> {
    /// Frame of a looping animation driven by the global tick counter.
    pub fn tick_phase(&self, frame_count: u32, iterations_per_phase: u32) -> u32 {
        animation_phase(frame_count, self.tick, iterations_per_phase)
    }
}

/// Frame index for a counter within a cycle of `iterations_per_phase` ticks.
pub fn animation_phase(frame_count: u32, counter: u32, iterations_per_phase: u32) -> u32 {
    if iterations_per_phase == 0 {
        return 0;
    }
    let counter = (counter % iterations_per_phase) as u64;
    (frame_count as u64 * counter / iterations_per_phase as u64) as u32
}

// =============================================================================
// TESTS
// =============================================================================
