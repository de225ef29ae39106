//! Round Setup
//!
//! Builds the board for the next round and finds spawn tiles. The spawn
//! search relaxes its requirements in quality steps until every player has
//! a tile, so it always terminates.

use tracing::{debug, info};

use crate::core::geometry::Direction;
use crate::game::grid::{Grid, Wall};
use crate::game::world::World;

/// Lowest quality level; every tile is acceptable here.
const LAST_QUALITY: i32 = 4;

/// Reset the board and the players for the next round.
pub(crate) fn init_next_round(world: &mut World) {
    world.grid = match &world.stored_level {
        Some(level) => level.without_fires(),
        None => Grid::generate(&world.settings, &mut world.rng),
    };

    let first_round = world.round == 0;
    let reuse_spawns = !world.settings.new_random_positions_after_rounds && !first_round;
    let level = world.settings.level.clone();

    let mut placed: Vec<(i32, i32)> = Vec::new();
    for handle in world.handles() {
        let previous = world.player(handle).spawn_tile;
        let (x, y) = match previous {
            Some(tile) if reuse_spawns => tile,
            _ => find_spawn_tile(world, &placed),
        };

        clear_surroundings(&mut world.grid, x, y);
        world.player_mut(handle).init_for_next_round(x, y, &level);
        placed.push((x, y));
    }

    world.bombs.clear();
    world.round += 1;
    world.round_tick = 0;
    world.round_over = false;
    world.initial_sides = world.living_sides().len();

    info!(
        round = world.round,
        players = placed.len(),
        sides = world.initial_sides,
        "round started"
    );
}

/// Walk backwards over the inner board from a random tile, accepting the
/// first tile that satisfies the current quality.
fn find_spawn_tile(world: &mut World, placed: &[(i32, i32)]) -> (i32, i32) {
    let max_x = world.grid.width() - 2;
    let max_y = world.grid.height() - 2;
    if max_x < 1 || max_y < 1 {
        return (0, 0);
    }

    let mut x = 1 + world.rng.next_below(max_x);
    let mut y = 1 + world.rng.next_below(max_y);

    for quality in 0..=LAST_QUALITY {
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

            if is_spawn_acceptable(&world.grid, placed, x, y, quality) {
                debug!(x, y, quality, "spawn tile found");
                return (x, y);
            }
        }
    }

    (x, y)
}

fn is_spawn_acceptable(grid: &Grid, placed: &[(i32, i32)], x: i32, y: i32, quality: i32) -> bool {
    let concrete = |x: i32, y: i32| grid.wall_at(x, y) == Wall::Concrete;

    if quality < 4 && concrete(x, y) {
        return false;
    }
    // Needs a way out along both axes
    if quality < 2 && ((concrete(x - 1, y) && concrete(x + 1, y)) || (concrete(x, y - 1) && concrete(x, y + 1))) {
        return false;
    }

    let min_distance = LAST_QUALITY - quality;
    placed
        .iter()
        .all(|&(px, py)| (px - x).abs() + (py - y).abs() >= min_distance)
}

/// Empty the spawn tile and its four neighbours, concrete excepted.
fn clear_surroundings(grid: &mut Grid, x: i32, y: i32) {
    let around = Direction::ALL
        .iter()
        .map(|d| (x + d.x_multiplier(), y + d.y_multiplier()));
    for (cx, cy) in std::iter::once((x, y)).chain(around) {
        if let Some(cell) = grid.get_mut(cx, cy) {
            if cell.wall != Wall::Concrete {
                cell.wall = Wall::Empty;
                cell.item = None;
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::bomb::{Bomb, BombType};
    use crate::game::config::{ClientInfo, GameSettings, PlayerSettings};
    use crate::game::entity::PlayerHandle;
    use crate::game::world::tests::open_world_with;

    fn four_player_world(seed: u64) -> World {
        let clients = vec![
            ClientInfo::new("a", vec![PlayerSettings::new("a1", 0), PlayerSettings::new("a2", 1)]),
            ClientInfo::new("b", vec![PlayerSettings::new("b1", 2)]),
            ClientInfo::new("c", vec![PlayerSettings::new("c1", 3)]),
        ];
        World::new(GameSettings::default(), clients, seed).unwrap()
    }

    #[test]
    fn test_spawns_are_open_and_apart() {
        for seed in 0..20 {
            let mut world = four_player_world(seed);
            world.start_round();
            assert_eq!(world.round(), 1);

            let tiles: Vec<(i32, i32)> = world.handles().iter().map(|&h| world.player(h).tile()).collect();
            for (i, &(x, y)) in tiles.iter().enumerate() {
                let cell = world.grid().cell(x, y);
                assert_eq!(cell.wall, Wall::Empty);
                assert_eq!(cell.item, None);
                for &(ox, oy) in &tiles[..i] {
                    assert!((ox - x).abs() + (oy - y).abs() >= 4, "seed {seed}: spawns too close");
                }
            }
        }
    }

    #[test]
    fn test_spawn_search_terminates_on_full_board() {
        let mut world = open_world_with(5, 5, 3);
        // Solid concrete inside: only the last quality level accepts
        for y in 1..4 {
            for x in 1..4 {
                world.grid.cell_mut(x, y).wall = Wall::Concrete;
            }
        }
        let tile = find_spawn_tile(&mut world, &[(1, 1), (2, 2)]);
        assert!((1..=3).contains(&tile.0) && (1..=3).contains(&tile.1));
    }

    #[test]
    fn test_spawn_search_scans_whole_board() {
        // Only (3, 3) keeps distance 4 from (1, 1); a partial scan settles
        // for a closer tile at a weaker quality
        for seed in 0..30 {
            let mut world = open_world_with(5, 5, 1);
            world.rng = crate::core::rng::DeterministicRng::new(seed);
            assert_eq!(find_spawn_tile(&mut world, &[(1, 1)]), (3, 3), "seed {seed}");
        }
    }

    #[test]
    fn test_stored_level_and_spawn_reuse() {
        let rows = ["#######", "#+++++#", "#+#+#+#", "#+++++#", "#######"];
        let mut settings = GameSettings::default();
        settings.level.width = 7;
        settings.level.height = 5;
        settings.new_random_positions_after_rounds = false;
        let clients = vec![
            ClientInfo::new("a", vec![PlayerSettings::new("a", 0)]),
            ClientInfo::new("b", vec![PlayerSettings::new("b", 1)]),
        ];
        let mut world = World::new(settings, clients, 3)
            .unwrap()
            .with_stored_level(Grid::from_rows(&rows));

        world.start_round();
        let first: Vec<_> = world.handles().iter().map(|&h| world.player(h).tile()).collect();

        world.bombs.push(Bomb::new(PlayerHandle::new(0, 0), 1, 1, 2, BombType::Normal));
        world.grid.cell_mut(3, 3).wall = Wall::Concrete;
        world.start_round();

        let second: Vec<_> = world.handles().iter().map(|&h| world.player(h).tile()).collect();
        assert_eq!(first, second);
        assert_eq!(world.round(), 2);
        assert!(world.bombs().is_empty());
        // Board restored from the stored level
        assert_ne!(world.grid().cell(3, 3).wall, Wall::Concrete);
        assert_eq!(world.grid().cell(2, 2).wall, Wall::Concrete);
    }

    #[test]
    fn test_round_resets_state() {
        let mut world = open_world_with(9, 9, 2);
        world.round = 0;
        world.round_over = true;
        world.round_tick = 40;
        world.player_mut(PlayerHandle::new(1, 0)).vitality = 0;

        world.start_round();

        assert!(!world.round_ended());
        assert_eq!(world.round_tick, 0);
        assert_eq!(world.initial_sides, 2);
        assert_eq!(world.player(PlayerHandle::new(1, 0)).vitality, crate::core::geometry::MAX_VITALITY);
    }
}
