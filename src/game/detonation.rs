//! Chain Reactions
//!
//! Resolves every bomb that is about to detonate. A bomb hit by a ray joins
//! the current chain and inherits its triggerer, so the whole chain is
//! credited to whoever set off its first bomb.

use tracing::trace;

use crate::core::geometry::Direction;
use crate::game::events::GameEvent;
use crate::game::fire::{Fire, FireShape};
use crate::game::grid::Wall;
use crate::game::world::World;
use crate::game::bomb::BombPhase;

/// Detonate every bomb that is due, including chained ones.
pub(crate) fn check_and_handle_bomb_detonations(world: &mut World) {
    ignite_bombs_in_fire(world);

    while let Some(first) = world
        .bombs
        .iter()
        .position(|b| b.about_to_detonate && !b.detonated)
    {
        let bomb = &mut world.bombs[first];
        if bomb.triggerer.is_none() {
            bomb.triggerer = bomb.owner;
        }

        let mut chain = vec![first];
        let mut cursor = 0;
        while cursor < chain.len() {
            let index = chain[cursor];
            cursor += 1;
            detonate(world, index, &mut chain);
        }

        trace!(tick = world.tick, bombs = chain.len(), "chain detonated");
    }
}

/// Any resting bomb standing in fire goes off, credited to that fire.
fn ignite_bombs_in_fire(world: &mut World) {
    for bomb in world.bombs.iter_mut() {
        if bomb.phase == BombPhase::Flying || bomb.about_to_detonate {
            continue;
        }
        let (x, y) = bomb.tile();
        let Some(fire) = world.grid.get(x, y).and_then(|c| c.fires.last()) else {
            continue;
        };
        bomb.about_to_detonate = true;
        bomb.triggerer = fire.triggerer;
    }
}

/// Cast the four rays of one bomb, growing `chain` with hit bombs.
fn detonate(world: &mut World, index: usize, chain: &mut Vec<usize>) {
    let (bx, by) = world.bombs[index].tile();
    let range = world.bombs[index].range;
    let owner = world.bombs[index].owner;
    let triggerer = world.bombs[index].triggerer;

    for direction in Direction::ALL {
        // The center tile is burnt once, by the first ray
        let mut r = if direction == Direction::Down { 0 } else { 1 };

        while r < range {
            if r > 0 && world.bombs[index].is_direction_excluded(direction) {
                break;
            }

            let x = bx + r * direction.x_multiplier();
            let y = by + r * direction.y_multiplier();
            if world.grid.wall_at(x, y) == Wall::Concrete {
                break;
            }

            let hit = if r > 0 { world.bomb_index_at(x, y) } else { None };
            if let Some(other) = hit {
                let other_bomb = &mut world.bombs[other];
                // The hit bomb must not fire back at this one
                other_bomb.exclude_direction(direction.opposite());
                if !other_bomb.detonated && !chain.contains(&other) {
                    other_bomb.about_to_detonate = true;
                    other_bomb.triggerer = triggerer;
                    chain.push(other);
                }
                break;
            }

            let shape = if r == 0 {
                FireShape::Crossing
            } else if direction.is_horizontal() {
                FireShape::Horizontal
            } else {
                FireShape::Vertical
            };
            world.add_fire(x, y, Fire::new(shape, owner, triggerer));

            let cell = world.grid.cell(x, y);
            if cell.wall == Wall::Brick || cell.has_visible_item() {
                break;
            }
            r += 1;
        }
    }

    let bomb = &mut world.bombs[index];
    bomb.detonated = true;
    let event = GameEvent::bomb_detonated(world.tick, owner, triggerer, (bx, by));
    world.push_event(event);
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::INFINITE_RANGE;
    use crate::game::bomb::{Bomb, BombType};
    use crate::game::entity::PlayerHandle;
    use crate::game::world::tests::{open_world, open_world_with};

    fn burning(world: &World, x: i32, y: i32) -> bool {
        world.grid.cell(x, y).is_burning()
    }

    #[test]
    fn test_single_bomb_rays() {
        let mut world = open_world(11, 11);
        let owner = PlayerHandle::new(0, 0);
        let mut bomb = Bomb::new(owner, 5, 5, 3, BombType::Normal);
        bomb.about_to_detonate = true;
        world.bombs.push(bomb);

        check_and_handle_bomb_detonations(&mut world);

        assert!(world.bombs[0].detonated);
        assert_eq!(world.bombs[0].triggerer, Some(owner));
        for (x, y) in [(5, 5), (5, 6), (5, 7), (5, 4), (5, 3), (6, 5), (7, 5), (4, 5), (3, 5)] {
            assert!(burning(&world, x, y), "({x}, {y}) should burn");
        }
        assert!(!burning(&world, 5, 8));
        assert!(!burning(&world, 8, 5));
        assert_eq!(world.grid.cell(5, 5).fires.len(), 1);
        assert_eq!(world.grid.cell(5, 5).fires[0].shape, FireShape::Crossing);
        assert_eq!(world.grid.cell(7, 5).fires[0].shape, FireShape::Horizontal);
        assert_eq!(world.grid.cell(5, 3).fires[0].shape, FireShape::Vertical);
        assert_eq!(world.take_events().len(), 1);
    }

    #[test]
    fn test_rays_stop_at_walls() {
        let mut world = open_world(11, 11);
        world.grid.cell_mut(6, 5).wall = Wall::Brick;
        world.grid.cell_mut(7, 5).wall = Wall::Concrete;
        world.grid.cell_mut(5, 3).wall = Wall::Concrete;
        world.grid.cell_mut(4, 5).item = Some(crate::game::item::ItemKind::Boots);

        let mut bomb = Bomb::new(PlayerHandle::new(0, 0), 5, 5, INFINITE_RANGE, BombType::Normal);
        bomb.about_to_detonate = true;
        world.bombs.push(bomb);
        check_and_handle_bomb_detonations(&mut world);

        // Brick burns but stops the ray
        assert!(burning(&world, 6, 5));
        assert!(!burning(&world, 7, 5));
        // Concrete is never set on fire
        assert!(burning(&world, 5, 4));
        assert!(!burning(&world, 5, 3));
        // A visible item stops the ray after burning
        assert!(burning(&world, 4, 5));
        assert!(!burning(&world, 3, 5));
        // Infinite range reaches the border
        assert!(burning(&world, 5, 9));
        assert!(!burning(&world, 5, 10));
    }

    #[test]
    fn test_chain_inherits_triggerer() {
        let mut world = open_world_with(11, 11, 2);
        let a = PlayerHandle::new(0, 0);
        let b = PlayerHandle::new(1, 0);

        let mut first = Bomb::new(a, 3, 5, 3, BombType::Normal);
        first.about_to_detonate = true;
        world.bombs.push(first);
        world.bombs.push(Bomb::new(b, 5, 5, 3, BombType::Normal));

        check_and_handle_bomb_detonations(&mut world);

        assert!(world.bombs.iter().all(|bomb| bomb.detonated));
        assert_eq!(world.bombs[1].triggerer, Some(a));
        // The chained bomb does not fire back
        assert!(world.bombs[1].is_direction_excluded(Direction::Left));
        // Fires beyond the second bomb belong to its owner, credited to a
        let fire = &world.grid.cell(7, 5).fires[0];
        assert_eq!(fire.owner, Some(b));
        assert_eq!(fire.triggerer, Some(a));
        // The tile between the bombs burnt once
        assert_eq!(world.grid.cell(4, 5).fires.len(), 1);
    }

    #[test]
    fn test_bomb_in_fire_goes_off() {
        let mut world = open_world_with(11, 11, 2);
        let a = PlayerHandle::new(0, 0);
        let b = PlayerHandle::new(1, 0);
        world
            .grid
            .cell_mut(5, 5)
            .fires
            .push(Fire::new(FireShape::Horizontal, Some(a), Some(a)));
        world.bombs.push(Bomb::new(b, 5, 5, 2, BombType::Triggered));

        check_and_handle_bomb_detonations(&mut world);

        assert!(world.bombs[0].detonated);
        assert_eq!(world.bombs[0].triggerer, Some(a));
    }

    #[test]
    fn test_flying_bomb_ignores_fire() {
        let mut world = open_world(11, 11);
        world.grid.cell_mut(5, 5).fires.push(Fire::new(FireShape::Crossing, None, None));
        let mut bomb = Bomb::new(PlayerHandle::new(0, 0), 5, 5, 2, BombType::Normal);
        bomb.set_phase(BombPhase::Flying);
        world.bombs.push(bomb);

        check_and_handle_bomb_detonations(&mut world);
        assert!(!world.bombs[0].detonated);
    }

    #[test]
    fn test_orphaned_bomb_has_no_credit() {
        let mut world = open_world(11, 11);
        let mut bomb = Bomb::new(PlayerHandle::new(0, 0), 5, 5, 2, BombType::Normal);
        bomb.owner = None;
        bomb.about_to_detonate = true;
        world.bombs.push(bomb);

        check_and_handle_bomb_detonations(&mut world);
        let fire = &world.grid.cell(5, 5).fires[0];
        assert_eq!(fire.owner, None);
        assert_eq!(fire.triggerer, None);
    }
}
