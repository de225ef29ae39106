//! Authoritative Simulation Tick
//!
//! The core game loop that must be 100% deterministic: every participant
//! runs it with the same merged action batches and must end up with the
//! same state hash.

use tracing::{debug, warn};

use crate::core::hash::StateHash;
use crate::game::action::{ActionBatch, ActionLog};
use crate::game::bomb::{advance_bomb, Bomb};
use crate::game::config::{ClientInfo, ConfigError, GameSettings, GameType, KillsBelongTo};
use crate::game::detonation::check_and_handle_bomb_detonations;
use crate::game::entity::PlayerHandle;
use crate::game::events::GameEvent;
use crate::game::item::ItemKind;
use crate::game::player::{advance_player, Activity};
use crate::game::world::{Side, World};

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick, in processing order
    pub events: Vec<GameEvent>,
    /// Whether the round ended this tick
    pub round_ended: bool,
    /// Surviving side, if exactly one
    pub winner: Option<Side>,
    /// Players that scored this round
    pub winners: Vec<PlayerHandle>,
}

/// Run one simulation tick.
///
/// # Arguments
///
/// * `world` - The world (will be mutated)
/// * `batch` - Merged action batch, `None` when no input arrived this tick
///
/// # Determinism
///
/// - Players, bombs and fires are visited in a fixed order
/// - Integer sub-tile math only
/// - All randomness comes from the world's seeded RNG
pub fn tick(world: &mut World, batch: Option<&str>) -> TickResult {
    let mut result = TickResult::default();

    if world.round == 0 || world.round_over {
        result.round_ended = world.round_over;
        return result;
    }

    // 1. Apply control-key transitions
    if let Some(batch) = batch {
        apply_actions(world, batch);
    }

    // 2. Players, then fires, then bombs
    for handle in world.handles() {
        advance_player(world, handle);
    }
    world.advance_level();
    for index in 0..world.bombs.len() {
        advance_bomb(world, index);
    }

    // 3. Bombs that flew off the board
    remove_bombs(world, |b| b.dead);

    // 4. Chain reactions
    check_and_handle_bomb_detonations(world);

    // 5. Exploded bombs
    remove_bombs(world, |b| b.detonated);

    // 6. Fire damage
    apply_fire_damage(world);

    // 7. Last side standing sets every bomb off
    if world.settings.bombs_explode_after_one_remained && world.one_side_remained() {
        for bomb in world.bombs.iter_mut() {
            bomb.about_to_detonate = true;
        }
    }

    // 8. Round end and scoring
    if let Some(winners) = world.check_round_end() {
        result.round_ended = true;
        result.winner = single_side(world, &winners);
        result.winners = winners;
    }

    // 9. Advance counters
    world.tick += 1;
    world.round_tick += 1;

    #[cfg(feature = "debug-tracing")]
    tracing::trace!(tick = world.tick, hash = %hex::encode(world.compute_hash()), "state hash");

    result.events = world.take_events();
    result.events.sort();

    result
}

/// Parse and apply a merged batch. A malformed batch is dropped whole.
fn apply_actions(world: &mut World, batch: &str) {
    let batch = match ActionBatch::parse(batch) {
        Ok(batch) => batch,
        Err(error) => {
            warn!(tick = world.tick, %error, "discarding malformed action batch");
            return;
        }
    };

    for client in batch.clients {
        let Some(seats) = world.players.get_mut(client.client_index) else {
            warn!(client = client.client_index, "actions for unknown client");
            continue;
        };
        for transition in client.transitions {
            match seats.get_mut(transition.seat) {
                Some(player) => player.set_control_key_state(transition.key, transition.pressed),
                None => warn!(
                    client = client.client_index,
                    seat = transition.seat,
                    "actions for unknown seat"
                ),
            }
        }
    }
}

/// Drop matching bombs, refunding one bomb to each remaining owner.
fn remove_bombs(world: &mut World, matches: impl Fn(&Bomb) -> bool) {
    let mut index = world.bombs.len();
    while index > 0 {
        index -= 1;
        if !matches(&world.bombs[index]) {
            continue;
        }
        let bomb = world.bombs.remove(index);
        if let Some(owner) = bomb.owner {
            world.player_mut(owner).items.increment(ItemKind::Bomb);
        }
    }
}

fn apply_fire_damage(world: &mut World) {
    let damage_per_fire = world.settings.fire_damage_per_tick();
    let spare_teammates =
        world.settings.fire_doesnt_hurt_teammates && world.settings.game_type == GameType::TeamPlay;

    for handle in world.handles() {
        let player = world.player(handle);
        if player.is_dying() {
            continue;
        }
        let (x, y) = player.tile();
        let team = player.settings.team;
        let Some(cell) = world.grid.get(x, y) else {
            continue;
        };

        let hurting: Vec<_> = cell
            .fires
            .iter()
            .filter(|fire| {
                !(spare_teammates
                    && matches!(fire.owner, Some(o) if o != handle && world.player(o).settings.team == team))
            })
            .collect();
        let Some(last) = hurting.last() else {
            continue;
        };

        let killer = match world.settings.kills_belong_to {
            KillsBelongTo::OwnerOfKillerBomb => last.owner,
            KillsBelongTo::OwnerOfTriggererBomb => last.triggerer.or(last.owner),
        };
        let count = if world.settings.multiple_fire { hurting.len() as i32 } else { 1 };

        let player = world.player_mut(handle);
        player.vitality = (player.vitality - count * damage_per_fire).max(0);
        if player.vitality == 0 {
            player.set_activity(Activity::Dying);
            debug!(?handle, ?killer, "player died");
            let event = GameEvent::player_died(world.tick, handle, killer);
            world.push_event(event);
        }
    }
}

fn single_side(world: &World, winners: &[PlayerHandle]) -> Option<Side> {
    let first = world.side_of(*winners.first()?);
    winners
        .iter()
        .all(|&h| world.side_of(h) == first)
        .then_some(first)
}

/// Replay a recorded game from its action log.
///
/// Rounds follow one another as in a live game: a new round starts on the
/// tick after the previous one ended, until the point limit is reached.
pub fn replay(
    settings: GameSettings,
    clients: Vec<ClientInfo>,
    log: &ActionLog,
    tick_count: u32,
) -> Result<World, ConfigError> {
    let mut world = World::new(settings, clients, log.seed)?;
    world.start_round();

    while world.tick_count() < tick_count {
        let batch = log.get(world.tick_count());
        let result = world.tick(batch);
        if result.round_ended {
            if world.game_ended() {
                break;
            }
            world.start_round();
        }
    }

    Ok(world)
}

/// Replay and return the final state hash.
pub fn replay_hash(
    settings: GameSettings,
    clients: Vec<ClientInfo>,
    log: &ActionLog,
    tick_count: u32,
) -> Result<StateHash, ConfigError> {
    Ok(replay(settings, clients, log, tick_count)?.compute_hash())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::{BOMB_DETONATION_ITERATIONS, FIRE_ITERATIONS, MAX_VITALITY};
    use crate::game::action::{ClientActions, ControlKey, KeyTransition};
    use crate::game::bomb::BombType;
    use crate::game::config::PlayerSettings;
    use crate::game::fire::{Fire, FireShape};
    use crate::game::grid::Wall;
    use crate::game::world::tests::{open_world, open_world_with, place};

    fn press(client: usize, key: ControlKey, pressed: bool) -> String {
        ClientActions {
            client_index: client,
            transitions: vec![KeyTransition { seat: 0, key, pressed }],
        }
        .to_group()
    }

    fn two_clients() -> Vec<ClientInfo> {
        vec![
            ClientInfo::new("alice", vec![PlayerSettings::new("a", 0)]),
            ClientInfo::new("bob", vec![PlayerSettings::new("b", 1), PlayerSettings::new("c", 2)]),
        ]
    }

    #[test]
    fn test_no_round_no_tick() {
        let mut world = World::new(GameSettings::default(), two_clients(), 1).unwrap();
        let result = world.tick(None);
        assert!(!result.round_ended);
        assert_eq!(world.tick_count(), 0);
    }

    #[test]
    fn test_bomb_scenario_with_brick_and_concrete() {
        let mut world = open_world(11, 11);
        world.grid.cell_mut(6, 5).wall = Wall::Brick;
        world.grid.cell_mut(7, 5).wall = Wall::Concrete;
        let owner = PlayerHandle::new(0, 0);
        world.bombs.push(Bomb::new(owner, 5, 5, 2, BombType::Normal));
        world.player_mut(owner).items.set_count(ItemKind::Bomb, 0);

        for _ in 0..BOMB_DETONATION_ITERATIONS - 1 {
            world.tick(None);
            assert_eq!(world.bombs().len(), 1);
        }
        let result = world.tick(None);

        assert!(world.bombs().is_empty());
        assert!(result
            .events
            .iter()
            .any(|e| matches!(e.data, crate::game::events::GameEventData::BombDetonated { .. })));
        assert_eq!(world.grid().cell(5, 5).fires[0].shape, FireShape::Crossing);
        for (x, y) in [(4, 5), (6, 5), (5, 4), (5, 6)] {
            assert!(world.grid().cell(x, y).is_burning(), "({x}, {y}) should burn");
        }
        assert!(!world.grid().cell(3, 5).is_burning());
        assert!(!world.grid().cell(7, 5).is_burning());
        // Refunded
        assert_eq!(world.player(owner).items.count(ItemKind::Bomb), 1);

        for _ in 0..FIRE_ITERATIONS {
            world.tick(None);
        }
        assert_eq!(world.grid().cell(6, 5).wall, Wall::Empty);
        assert_eq!(world.grid().cell(7, 5).wall, Wall::Concrete);
        assert_eq!(world.grid().fire_count(), 0);
    }

    #[test]
    fn test_malformed_batch_is_ignored() {
        let mut world = open_world(9, 9);
        let before = world.player(PlayerHandle::new(0, 0)).entity.pos;
        world.tick(Some("0 0 0 x|"));
        world.tick(Some("garbage"));
        assert_eq!(world.player(PlayerHandle::new(0, 0)).entity.pos, before);
        assert_eq!(world.tick_count(), 2);
    }

    #[test]
    fn test_unknown_client_is_dropped() {
        let mut world = open_world(9, 9);
        let batch = format!("{}{}", press(0, ControlKey::Right, true), press(5, ControlKey::Down, true));
        world.tick(Some(&batch));
        assert!(world.player(PlayerHandle::new(0, 0)).key(ControlKey::Right));
    }

    #[test]
    fn test_key_press_moves_player() {
        let mut world = open_world(9, 9);
        let handle = PlayerHandle::new(0, 0);
        let start = world.player(handle).entity.pos.x;

        world.tick(Some(&press(0, ControlKey::Right, true)));
        let mut last = world.player(handle).entity.pos.x;
        assert!(last > start);
        for _ in 0..5 {
            world.tick(None);
            let x = world.player(handle).entity.pos.x;
            assert!(x >= last);
            last = x;
        }

        world.tick(Some(&press(0, ControlKey::Right, false)));
        let stopped = world.player(handle).entity.pos.x;
        world.tick(None);
        assert_eq!(world.player(handle).entity.pos.x, stopped);
    }

    #[test]
    fn test_fire_damage_kills_and_credits() {
        let mut world = open_world_with(9, 9, 2);
        let victim = PlayerHandle::new(1, 0);
        let killer = PlayerHandle::new(0, 0);
        place(&mut world, victim, 4, 4);
        let mut bomb = Bomb::new(killer, 4, 4, 2, BombType::Normal);
        bomb.about_to_detonate = true;
        world.bombs.push(bomb);

        let mut ticks = 0;
        let died = loop {
            let result = world.tick(None);
            ticks += 1;
            let died = result
                .events
                .into_iter()
                .find(|e| matches!(e.data, crate::game::events::GameEventData::PlayerDied { .. }));
            if let Some(event) = died {
                break event;
            }
            assert!(ticks < FIRE_ITERATIONS, "a whole fire must kill within its lifetime");
        };

        assert_eq!(
            died.data,
            crate::game::events::GameEventData::PlayerDied { victim, killer: Some(killer) }
        );
        assert!(world.player(victim).is_dying());
        assert_eq!(world.player(victim).vitality, 0);
    }

    #[test]
    fn test_multiple_fire_stacks() {
        let mut world = open_world(9, 9);
        let handle = PlayerHandle::new(0, 0);
        place(&mut world, handle, 4, 4);
        for _ in 0..3 {
            world.grid.cell_mut(4, 4).fires.push(Fire::new(FireShape::Crossing, None, None));
        }
        world.settings.damage_of_whole_bomb_fire = 10;
        let per_tick = world.settings.fire_damage_per_tick();

        world.tick(None);
        assert_eq!(world.player(handle).vitality, MAX_VITALITY - 3 * per_tick);

        world.settings.multiple_fire = false;
        world.tick(None);
        assert_eq!(world.player(handle).vitality, MAX_VITALITY - 4 * per_tick);
    }

    #[test]
    fn test_teammate_fire_spared() {
        // Two teams so the round keeps running
        let mut world = open_world_with(9, 9, 3);
        world.settings.game_type = GameType::TeamPlay;
        world.settings.fire_doesnt_hurt_teammates = true;
        let a = PlayerHandle::new(0, 0);
        let b = PlayerHandle::new(1, 0);
        let enemy = PlayerHandle::new(2, 0);
        world.player_mut(b).settings.team = world.player(a).settings.team;
        assert_ne!(world.side_of(enemy), world.side_of(b));
        place(&mut world, b, 4, 4);
        world.grid.cell_mut(4, 4).fires.push(Fire::new(FireShape::Crossing, Some(a), Some(a)));

        let result = world.tick(None);
        assert!(!result.round_ended);
        assert_eq!(world.player(b).vitality, MAX_VITALITY);

        // Own fire still hurts
        world.grid.cell_mut(4, 4).fires.push(Fire::new(FireShape::Crossing, Some(b), Some(b)));
        world.tick(None);
        let after_own = world.player(b).vitality;
        assert!(after_own < MAX_VITALITY);

        // So does an enemy's
        world.grid.cell_mut(4, 4).fires.clear();
        world.grid.cell_mut(4, 4).fires.push(Fire::new(FireShape::Crossing, Some(enemy), Some(enemy)));
        world.tick(None);
        assert!(world.player(b).vitality < after_own);
    }

    #[test]
    fn test_last_side_sets_bombs_off() {
        let mut world = open_world_with(9, 9, 2);
        world.settings.bombs_explode_after_one_remained = true;
        let owner = PlayerHandle::new(0, 0);
        world.bombs.push(Bomb::new(owner, 5, 5, 2, BombType::Triggered));
        world.player_mut(PlayerHandle::new(1, 0)).set_activity(Activity::Dying);

        world.tick(None);
        assert!(world.bombs()[0].about_to_detonate);
        world.tick(None);
        assert!(world.bombs().is_empty());
    }

    #[test]
    fn test_round_ends_with_winner() {
        let mut world = open_world_with(9, 9, 2);
        let loser = PlayerHandle::new(1, 0);
        world.player_mut(loser).set_activity(Activity::Dying);

        let mut result = world.tick(None);
        while !result.round_ended {
            result = world.tick(None);
        }
        assert_eq!(result.winner, Some(Side::Player(PlayerHandle::new(0, 0))));
        assert_eq!(result.winners, vec![PlayerHandle::new(0, 0)]);

        // Nothing moves until the next round starts
        let tick = world.tick_count();
        assert!(world.tick(None).round_ended);
        assert_eq!(world.tick_count(), tick);
    }

    #[test]
    fn test_tick_determinism() {
        let run = || {
            let mut world = World::new(GameSettings::default(), two_clients(), 4242).unwrap();
            world.start_round();
            for t in 0..300u32 {
                let key = ControlKey::from_index((t / 7) as usize % 4).unwrap();
                let batch = if t % 5 == 0 {
                    merge(&[press(0, key, t % 10 == 0), press(1, ControlKey::Function1, t % 15 == 0)])
                } else {
                    String::new()
                };
                world.tick(Some(&batch));
            }
            world.compute_hash()
        };
        assert_eq!(run(), run());
    }

    fn merge(groups: &[String]) -> String {
        groups.concat()
    }

    #[test]
    fn test_replay_matches_live_run() {
        let mut log = ActionLog::new(99);
        let mut live = World::new(GameSettings::default(), two_clients(), log.seed).unwrap();
        live.start_round();

        for t in 0..400u32 {
            let batch = match t % 40 {
                0 => press(0, ControlKey::Function1, true),
                1 => press(0, ControlKey::Function1, false),
                10 => press(1, ControlKey::Left, true),
                20 => press(1, ControlKey::Left, false),
                _ => String::new(),
            };
            log.record(live.tick_count(), &batch);
            let result = live.tick(Some(&batch));
            if result.round_ended {
                if live.game_ended() {
                    break;
                }
                live.start_round();
            }
        }

        let replayed = replay(GameSettings::default(), two_clients(), &log, live.tick_count()).unwrap();
        assert_eq!(replayed.compute_hash(), live.compute_hash());
        assert_eq!(
            replay_hash(GameSettings::default(), two_clients(), &log, live.tick_count()).unwrap(),
            live.compute_hash()
        );
    }

    #[test]
    fn test_bomb_conservation() {
        let mut world = open_world(11, 11);
        let handle = PlayerHandle::new(0, 0);
        place(&mut world, handle, 5, 5);
        world.player_mut(handle).items.set_count(ItemKind::Bomb, 3);
        // Keep the owner alive through its own fire
        world.settings.damage_of_whole_bomb_fire = 0;

        let total = |world: &World| {
            let live = world.bombs().iter().filter(|b| b.owner == Some(handle)).count() as u32;
            world.player(handle).items.count(ItemKind::Bomb) + live
        };

        for t in 0..200u32 {
            let batch = match t % 20 {
                0 => press(0, ControlKey::Function1, true),
                1 => press(0, ControlKey::Function1, false),
                _ => String::new(),
            };
            world.tick(Some(&batch));
            assert_eq!(total(&world), 3, "tick {t}");
        }
    }
}
