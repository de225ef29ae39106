//! Game Events
//!
//! Events generated during simulation for logging, scoring and replay checks.

use serde::{Serialize, Deserialize};

use crate::game::bomb::BombType;
use crate::game::entity::PlayerHandle;
use crate::game::item::ItemKind;

/// Priority for event processing order.
///
/// Lower value = processed first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventPriority {
    /// Deaths first
    PlayerDeath = 0,
    /// Then explosions
    Detonation = 1,
    /// Then pickups
    ItemPickup = 2,
    /// Then placements
    BombPlacement = 3,
    /// Lowest priority
    Other = 255,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventData {
    /// A bomb was placed on the grid.
    BombPlaced {
        /// Owner
        owner: PlayerHandle,
        /// Tile
        tile: (i32, i32),
        /// Bomb type
        bomb_type: BombType,
    },

    /// A bomb exploded.
    BombDetonated {
        /// Owner, `None` if the owner left
        owner: Option<PlayerHandle>,
        /// Player credited with the detonation
        triggerer: Option<PlayerHandle>,
        /// Tile
        tile: (i32, i32),
    },

    /// A player picked up an item.
    ItemPickedUp {
        /// Player
        player: PlayerHandle,
        /// Item
        item: ItemKind,
    },

    /// A player's vitality reached zero.
    PlayerDied {
        /// Victim
        victim: PlayerHandle,
        /// Player credited with the kill
        killer: Option<PlayerHandle>,
    },

    /// The round is over.
    RoundEnded {
        /// Round number, starting at 1
        round: u32,
        /// Players that survived and scored
        winners: Vec<PlayerHandle>,
    },
}

/// A game event with timing and priority.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u32,

    /// Processing priority
    pub priority: EventPriority,

    /// Player involved (for tie-breaking)
    pub player: Option<PlayerHandle>,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u32, priority: EventPriority, data: GameEventData) -> Self {
        let player = match &data {
            GameEventData::BombPlaced { owner, .. } => Some(*owner),
            GameEventData::BombDetonated { owner, .. } => *owner,
            GameEventData::ItemPickedUp { player, .. } => Some(*player),
            GameEventData::PlayerDied { victim, .. } => Some(*victim),
            GameEventData::RoundEnded { winners, .. } => winners.first().copied(),
        };

        Self {
            tick,
            priority,
            player,
            data,
        }
    }

    /// Create bomb placed event.
    pub fn bomb_placed(tick: u32, owner: PlayerHandle, tile: (i32, i32), bomb_type: BombType) -> Self {
        Self::new(
            tick,
            EventPriority::BombPlacement,
            GameEventData::BombPlaced { owner, tile, bomb_type },
        )
    }

    /// Create bomb detonated event.
    pub fn bomb_detonated(
        tick: u32,
        owner: Option<PlayerHandle>,
        triggerer: Option<PlayerHandle>,
        tile: (i32, i32),
    ) -> Self {
        Self::new(
            tick,
            EventPriority::Detonation,
            GameEventData::BombDetonated { owner, triggerer, tile },
        )
    }

    /// Create item picked up event.
    pub fn item_picked_up(tick: u32, player: PlayerHandle, item: ItemKind) -> Self {
        Self::new(
            tick,
            EventPriority::ItemPickup,
            GameEventData::ItemPickedUp { player, item },
        )
    }

    /// Create player died event.
    pub fn player_died(tick: u32, victim: PlayerHandle, killer: Option<PlayerHandle>) -> Self {
        Self::new(
            tick,
            EventPriority::PlayerDeath,
            GameEventData::PlayerDied { victim, killer },
        )
    }

    /// Create round ended event.
    pub fn round_ended(tick: u32, round: u32, winners: Vec<PlayerHandle>) -> Self {
        Self::new(
            tick,
            EventPriority::Other,
            GameEventData::RoundEnded { round, winners },
        )
    }
}

impl PartialEq for GameEvent {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick
            && self.priority == other.priority
            && self.player == other.player
    }
}

impl Eq for GameEvent {}

impl PartialOrd for GameEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GameEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Sort by: tick, then priority, then player
        self.tick
            .cmp(&other.tick)
            .then(self.priority.cmp(&other.priority))
            .then(self.player.cmp(&other.player))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ordering() {
        let p1 = PlayerHandle::new(0, 0);
        let p2 = PlayerHandle::new(1, 0);

        let death1 = GameEvent::player_died(10, p1, None);
        let pickup = GameEvent::item_picked_up(10, p1, ItemKind::Bomb);
        let death2 = GameEvent::player_died(10, p2, Some(p1));

        // Same tick, but death < pickup
        assert!(death1 < pickup);

        // Same tick and priority, but p1 < p2
        assert!(death1 < death2);

        // Earlier tick always first
        let early = GameEvent::bomb_placed(9, p2, (1, 1), BombType::Normal);
        assert!(early < death1);
    }

    #[test]
    fn test_event_player_extraction() {
        let owner = PlayerHandle::new(2, 1);
        let event = GameEvent::bomb_detonated(5, Some(owner), None, (3, 3));
        assert_eq!(event.player, Some(owner));

        let event = GameEvent::round_ended(5, 1, vec![]);
        assert_eq!(event.player, None);
    }
}
