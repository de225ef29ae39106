//! Items and Diseases
//!
//! Dense item enum plus the compile-time neutralizer table. Per-player
//! holdings are fixed-size arrays indexed by `ItemKind::index()`.

use serde::{Deserialize, Serialize};

/// Number of item kinds.
pub const ITEM_COUNT: usize = 16;

/// Number of disease kinds.
pub const DISEASE_COUNT: usize = 7;

/// Saturation point of accumulative item counts.
pub const MAX_ACCUMULATED_ITEMS: u32 = 99;

/// Every item that can lie on the grid.
///
/// Declaration order is the wire/weight order and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ItemKind {
    /// +1 bomb range
    Fire = 0,
    /// Infinite bomb range
    SuperFire = 1,
    /// Restores a third of the vitality
    Heart = 2,
    /// +1 placeable bomb
    Bomb = 3,
    /// +1 speed step
    RollerSkates = 4,
    /// Bombs bounce instead of stopping
    Jelly = 5,
    /// Kick bombs
    Boots = 6,
    /// Pick up and throw own bombs
    BlueGloves = 7,
    /// Punch bombs
    BoxingGloves = 8,
    /// Place a whole row of bombs
    BombSprinkle = 9,
    /// Remote-detonated bombs
    Trigger = 10,
    /// Walk over brick walls
    WallClimbing = 11,
    /// Spider bomb
    SpiderBomb = 12,
    /// Disease
    Disease = 13,
    /// Super disease
    SuperDisease = 14,
    /// Build brick walls
    WallBuilding = 15,
}

impl ItemKind {
    /// All items in declaration order.
    pub const ALL: [ItemKind; ITEM_COUNT] = [
        ItemKind::Fire,
        ItemKind::SuperFire,
        ItemKind::Heart,
        ItemKind::Bomb,
        ItemKind::RollerSkates,
        ItemKind::Jelly,
        ItemKind::Boots,
        ItemKind::BlueGloves,
        ItemKind::BoxingGloves,
        ItemKind::BombSprinkle,
        ItemKind::Trigger,
        ItemKind::WallClimbing,
        ItemKind::SpiderBomb,
        ItemKind::Disease,
        ItemKind::SuperDisease,
        ItemKind::WallBuilding,
    ];

    /// Dense index.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Item for a dense index.
    #[inline]
    pub fn from_index(index: usize) -> Option<ItemKind> {
        Self::ALL.get(index).copied()
    }

    /// Bomb, Fire and RollerSkates stack; everything else is a flag.
    #[inline]
    pub const fn is_accumulative(self) -> bool {
        matches!(self, ItemKind::Bomb | ItemKind::Fire | ItemKind::RollerSkates)
    }

    /// Items cleared from the holder when this one is picked up.
    pub const fn neutralizes(self) -> &'static [ItemKind] {
        match self {
            ItemKind::BlueGloves => &[ItemKind::BombSprinkle],
            ItemKind::BombSprinkle => &[ItemKind::BlueGloves],
            ItemKind::Trigger => &[ItemKind::BoxingGloves, ItemKind::WallBuilding, ItemKind::Jelly],
            ItemKind::BoxingGloves => &[ItemKind::Trigger, ItemKind::WallBuilding],
            ItemKind::WallBuilding => &[ItemKind::Trigger, ItemKind::BoxingGloves],
            ItemKind::Jelly => &[ItemKind::Trigger],
            _ => &[],
        }
    }
}

/// Disease kinds. Diseases only exist as weights; no effect is simulated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiseaseKind {
    /// Cannot place bombs
    Ceasefire,
    /// Drops bombs continuously
    BombDropping,
    /// Slow walking
    Toddling,
    /// Short fuse
    FastDetonation,
    /// Very fast walking
    Scurrying,
    /// Minimal range
    ShortRange,
    /// Swaps positions
    PositionChanging,
}

impl DiseaseKind {
    /// All diseases in declaration order.
    pub const ALL: [DiseaseKind; DISEASE_COUNT] = [
        DiseaseKind::Ceasefire,
        DiseaseKind::BombDropping,
        DiseaseKind::Toddling,
        DiseaseKind::FastDetonation,
        DiseaseKind::Scurrying,
        DiseaseKind::ShortRange,
        DiseaseKind::PositionChanging,
    ];
}

/// What a player holds: counts for accumulative items, flags for the rest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemHoldings {
    counts: [u32; ITEM_COUNT],
    flags: [bool; ITEM_COUNT],
}

impl ItemHoldings {
    /// Count of an accumulative item.
    #[inline]
    pub fn count(&self, item: ItemKind) -> u32 {
        self.counts[item.index()]
    }

    /// Overwrite a count.
    #[inline]
    pub fn set_count(&mut self, item: ItemKind, value: u32) {
        self.counts[item.index()] = value.min(MAX_ACCUMULATED_ITEMS);
    }

    /// Add one to a count (saturating).
    #[inline]
    pub fn increment(&mut self, item: ItemKind) {
        self.set_count(item, self.count(item) + 1);
    }

    /// Remove one from a count, returning false if it was already 0.
    #[inline]
    pub fn decrement(&mut self, item: ItemKind) -> bool {
        let idx = item.index();
        if self.counts[idx] == 0 {
            return false;
        }
        self.counts[idx] -= 1;
        true
    }

    /// Whether a non-accumulative item is held.
    #[inline]
    pub fn has(&self, item: ItemKind) -> bool {
        self.flags[item.index()]
    }

    /// Set or clear a flag.
    #[inline]
    pub fn set_flag(&mut self, item: ItemKind, held: bool) {
        self.flags[item.index()] = held;
    }

    /// Raw counts in item order (hashing).
    pub fn counts(&self) -> &[u32; ITEM_COUNT] {
        &self.counts
    }

    /// Raw flags in item order (hashing).
    pub fn flags(&self) -> &[bool; ITEM_COUNT] {
        &self.flags
    }
}
