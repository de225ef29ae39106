//! Game Settings
//!
//! Rule configuration, immutable for the lifetime of a game. The sequencer
//! owns the authoritative copy and ships it to every participant inside the
//! game-start message, so all worlds simulate under identical rules.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::geometry::{DEFAULT_CORRECTION_SENSITIVITY, GRANULARITY};
use crate::game::item::{ItemKind, DISEASE_COUNT, ITEM_COUNT};

/// Default TCP port of the sequencer.
pub const DEFAULT_GAME_PORT: u16 = 43762;

/// Players that may share one client.
pub const MAX_PLAYERS_PER_CLIENT: usize = 4;

/// Game mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    /// Every player for themselves.
    #[default]
    FreeForAll,
    /// Players grouped by team number.
    TeamPlay,
}

/// Who is credited with a kill.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillsBelongTo {
    /// Owner of the bomb whose fire killed.
    OwnerOfKillerBomb,
    /// Player who set off the chain that killed.
    #[default]
    OwnerOfTriggererBomb,
}

/// Network latency class; selects how often ticks are server-timed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkLatency {
    /// Every tick is server-timed.
    #[default]
    Low,
    /// Every other tick is server-timed.
    High,
    /// Every fourth tick is server-timed.
    ExtraHigh,
}

impl NetworkLatency {
    /// Mask applied to the tick counter; `tick & mask == 0` means server-timed.
    #[inline]
    pub const fn mask(self) -> u32 {
        match self {
            NetworkLatency::Low => 0,
            NetworkLatency::High => 1,
            NetworkLatency::ExtraHigh => 3,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Board dimensions out of range.
    #[error("invalid level size {width}x{height}")]
    InvalidLevelSize {
        /// Requested width
        width: i32,
        /// Requested height
        height: i32,
    },
    /// A percentage exceeded 100.
    #[error("{name} must be between 0 and 100, got {value}")]
    InvalidPercentage {
        /// Field name
        name: &'static str,
        /// Offending value
        value: u32,
    },
    /// Tick frequency of zero.
    #[error("game cycle frequency must be positive")]
    ZeroFrequency,
    /// Items may drop but none has weight.
    #[error("item drops enabled but every item weight is zero")]
    NoItemWeights,
    /// Invalid seat configuration.
    #[error("client must have between 1 and {max} players, got {count}")]
    InvalidPlayerCount {
        /// Upper bound
        max: usize,
        /// Offending count
        count: usize,
    },
    /// Reading a settings file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Settings JSON did not parse.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Board and starting-equipment settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelSettings {
    /// Columns, border included.
    pub width: i32,
    /// Rows, border included.
    pub height: i32,
    /// Bombs each player starts a round with.
    pub initial_bombs: u32,
    /// Fire items each player starts a round with.
    pub initial_fire: u32,
    /// Roller skates each player starts a round with.
    pub initial_roller_skates: u32,
    /// Non-accumulative items each player starts a round with.
    pub initial_items: Vec<ItemKind>,
    /// Relative drop weight of each item, in item order.
    pub item_weights: [u32; ITEM_COUNT],
    /// Relative weight of each disease, in disease order.
    pub disease_weights: [u32; DISEASE_COUNT],
}

impl Default for LevelSettings {
    fn default() -> Self {
        let mut item_weights = [10; ITEM_COUNT];
        for item in [
            ItemKind::BoxingGloves,
            ItemKind::BlueGloves,
            ItemKind::WallBuilding,
            ItemKind::Boots,
            ItemKind::Jelly,
            ItemKind::BombSprinkle,
            ItemKind::SuperDisease,
        ] {
            item_weights[item.index()] = 5;
        }
        for item in [
            ItemKind::Trigger,
            ItemKind::SuperFire,
            ItemKind::SpiderBomb,
            ItemKind::WallClimbing,
        ] {
            item_weights[item.index()] = 2;
        }

        Self {
            width: 17,
            height: 13,
            initial_bombs: 1,
            initial_fire: 2,
            initial_roller_skates: 0,
            initial_items: Vec::new(),
            item_weights,
            disease_weights: [10; DISEASE_COUNT],
        }
    }
}

/// Complete rule set of a game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    /// Stored level to play, `None` for a random level each round.
    pub level_name: Option<String>,
    /// Game mode.
    pub game_type: GameType,
    /// Round length in seconds, 0 for unlimited.
    pub round_time_limit: u32,
    /// Points needed to win the game, 0 for unlimited.
    pub game_point_limit: u32,
    /// Join password, empty for none.
    pub password: String,
    /// Damage of a whole bomb fire as a percentage of full vitality.
    pub damage_of_whole_bomb_fire: u32,
    /// Burnt diseases vanish instead of being respawned.
    pub explosion_annihilates_diseases: bool,
    /// In team play, fire of teammates deals no damage.
    pub fire_doesnt_hurt_teammates: bool,
    /// Spawn positions are re-rolled every round.
    pub new_random_positions_after_rounds: bool,
    /// Remaining bombs explode when one side remains.
    pub bombs_explode_after_one_remained: bool,
    /// Wall building stops when one side remains.
    pub building_up_walls_stops_after_one_remained: bool,
    /// Items on the floor stop rolling bombs.
    pub items_stop_rolling_bombs: bool,
    /// Bombs flying off the board re-enter on the opposite edge.
    pub punched_bombs_come_back_at_the_opposite_end: bool,
    /// Overlapping fires stack their damage.
    pub multiple_fire: bool,
    /// Kill attribution policy.
    pub kills_belong_to: KillsBelongTo,
    /// Chance (percent) of a brick on a random level's free cell.
    pub amount_of_brick_walls: u32,
    /// Chance (percent) that a burnt brick hides an item.
    pub getting_item_probability: u32,
    /// Ticks per second.
    pub game_cycle_frequency: u32,
    /// Sequencer port.
    pub game_port: u16,
    /// Latency class.
    pub network_latency: NetworkLatency,
    /// Board settings.
    pub level: LevelSettings,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            level_name: None,
            game_type: GameType::FreeForAll,
            round_time_limit: 90,
            game_point_limit: 5,
            password: String::new(),
            damage_of_whole_bomb_fire: 100,
            explosion_annihilates_diseases: true,
            fire_doesnt_hurt_teammates: false,
            new_random_positions_after_rounds: true,
            bombs_explode_after_one_remained: false,
            building_up_walls_stops_after_one_remained: true,
            items_stop_rolling_bombs: false,
            punched_bombs_come_back_at_the_opposite_end: true,
            multiple_fire: true,
            kills_belong_to: KillsBelongTo::OwnerOfTriggererBomb,
            amount_of_brick_walls: 90,
            getting_item_probability: 40,
            game_cycle_frequency: 30,
            game_port: DEFAULT_GAME_PORT,
            network_latency: NetworkLatency::Low,
            level: LevelSettings::default(),
        }
    }
}

impl GameSettings {
    /// Parse settings from JSON and validate them.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: GameSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file and validate them.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every field for a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = &self.level;
        if !(3..=150).contains(&level.width) || !(3..=100).contains(&level.height) {
            return Err(ConfigError::InvalidLevelSize {
                width: level.width,
                height: level.height,
            });
        }

        for (name, value) in [
            ("damage_of_whole_bomb_fire", self.damage_of_whole_bomb_fire),
            ("amount_of_brick_walls", self.amount_of_brick_walls),
            ("getting_item_probability", self.getting_item_probability),
        ] {
            if value > 100 {
                return Err(ConfigError::InvalidPercentage { name, value });
            }
        }

        if self.game_cycle_frequency == 0 {
            return Err(ConfigError::ZeroFrequency);
        }

        if self.getting_item_probability > 0 && level.item_weights.iter().all(|&w| w == 0) {
            return Err(ConfigError::NoItemWeights);
        }

        Ok(())
    }

    /// Damage dealt per tick by one fire occupant, rounded half up.
    ///
    /// Rounding up guarantees 100% kills within one fire lifetime.
    pub fn fire_damage_per_tick(&self) -> i32 {
        let numerator = crate::core::geometry::MAX_VITALITY as i64 * self.damage_of_whole_bomb_fire as i64;
        let denominator = 100 * crate::core::geometry::FIRE_ITERATIONS as i64;
        ((2 * numerator + denominator) / (2 * denominator)) as i32
    }

    /// Round length in ticks, `None` when unlimited.
    pub fn round_tick_limit(&self) -> Option<u32> {
        if self.round_time_limit == 0 {
            None
        } else {
            Some(self.round_time_limit.saturating_mul(self.game_cycle_frequency))
        }
    }
}

/// Per-seat public settings, shared with every participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Display name.
    pub name: String,
    /// Team number used in team play.
    pub team: u8,
    /// Width of the movement correction band in sub-tile units.
    pub movement_correction_sensitivity: i32,
}

impl PlayerSettings {
    /// Player with default sensitivity.
    pub fn new(name: impl Into<String>, team: u8) -> Self {
        Self {
            name: name.into(),
            team,
            movement_correction_sensitivity: DEFAULT_CORRECTION_SENSITIVITY,
        }
    }

    /// Map a 0..=100 slider to a correction band of `G * percent / 200`.
    pub fn with_sensitivity_percent(mut self, percent: u32) -> Self {
        let percent = percent.min(100) as i32;
        self.movement_correction_sensitivity = GRANULARITY * percent / 200;
        self
    }
}

/// Public description of one client and its seats.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client display name.
    pub name: String,
    /// Seats in seat order.
    pub players: Vec<PlayerSettings>,
}

impl ClientInfo {
    /// Client with the given seats.
    pub fn new(name: impl Into<String>, players: Vec<PlayerSettings>) -> Self {
        Self { name: name.into(), players }
    }

    /// Validate the seat count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let count = self.players.len();
        if count == 0 || count > MAX_PLAYERS_PER_CLIENT {
            return Err(ConfigError::InvalidPlayerCount {
                max: MAX_PLAYERS_PER_CLIENT,
                count,
            });
        }
        Ok(())
    }
}
