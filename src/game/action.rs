//! Action Codec
//!
//! Control-key transitions travel as a compact text stream.
//!
//! A client's own transitions encode as `"<seat> <key> <p|r> ..."`. The
//! sequencer prefixes each non-empty client stream with the client index
//! and terminates it with `|`, so a merged batch looks like
//!
//! ```text
//! 0 0 4 p 1 2 r|2 0 0 p|
//! ```
//!
//! An empty string means no actions this tick.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::hash::{StateHash, StateHasher};

/// Separator terminating one client group in a merged batch.
pub const GROUP_SEPARATOR: char = '|';

/// Number of control keys per seat.
pub const CONTROL_KEY_COUNT: usize = 6;

// =============================================================================
// CONTROL KEYS
// =============================================================================

/// A player control key. The ordinal is the wire value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlKey {
    /// Walk up
    Up = 0,
    /// Walk down
    Down = 1,
    /// Walk right
    Right = 2,
    /// Walk left
    Left = 3,
    /// Place / pick up / throw
    Function1 = 4,
    /// Punch / trigger / build
    Function2 = 5,
}

impl ControlKey {
    /// All keys by ordinal.
    pub const ALL: [ControlKey; CONTROL_KEY_COUNT] = [
        ControlKey::Up,
        ControlKey::Down,
        ControlKey::Right,
        ControlKey::Left,
        ControlKey::Function1,
        ControlKey::Function2,
    ];

    /// Wire ordinal.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Key for a wire ordinal.
    #[inline]
    pub fn from_index(index: usize) -> Option<ControlKey> {
        Self::ALL.get(index).copied()
    }

    /// True for the four movement keys.
    #[inline]
    pub const fn is_direction(self) -> bool {
        matches!(self, ControlKey::Up | ControlKey::Down | ControlKey::Right | ControlKey::Left)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Malformed action stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// A group was not terminated by the separator.
    #[error("unterminated client group: {0:?}")]
    Unterminated(String),

    /// A group had no client index or no transitions.
    #[error("empty client group")]
    EmptyGroup,

    /// A numeric token did not parse.
    #[error("invalid number: {0:?}")]
    InvalidNumber(String),

    /// Key ordinal out of range.
    #[error("unknown control key ordinal {0}")]
    UnknownKey(usize),

    /// Pressed flag was neither `p` nor `r`.
    #[error("invalid key state flag: {0:?}")]
    InvalidFlag(String),

    /// Token count not a multiple of three.
    #[error("incomplete transition in group for client {0}")]
    IncompleteTransition(usize),
}

// =============================================================================
// TRANSITIONS
// =============================================================================

/// One key press or release for one seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTransition {
    /// Seat on the client.
    pub seat: usize,
    /// Key.
    pub key: ControlKey,
    /// True on press, false on release.
    pub pressed: bool,
}

impl KeyTransition {
    /// Create a transition.
    pub const fn new(seat: usize, key: ControlKey, pressed: bool) -> Self {
        Self { seat, key, pressed }
    }
}

impl fmt::Display for KeyTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.seat,
            self.key.index(),
            if self.pressed { 'p' } else { 'r' }
        )
    }
}

/// Encode a client's own transitions (no client prefix).
pub fn encode_transitions(transitions: &[KeyTransition]) -> String {
    transitions
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode a client's own transition stream.
pub fn decode_transitions(stream: &str, client_index: usize) -> Result<Vec<KeyTransition>, ActionError> {
    let tokens: Vec<&str> = stream.split_whitespace().collect();
    if tokens.len() % 3 != 0 {
        return Err(ActionError::IncompleteTransition(client_index));
    }

    tokens
        .chunks(3)
        .map(|chunk| {
            let seat = parse_index(chunk[0])?;
            let key_index = parse_index(chunk[1])?;
            let key = ControlKey::from_index(key_index).ok_or(ActionError::UnknownKey(key_index))?;
            let pressed = match chunk[2] {
                "p" => true,
                "r" => false,
                other => return Err(ActionError::InvalidFlag(other.to_string())),
            };
            Ok(KeyTransition::new(seat, key, pressed))
        })
        .collect()
}

fn parse_index(token: &str) -> Result<usize, ActionError> {
    token
        .parse::<usize>()
        .map_err(|_| ActionError::InvalidNumber(token.to_string()))
}

// =============================================================================
// BATCHES
// =============================================================================

/// Transitions of one client in one tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientActions {
    /// Client index at the time of the tick.
    pub client_index: usize,
    /// Transitions in arrival order.
    pub transitions: Vec<KeyTransition>,
}

impl ClientActions {
    /// Group for a merged batch: client prefix plus transitions plus separator.
    pub fn to_group(&self) -> String {
        format!(
            "{} {}{}",
            self.client_index,
            encode_transitions(&self.transitions),
            GROUP_SEPARATOR
        )
    }
}

/// Merge per-client streams into one batch, skipping clients with nothing to say.
///
/// `streams[i]` is client `i`'s own encoded transitions.
pub fn merge_client_actions<S: AsRef<str>>(streams: &[S]) -> String {
    let mut merged = String::new();
    for (client_index, stream) in streams.iter().enumerate() {
        let stream = stream.as_ref().trim();
        if stream.is_empty() {
            continue;
        }
        merged.push_str(&client_index.to_string());
        merged.push(' ');
        merged.push_str(stream);
        merged.push(GROUP_SEPARATOR);
    }
    merged
}

/// All transitions of one tick, grouped by client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBatch {
    /// Client groups in stream order.
    pub clients: Vec<ClientActions>,
}

impl ActionBatch {
    /// Parse a merged batch.
    pub fn parse(batch: &str) -> Result<Self, ActionError> {
        let batch = batch.trim();
        if batch.is_empty() {
            return Ok(Self::default());
        }

        let mut groups: Vec<&str> = batch.split(GROUP_SEPARATOR).collect();
        // Trailing separator leaves one empty tail.
        match groups.pop() {
            Some(tail) if tail.trim().is_empty() => {}
            Some(tail) => return Err(ActionError::Unterminated(tail.to_string())),
            None => return Ok(Self::default()),
        }

        let mut clients = Vec::with_capacity(groups.len());
        for group in groups {
            let group = group.trim();
            let (client_token, rest) = group.split_once(char::is_whitespace).ok_or(ActionError::EmptyGroup)?;
            let client_index = parse_index(client_token)?;
            let transitions = decode_transitions(rest, client_index)?;
            if transitions.is_empty() {
                return Err(ActionError::EmptyGroup);
            }
            clients.push(ClientActions {
                client_index,
                transitions,
            });
        }

        Ok(Self { clients })
    }

    /// True when no client acted.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Encode back to the wire form.
    pub fn encode(&self) -> String {
        self.clients.iter().map(ClientActions::to_group).collect()
    }
}

// =============================================================================
// ACTION LOG
// =============================================================================

/// Every non-empty merged batch of a game, keyed by tick.
///
/// Together with the game seed this is enough to replay the game.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionLog {
    /// Seed the game started from
    pub seed: u64,
    batches: BTreeMap<u32, String>,
}

impl ActionLog {
    /// Empty log for a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            batches: BTreeMap::new(),
        }
    }

    /// Record the batch applied at `tick`. Empty batches are not stored.
    pub fn record(&mut self, tick: u32, batch: &str) {
        if !batch.is_empty() {
            self.batches.insert(tick, batch.to_string());
        }
    }

    /// Batch applied at `tick`, if any.
    pub fn get(&self, tick: u32) -> Option<&str> {
        self.batches.get(&tick).map(String::as_str)
    }

    /// Number of recorded batches.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Recorded `(tick, batch)` pairs in tick order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.batches.iter().map(|(t, b)| (*t, b.as_str()))
    }

    /// Hash of the whole log.
    pub fn hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_action_log();
        hasher.update_u64(self.seed);
        for (tick, batch) in &self.batches {
            hasher.update_u32(*tick);
            hasher.update_u32(batch.len() as u32);
            hasher.update_bytes(batch.as_bytes());
        }
        hasher.finalize()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_transitions() {
        let transitions = [
            KeyTransition::new(0, ControlKey::Function1, true),
            KeyTransition::new(1, ControlKey::Right, false),
        ];
        assert_eq!(encode_transitions(&transitions), "0 4 p 1 2 r");
        assert_eq!(encode_transitions(&[]), "");
    }

    #[test]
    fn test_merge_skips_silent_clients() {
        let merged = merge_client_actions(&["0 4 p", "", "1 0 r"]);
        assert_eq!(merged, "0 0 4 p|2 1 0 r|");
        assert_eq!(merge_client_actions::<&str>(&[]), "");
    }

    #[test]
    fn test_parse_merged_batch() {
        let batch = ActionBatch::parse("0 0 4 p 1 2 r|2 0 0 p|").unwrap();
        assert_eq!(batch.clients.len(), 2);
        assert_eq!(batch.clients[0].client_index, 0);
        assert_eq!(
            batch.clients[0].transitions,
            vec![
                KeyTransition::new(0, ControlKey::Function1, true),
                KeyTransition::new(1, ControlKey::Right, false),
            ]
        );
        assert_eq!(batch.clients[1].client_index, 2);
        assert_eq!(batch.encode(), "0 0 4 p 1 2 r|2 0 0 p|");
    }

    #[test]
    fn test_parse_empty() {
        assert!(ActionBatch::parse("").unwrap().is_empty());
        assert!(ActionBatch::parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(ActionBatch::parse("0 0 4 p"), Err(ActionError::Unterminated(_))));
        assert!(matches!(ActionBatch::parse("0|"), Err(ActionError::EmptyGroup)));
        assert!(matches!(ActionBatch::parse("0 0 9 p|"), Err(ActionError::UnknownKey(9))));
        assert!(matches!(ActionBatch::parse("0 0 4 x|"), Err(ActionError::InvalidFlag(_))));
        assert!(matches!(ActionBatch::parse("0 0 4|"), Err(ActionError::IncompleteTransition(0))));
        assert!(matches!(ActionBatch::parse("a 0 4 p|"), Err(ActionError::InvalidNumber(_))));
    }

    #[test]
    fn test_action_log() {
        let mut log = ActionLog::new(42);
        log.record(0, "0 0 4 p|");
        log.record(1, "");
        log.record(5, "1 0 0 r|");

        assert_eq!(log.len(), 2);
        assert_eq!(log.get(5), Some("1 0 0 r|"));
        assert_eq!(log.get(1), None);

        let mut other = ActionLog::new(42);
        other.record(0, "0 0 4 p|");
        assert_ne!(log.hash(), other.hash());
        other.record(5, "1 0 0 r|");
        assert_eq!(log.hash(), other.hash());
    }

    fn transition_strategy() -> impl Strategy<Value = KeyTransition> {
        (0usize..4, 0usize..CONTROL_KEY_COUNT, any::<bool>()).prop_map(|(seat, key, pressed)| {
            KeyTransition::new(seat, ControlKey::ALL[key], pressed)
        })
    }

    proptest! {
        #[test]
        fn prop_merged_batches_parse(
            streams in prop::collection::vec(prop::collection::vec(transition_strategy(), 0..5), 0..4)
        ) {
            let encoded: Vec<String> = streams.iter().map(|t| encode_transitions(t)).collect();
            let merged = merge_client_actions(&encoded);
            let batch = ActionBatch::parse(&merged).unwrap();

            let expected: Vec<(usize, &Vec<KeyTransition>)> = streams
                .iter()
                .enumerate()
                .filter(|(_, t)| !t.is_empty())
                .collect();
            prop_assert_eq!(batch.clients.len(), expected.len());
            for (group, (index, transitions)) in batch.clients.iter().zip(expected) {
                prop_assert_eq!(group.client_index, index);
                prop_assert_eq!(&group.transitions, transitions);
            }
        }
    }
}
