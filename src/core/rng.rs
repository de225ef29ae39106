//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ algorithm for fast, high-quality, deterministic randomness.
//! Given the same seed, produces identical sequence on all platforms.
//!
//! The sequencer picks one seed per game and sends it to every participant,
//! so every independently running world draws the same numbers in the same
//! order.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Determinism Guarantee
///
/// Given the same seed, this RNG will produce the exact same sequence
/// of random numbers on any platform (x86, ARM, WASM).
///
/// # Example
///
/// ```
/// use bomber_arena::core::rng::DeterministicRng;
///
/// let mut rng = DeterministicRng::new(12345);
/// let value = rng.next_u64();
/// assert_eq!(value, 6233086606872742541); // Always the same!
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random u32.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        (self.next_u64() % max as u64) as u32
    }

    /// Generate a random integer in range [0, max) for signed board math.
    ///
    /// Returns 0 for non-positive `max`.
    #[inline]
    pub fn next_below(&mut self, max: i32) -> i32 {
        if max <= 0 {
            return 0;
        }
        self.next_int(max as u32) as i32
    }

    /// Generate a random integer in range [min, max].
    #[inline]
    pub fn next_int_range(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        let range = (max - min + 1) as u32;
        min + self.next_int(range) as i32
    }

    /// Roll a percentage: true with probability `percent`/100.
    #[inline]
    pub fn chance_percent(&mut self, percent: u32) -> bool {
        percent > self.next_int(100)
    }

    /// Pick an index with probability proportional to its weight.
    ///
    /// Returns 0 when all weights are zero (no random number is drawn).
    pub fn pick_weighted(&mut self, weights: &[u32]) -> usize {
        let total: u64 = weights.iter().map(|&w| w as u64).sum();
        if total == 0 {
            return 0;
        }

        let mut remaining = self.next_u64() % total;
        for (index, &weight) in weights.iter().enumerate() {
            let weight = weight as u64;
            if remaining < weight {
                return index;
            }
            remaining -= weight;
        }
        0
    }

    /// Shuffle a slice in place using Fisher-Yates algorithm.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let len = slice.len();
        for i in (1..len).rev() {
            let j = self.next_int((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }

    /// Select a random element from a slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let idx = self.next_int(slice.len() as u32) as usize;
            Some(&slice[idx])
        }
    }

    /// Get current state (for checkpointing/debugging).
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Restore from saved state.
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive the seed of one game of a session.
///
/// The sequencer calls this once per game and distributes the result;
/// participants never derive seeds themselves.
pub fn derive_game_seed(session_id: &[u8; 16], game_number: u32) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"BOMBER_ARENA_SEED_V1");
    hasher.update(session_id);
    hasher.update(game_number.to_le_bytes());

    let hash = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&hash[0..8]);
    u64::from_le_bytes(seed)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rng_determinism() {
        // Same seed must produce same sequence
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_known_values() {
        // These values must never change!
        // If they do, recorded games stop replaying.
        let mut rng = DeterministicRng::new(42);
        assert_eq!(rng.next_u64(), 16629283624882167704);
        assert_eq!(rng.next_u64(), 1420492921613871959);
        assert_eq!(rng.next_u64(), 9768315062676884790);
    }

    #[test]
    fn test_next_int() {
        let mut rng = DeterministicRng::new(1234);

        for _ in 0..1000 {
            assert!(rng.next_int(100) < 100);
        }

        // Edge cases
        assert_eq!(rng.next_int(0), 0);
        assert_eq!(rng.next_int(1), 0);
        assert_eq!(rng.next_below(-3), 0);
    }

    #[test]
    fn test_choose() {
        let mut rng = DeterministicRng::new(5);
        let empty: [u8; 0] = [];
        assert_eq!(rng.choose(&empty), None);

        let tiles = [3, 5, 7];
        for _ in 0..100 {
            assert!(tiles.contains(rng.choose(&tiles).unwrap()));
        }
    }

    #[test]
    fn test_next_u32_is_low_half() {
        let mut a = DeterministicRng::new(808);
        let mut b = DeterministicRng::new(808);
        for _ in 0..10 {
            assert_eq!(a.next_u32(), b.next_u64() as u32);
        }
    }

    #[test]
    fn test_chance_percent_bounds() {
        let mut rng = DeterministicRng::new(77);
        for _ in 0..200 {
            assert!(!rng.chance_percent(0));
            assert!(rng.chance_percent(100));
        }
    }

    #[test]
    fn test_pick_weighted_skips_zero_weights() {
        let mut rng = DeterministicRng::new(99);
        let weights = [0, 5, 0, 3, 0];
        for _ in 0..500 {
            let idx = rng.pick_weighted(&weights);
            assert!(idx == 1 || idx == 3);
        }

        let before = rng.state();
        assert_eq!(rng.pick_weighted(&[0, 0, 0]), 0);
        assert_eq!(rng.state(), before);
    }

    #[test]
    fn test_shuffle_determinism() {
        let mut rng1 = DeterministicRng::new(1111);
        let mut rng2 = DeterministicRng::new(1111);

        let mut arr1 = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let mut arr2 = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

        rng1.shuffle(&mut arr1);
        rng2.shuffle(&mut arr2);

        assert_eq!(arr1, arr2);
    }

    #[test]
    fn test_derive_game_seed() {
        let session = [7u8; 16];
        assert_eq!(derive_game_seed(&session, 0), derive_game_seed(&session, 0));
        assert_ne!(derive_game_seed(&session, 0), derive_game_seed(&session, 1));
    }

    #[test]
    fn test_state_checkpoint() {
        let mut rng = DeterministicRng::new(5555);
        for _ in 0..50 {
            rng.next_u64();
        }

        let saved_state = rng.state();
        let next_values: Vec<u64> = (0..10).map(|_| rng.next_u64()).collect();

        rng.set_state(saved_state);
        for expected in next_values {
            assert_eq!(rng.next_u64(), expected);
        }
    }

    proptest! {
        #[test]
        fn prop_next_int_range_in_bounds(seed in any::<u64>(), min in -500i32..500, span in 0i32..500) {
            let mut rng = DeterministicRng::new(seed);
            let max = min + span;
            let value = rng.next_int_range(min, max);
            prop_assert!(value >= min && value <= max);
        }

        #[test]
        fn prop_pick_weighted_in_bounds(seed in any::<u64>(), weights in proptest::collection::vec(0u32..50, 1..20)) {
            let mut rng = DeterministicRng::new(seed);
            let idx = rng.pick_weighted(&weights);
            prop_assert!(idx < weights.len());
            if weights.iter().any(|&w| w > 0) {
                prop_assert!(weights[idx] > 0);
            }
        }
    }
}
