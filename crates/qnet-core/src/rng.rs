//! Deterministic random streams
//!
//! Every source of randomness in a trial (each agent, each channel lane)
//! draws from its own [`SimRng`] seeded from the trial seed and a stable
//! stream label. Two runs with the same base seed therefore make the same
//! draws no matter how the scheduler interleaves agents.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Random number generator used throughout the simulator
pub type SimRng = ChaCha8Rng;

/// Create a generator from a seed
pub fn seeded(seed: u64) -> SimRng {
    SimRng::seed_from_u64(seed)
}

/// Derive the seed of sub-stream `stream` from a base seed
pub fn derive_seed(base: u64, stream: u64) -> u64 {
    splitmix64(base ^ splitmix64(stream.wrapping_add(0x9E37_79B9_7F4A_7C15)))
}

/// Derive a seed for a named stream (agent id, channel id)
pub fn stream_seed(base: u64, label: &str) -> u64 {
    // FNV-1a keeps labels stable across platforms and releases
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in label.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    derive_seed(base, hash)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = seeded(42);
        let mut b = seeded(42);
        for _ in 0..100 {
            assert_eq!(a.random::<u64>(), b.random::<u64>());
        }
    }

    #[test]
    fn test_derived_streams_differ() {
        let s0 = derive_seed(7, 0);
        let s1 = derive_seed(7, 1);
        assert_ne!(s0, s1);
        assert_eq!(s0, derive_seed(7, 0));
    }

    #[test]
    fn test_stream_seed_is_label_sensitive() {
        assert_eq!(stream_seed(1, "Alice"), stream_seed(1, "Alice"));
        assert_ne!(stream_seed(1, "Alice"), stream_seed(1, "Bob"));
        assert_ne!(stream_seed(1, "Alice"), stream_seed(2, "Alice"));
    }
}
