// Deterministic, portable pseudo-random number generator.
//
// Implements xoshiro256** (Blackman & Vigna, 2018) seeded via SplitMix64.
// Hand-rolled with zero external dependencies so that every participant in a
// multiplayer session produces bit-identical output from the same seed,
// regardless of platform or compiler version. That property is what lets the
// host propagate one seed and have all peers make the same "random"
// decisions without exchanging any further traffic.
//
// **Critical constraint: determinism.** No floating-point arithmetic in the
// core generator, no stdlib hashing, no source of platform variance. The
// float helpers only post-process already-generated integer bits.

use serde::{Deserialize, Serialize};

/// Xoshiro256** PRNG — the session's shared source of randomness.
///
/// The host seeds its own instance and broadcasts the seed; every peer that
/// reseeds from the same value observes the same sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRng {
    state: [u64; 4],
}

impl SessionRng {
    /// Create a generator from a `u64` seed, expanding it into the 256-bit
    /// internal state with SplitMix64 (the xoshiro authors' recommended
    /// seeding procedure).
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            state: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Replace the internal state as if freshly constructed from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        *self = Self::new(seed);
    }

    /// Next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = self.state[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);

        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);

        result
    }

    /// Next `u32`, taken from the upper half of a `u64`.
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform `f64` in [0, 1), built from the top 53 bits of a `u64`
    /// (a double has a 52-bit mantissa plus the implicit leading bit).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform integer in `[0, n)`, rejection-sampled to avoid modulo bias.
    ///
    /// Panics if `n` is zero.
    pub fn gen_range(&mut self, n: u64) -> u64 {
        assert!(n > 0, "gen_range: n must be nonzero");
        if n.is_power_of_two() {
            return self.next_u64() & (n - 1);
        }
        let threshold = n.wrapping_neg() % n; // = (2^64 - n) % n
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return r % n;
            }
        }
    }

    /// `true` with probability `p` (values outside [0, 1] clamp naturally).
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// SplitMix64 — used only to expand a single `u64` seed into xoshiro state.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
