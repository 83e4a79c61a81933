use std::sync::OnceLock;

use rand::{SeedableRng, rngs::StdRng};

use crate::error::{Result, TrainErr};

static PROCESS_SEED: OnceLock<u64> = OnceLock::new();

/// Named pseudo-random streams derived from the one run seed. Separate
/// streams keep consumers independent: drawing more model-init numbers
/// never shifts the partition shuffle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngStream {
    ModelInit = 1,
    PartitionShuffle = 2,
    EvalSubset = 3,
    Dataset = 4,
}

/// Handle over the fixed run seed; the only way to build RNGs in the
/// training path.
#[derive(Debug, Clone, Copy)]
pub struct Determinism {
    seed: u64,
}

/// Fixes every randomness source reachable by the process to `value` and
/// pins the collective reduction order, disabling the faster
/// order-of-arrival reduction path for the remainder of the process.
///
/// Must run before any parameter initialization or data loading. Calling
/// again with the same value is a no-op; a different value is refused —
/// this is a one-way switch with no unset operation.
pub fn seed(value: u64) -> Result<Determinism> {
    let fixed = *PROCESS_SEED.get_or_init(|| value);

    if fixed != value {
        return Err(TrainErr::SeedAlreadyFixed {
            current: fixed,
            requested: value,
        });
    }

    collective::pin_reduction_order();
    Ok(Determinism { seed: value })
}

impl Determinism {
    /// Builds a handle without touching process-wide state. Intended for
    /// tests that need differing seeds inside one process; production
    /// paths go through [`seed`].
    pub fn fixed(seed: u64) -> Self {
        Self { seed }
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A fresh deterministic RNG for the given stream.
    pub fn rng(&self, stream: RngStream) -> StdRng {
        StdRng::seed_from_u64(mix(self.seed, stream as u64))
    }

    /// Stream seed salted with an extra value (e.g. the epoch index for
    /// per-epoch reshuffles). Identical on every rank by construction.
    pub fn salted(&self, stream: RngStream, salt: u64) -> u64 {
        mix(mix(self.seed, stream as u64), salt)
    }
}

/// SplitMix64 finalizer; decorrelates seed/stream pairs.
pub(crate) fn mix(seed: u64, stream: u64) -> u64 {
    let mut z = seed.wrapping_add(stream.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
