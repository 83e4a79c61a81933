use std::num::NonZeroUsize;
use std::ops::Range;

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{
    determinism::{Determinism, RngStream},
    error::{Result, TrainErr},
};

/// Whether the dataset order changes between epochs.
///
/// `Fixed` is the adopted default: order stability keeps the training
/// trajectory exactly reproducible for diagnostics. `PerEpoch` reshuffles
/// with a seed derived from (run seed, epoch), identically on every rank,
/// so shards stay disjoint and complete every epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShufflePolicy {
    #[default]
    Fixed,
    PerEpoch,
}

/// Splits `total` samples among `num_workers` and returns the shard for
/// `rank`.
///
/// Properties:
/// - Ranges are contiguous, disjoint and cover `[0..total)`.
/// - Sizes differ by at most 1 (balanced partition).
pub fn shard_range(total: usize, rank: usize, num_workers: usize) -> Range<usize> {
    assert!(num_workers > 0);
    assert!(rank < num_workers);

    let base = total / num_workers;
    let rem = total % num_workers;

    let start = rank * base + rank.min(rem);
    let extra = if rank < rem { 1 } else { 0 };
    let end = start + base + extra;

    start..end
}

/// Deterministic dataset partition for one rank: a pure function of
/// (dataset size, worker count, rank, seed), plus the epoch when
/// reshuffling is opted into.
#[derive(Debug, Clone)]
pub struct Partition {
    total: usize,
    rank: usize,
    world: NonZeroUsize,
    det: Determinism,
    policy: ShufflePolicy,
}

impl Partition {
    pub fn new(
        total: usize,
        rank: usize,
        world: NonZeroUsize,
        det: Determinism,
        policy: ShufflePolicy,
    ) -> Result<Self> {
        if rank >= world.get() {
            return Err(TrainErr::InvalidConfig(format!(
                "rank {rank} out of range for world size {world}"
            )));
        }

        Ok(Self {
            total,
            rank,
            world,
            det,
            policy,
        })
    }

    #[inline]
    pub fn shard_range(&self) -> Range<usize> {
        shard_range(self.total, self.rank, self.world.get())
    }

    #[inline]
    pub fn shard_len(&self) -> usize {
        self.shard_range().len()
    }

    /// The ordered dataset indices this rank trains on in `epoch`.
    pub fn indices(&self, epoch: usize) -> Vec<usize> {
        match self.policy {
            ShufflePolicy::Fixed => self.shard_range().collect(),
            ShufflePolicy::PerEpoch => {
                let salt = self.det.salted(RngStream::PartitionShuffle, epoch as u64);
                let mut order: Vec<usize> = (0..self.total).collect();
                order.shuffle(&mut StdRng::seed_from_u64(salt));

                let range = self.shard_range();
                order[range].to_vec()
            }
        }
    }

    /// Number of synchronized steps every rank agrees to run per epoch.
    ///
    /// Computed from the smallest shard so that no rank ever reaches an
    /// all-reduce its peers skip; remainder samples of the larger shards
    /// sit out that epoch. Pure function of (total, world, batch size) —
    /// every rank computes the same value before the loop starts.
    pub fn steps_per_epoch(&self, batch_size: NonZeroUsize) -> usize {
        let min_shard = self.total / self.world.get();
        min_shard.div_ceil(batch_size.get())
    }
}
