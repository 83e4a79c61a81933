use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{sync::Barrier, time};

use crate::{
    Device,
    error::{GroupErr, Result},
    reduction::reduction_order_pinned,
};

/// A synchronous collective-communication group of `world_size` ranks.
///
/// Every method that rendezvouses blocks the caller until all ranks reach
/// the same call; a rank that errors out of a collective leaves its peers
/// blocked, which is why group failures abort the whole run.
#[trait_variant::make(Collective: Send)]
pub trait CollectiveTemplate: Clone {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    /// The accelerator slot bound to this rank.
    fn device(&self) -> Device;

    /// Replaces `buf` on every rank with the element-wise mean of all
    /// ranks' buffers. Blocks until every rank arrives with a buffer of
    /// the same length.
    async fn all_reduce_mean(&self, buf: &mut [f32]) -> Result<()>;

    /// Blocks until every rank reaches this point.
    async fn barrier(&self);
}

struct Shared {
    barrier: Barrier,
    slots: Vec<Mutex<Vec<f32>>>,
}

/// In-process collective backend: one task per rank, rendezvous through a
/// shared barrier, contributions exchanged through rank-indexed slots.
#[derive(Clone)]
pub struct LocalGroup {
    rank: usize,
    world: usize,
    device: Device,
    shared: Arc<Shared>,
}

impl LocalGroup {
    /// Creates the handles for a full group, one per rank.
    pub fn create(world_size: NonZeroUsize) -> Vec<LocalGroup> {
        let world = world_size.get();

        let shared = Arc::new(Shared {
            barrier: Barrier::new(world),
            slots: (0..world).map(|_| Mutex::new(Vec::new())).collect(),
        });

        (0..world)
            .map(|rank| LocalGroup {
                rank,
                world,
                device: Device::new(rank),
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Joins the group, waiting for all peers to call `join` as well.
    ///
    /// # Errors
    /// `JoinTimeout` if the group is not complete within `timeout`; a
    /// partial group is never usable.
    pub async fn join(&self, timeout: Duration) -> Result<()> {
        time::timeout(timeout, self.shared.barrier.wait())
            .await
            .map(|_| ())
            .map_err(|_| GroupErr::JoinTimeout {
                rank: self.rank,
                waited: timeout,
            })
    }
}

impl Collective for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world
    }

    fn device(&self) -> Device {
        self.device
    }

    /// When the reduction order is unpinned, each rank starts the sum at
    /// its own slot and wraps around, so peers may round differently.
    /// `pin_reduction_order` makes every rank reduce slots 0..N in rank
    /// order, which is bit-identical everywhere.
    async fn all_reduce_mean(&self, buf: &mut [f32]) -> Result<()> {
        let expected = buf.len();

        {
            let mut slot = self.shared.slots[self.rank].lock();
            slot.clear();
            slot.extend_from_slice(buf);
        }

        self.shared.barrier.wait().await;

        let start = if reduction_order_pinned() { 0 } else { self.rank };

        buf.fill(0.0);
        for i in 0..self.world {
            let peer = (start + i) % self.world;
            let slot = self.shared.slots[peer].lock();

            if slot.len() != expected {
                return Err(GroupErr::SizeMismatch {
                    rank: self.rank,
                    got: slot.len(),
                    expected,
                });
            }

            for (acc, v) in buf.iter_mut().zip(slot.iter()) {
                *acc += v;
            }
        }

        let scale = 1.0 / self.world as f32;
        for v in buf.iter_mut() {
            *v *= scale;
        }

        // Keeps fast ranks from overwriting their slot for the next round
        // while a peer is still reading this one.
        self.shared.barrier.wait().await;
        Ok(())
    }

    async fn barrier(&self) {
        self.shared.barrier.wait().await;
    }
}
