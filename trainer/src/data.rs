use std::sync::Arc;

use ndarray::Array2;

use ml::LabeledDataset;

/// One gathered mini-batch.
#[derive(Debug, Clone)]
pub struct Batch {
    pub xs: Array2<f32>,
    pub ys: Vec<usize>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.ys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ys.is_empty()
    }
}

/// Dataloader over an explicit index list (a shard, the full held-out set,
/// or a sampled subset). The dataset itself is shared read-only; batches
/// are gathered copies since shuffled index lists are not contiguous.
#[derive(Debug, Clone)]
pub struct ShardLoader {
    data: Arc<LabeledDataset>,
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl ShardLoader {
    pub fn new(data: Arc<LabeledDataset>, indices: Vec<usize>, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0");

        Self {
            data,
            indices,
            batch_size,
            cursor: 0,
        }
    }

    /// Samples behind this loader.
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[inline]
    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    #[inline]
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Swaps in a new index list (next epoch's order) and rewinds.
    pub fn reindex(&mut self, indices: Vec<usize>) {
        self.indices = indices;
        self.cursor = 0;
    }

    /// Returns the next batch, or None when the index list is exhausted.
    pub fn next_batch(&mut self) -> Option<Batch> {
        if self.cursor >= self.indices.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.indices.len());
        let (xs, ys) = self.data.gather(&self.indices[self.cursor..end]);

        self.cursor = end;
        Some(Batch { xs, ys })
    }
}
