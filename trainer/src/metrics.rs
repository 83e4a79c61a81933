/// Per-worker counters reported when the loop finishes.
#[derive(Debug, Default, Clone)]
pub struct WorkerMetrics {
    pub steps: u64,
    pub samples: u64,
    pub epochs: u64,
    pub evals: u64,
    pub checkpoints: u64,
    pub grad_snapshots: u64,
}

impl WorkerMetrics {
    #[inline]
    pub fn bump_step(&mut self) {
        self.steps += 1;
    }

    #[inline]
    pub fn add_samples(&mut self, n: usize) {
        self.samples += n as u64;
    }

    #[inline]
    pub fn bump_epoch(&mut self) {
        self.epochs += 1;
    }
}
