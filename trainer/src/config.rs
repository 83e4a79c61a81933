use std::{collections::BTreeSet, num::NonZeroUsize, path::PathBuf};

use ml::Variant;

use crate::{
    error::{Result, TrainErr},
    partition::ShufflePolicy,
    schedule::StageSchedule,
};

/// Immutable per-run training configuration.
///
/// Built once by the launcher and handed to every rank unchanged, so the
/// staged schedule derived from it is identical everywhere.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub variant: Variant,
    /// Run name; prefixes every artifact file of this run.
    pub run_name: String,
    /// Experiment directory grouping related runs.
    pub experiment: String,
    pub out_dir: PathBuf,
    /// Total epochs the full training trajectory spans, across resumes.
    pub epochs: NonZeroUsize,
    /// Global batch size; each worker trains on `global / world_size`.
    pub global_batch: NonZeroUsize,
    pub lr: f32,
    pub momentum: f32,
    pub weight_decay: f32,
    pub shuffle: ShufflePolicy,
    /// Evaluate on epochs divisible by this period.
    pub accuracy_sample_period: NonZeroUsize,
    /// Epoch after which this stage stops (and checkpoints, if enabled).
    pub stage_boundary: Option<usize>,
    pub record_checkpoints: bool,
    /// Checkpoint to restore before training; missing file is fatal.
    pub resume_from: Option<PathBuf>,
    /// Global step indices at which the flat gradient is persisted.
    pub instrument_steps: BTreeSet<u64>,
}

impl TrainConfig {
    pub fn new(variant: Variant, run_name: impl Into<String>) -> Self {
        Self {
            variant,
            run_name: run_name.into(),
            experiment: "default".to_string(),
            out_dir: PathBuf::from("out"),
            epochs: NonZeroUsize::new(15).unwrap(),
            global_batch: NonZeroUsize::new(512).unwrap(),
            lr: 0.05,
            momentum: 0.9,
            weight_decay: 5e-4,
            shuffle: ShufflePolicy::default(),
            accuracy_sample_period: NonZeroUsize::new(5).unwrap(),
            stage_boundary: None,
            record_checkpoints: false,
            resume_from: None,
            instrument_steps: BTreeSet::new(),
        }
    }

    pub fn with_epochs(mut self, epochs: NonZeroUsize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_global_batch(mut self, global_batch: NonZeroUsize) -> Self {
        self.global_batch = global_batch;
        self
    }

    pub fn with_lr(mut self, lr: f32) -> Self {
        self.lr = lr;
        self
    }

    pub fn with_stage_boundary(mut self, epoch: usize) -> Self {
        self.stage_boundary = Some(epoch);
        self
    }

    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    /// Rejects configurations no run could ever train under.
    pub fn validate(&self) -> Result<()> {
        if self.run_name.is_empty() {
            return Err(TrainErr::InvalidConfig("run name is empty".to_string()));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(TrainErr::InvalidConfig(format!(
                "learning rate {} is not positive",
                self.lr
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(TrainErr::InvalidConfig(format!(
                "momentum {} outside [0, 1)",
                self.momentum
            )));
        }
        if self.weight_decay < 0.0 {
            return Err(TrainErr::InvalidConfig(format!(
                "weight decay {} is negative",
                self.weight_decay
            )));
        }

        Ok(())
    }

    /// The per-worker batch size under the global-batch policy.
    ///
    /// # Errors
    /// `InvalidConfig` when the global batch cannot feed every worker at
    /// least one sample.
    pub fn per_worker_batch(&self, world_size: NonZeroUsize) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.global_batch.get() / world_size.get()).ok_or_else(|| {
            TrainErr::InvalidConfig(format!(
                "global batch {} smaller than world size {world_size}",
                self.global_batch
            ))
        })
    }

    /// The staged-execution policy this config implies. Pure derivation, so
    /// every rank computing it agrees.
    pub fn schedule(&self) -> StageSchedule {
        StageSchedule {
            accuracy_sample_period: self.accuracy_sample_period,
            stage_boundary: self.stage_boundary,
            checkpoints_enabled: self.record_checkpoints,
            instrument_ceiling: self.instrument_steps.last().copied(),
        }
    }

    // Per-run artifact layout: metrics under <out>/<experiment>/, model
    // checkpoints and gradient snapshots in shared top-level dirs.

    pub fn run_dir(&self) -> PathBuf {
        self.out_dir.join(&self.experiment)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.out_dir
            .join("checkpoints")
            .join(format!("{}.st", self.run_name))
    }

    pub fn grads_dir(&self) -> PathBuf {
        self.out_dir.join("grads")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn defaults_validate() {
        TrainConfig::new(Variant::Mlp, "run").validate().unwrap();
    }

    #[test]
    fn bad_hyperparameters_are_rejected() {
        let base = TrainConfig::new(Variant::Mlp, "run");

        assert!(base.clone().with_lr(0.0).validate().is_err());
        assert!(base.clone().with_lr(f32::NAN).validate().is_err());

        let mut m = base.clone();
        m.momentum = 1.0;
        assert!(m.validate().is_err());

        let mut empty = base;
        empty.run_name.clear();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn per_worker_batch_splits_the_global_batch() {
        let cfg = TrainConfig::new(Variant::Mlp, "run").with_global_batch(nz(512));

        assert_eq!(cfg.per_worker_batch(nz(4)).unwrap().get(), 128);
        // Integer division, remainder dropped.
        assert_eq!(cfg.per_worker_batch(nz(3)).unwrap().get(), 170);
        assert!(
            TrainConfig::new(Variant::Mlp, "run")
                .with_global_batch(nz(2))
                .per_worker_batch(nz(3))
                .is_err()
        );
    }

    #[test]
    fn schedule_ceiling_is_the_last_instrumented_step() {
        let mut cfg = TrainConfig::new(Variant::Mlp, "run");
        assert_eq!(cfg.schedule().instrument_ceiling, None);

        cfg.instrument_steps = BTreeSet::from([10, 1000]);
        assert_eq!(cfg.schedule().instrument_ceiling, Some(1000));
    }

    #[test]
    fn artifact_paths_follow_the_run_layout() {
        let mut cfg = TrainConfig::new(Variant::Linear, "exp7").with_out_dir("/tmp/results");
        cfg.experiment = "sweeps".to_string();

        assert_eq!(cfg.run_dir(), PathBuf::from("/tmp/results/sweeps"));
        assert_eq!(
            cfg.checkpoint_path(),
            PathBuf::from("/tmp/results/checkpoints/exp7.st")
        );
        assert_eq!(cfg.grads_dir(), PathBuf::from("/tmp/results/grads"));
    }
}
