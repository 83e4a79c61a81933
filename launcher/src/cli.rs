use std::{collections::BTreeSet, num::NonZeroUsize, path::PathBuf};

use clap::{Parser, ValueEnum};

use ml::Variant;
use trainer::TrainConfig;

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ModelKind {
    /// Dense net with hidden layers, one-cycle LR per step.
    Mlp,
    /// Softmax regression, step-decay LR per epoch.
    Linear,
}

impl From<ModelKind> for Variant {
    fn from(kind: ModelKind) -> Variant {
        match kind {
            ModelKind::Mlp => Variant::Mlp,
            ModelKind::Linear => Variant::Linear,
        }
    }
}

/// Single-host launcher for a data-parallel training run.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Number of worker ranks in the process group.
    #[arg(long, default_value = "2")]
    pub workers: NonZeroUsize,

    /// Run name; prefixes every artifact file.
    #[arg(long, default_value = "run")]
    pub name: String,

    /// Experiment directory grouping related runs.
    #[arg(long, default_value = "default")]
    pub experiment: String,

    /// Output root for metrics, checkpoints and gradient snapshots.
    #[arg(long, default_value = "out")]
    pub out: PathBuf,

    #[arg(long, value_enum, default_value_t = ModelKind::Mlp)]
    pub model: ModelKind,

    /// Total epochs of the full trajectory, across resumes.
    #[arg(long, default_value = "15")]
    pub epochs: NonZeroUsize,

    /// Global batch size, split evenly among workers.
    #[arg(long, default_value = "64")]
    pub batch: NonZeroUsize,

    #[arg(long, default_value_t = 0.05)]
    pub lr: f32,

    /// Run seed; fixes init, partitioning and reduction order.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Epoch after which this stage stops (and checkpoints, if enabled).
    #[arg(long)]
    pub stage_epoch: Option<usize>,

    /// Write a checkpoint at the stage boundary.
    #[arg(long)]
    pub record_checkpoints: bool,

    /// Checkpoint file to restore before training.
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Global step indices to snapshot gradients at; the run stops once
    /// the last one is captured.
    #[arg(long, value_delimiter = ',')]
    pub grad_steps: Vec<u64>,

    /// Rendezvous port for the process group.
    #[arg(long, default_value_t = collective::DEFAULT_RENDEZVOUS_PORT)]
    pub port: u16,

    /// Synthetic training samples to generate.
    #[arg(long, default_value_t = 4096)]
    pub samples: usize,

    /// Synthetic held-out samples to generate.
    #[arg(long, default_value_t = 512)]
    pub test_samples: usize,

    /// Feature dimensionality of the synthetic data; must be positive.
    #[arg(long, default_value = "32")]
    pub input_dim: NonZeroUsize,

    /// Number of classes in the synthetic data; must be positive.
    #[arg(long, default_value = "10")]
    pub classes: NonZeroUsize,
}

impl Args {
    pub fn train_config(&self) -> TrainConfig {
        let mut cfg = TrainConfig::new(self.model.into(), self.name.clone())
            .with_epochs(self.epochs)
            .with_global_batch(self.batch)
            .with_lr(self.lr)
            .with_out_dir(self.out.clone());

        cfg.experiment = self.experiment.clone();
        cfg.stage_boundary = self.stage_epoch;
        cfg.record_checkpoints = self.record_checkpoints;
        cfg.resume_from = self.resume.clone();
        cfg.instrument_steps = BTreeSet::from_iter(self.grad_steps.iter().copied());
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let args = Args::parse_from(["launcher"]);
        assert_eq!(args.workers.get(), 2);
        assert_eq!(args.name, "run");

        let cfg = args.train_config();
        assert_eq!(cfg.epochs.get(), 15);
        assert!(cfg.instrument_steps.is_empty());
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_sized_data_shapes_are_rejected_at_parse_time() {
        assert!(Args::try_parse_from(["launcher", "--classes", "0"]).is_err());
        assert!(Args::try_parse_from(["launcher", "--input-dim", "0"]).is_err());
        assert!(Args::try_parse_from(["launcher", "--classes", "3"]).is_ok());
    }

    #[test]
    fn grad_steps_accept_a_comma_list() {
        let args = Args::parse_from(["launcher", "--grad-steps", "10,1000"]);
        let cfg = args.train_config();
        assert_eq!(cfg.instrument_steps, BTreeSet::from([10, 1000]));
    }

    #[test]
    fn stage_flags_flow_into_the_config() {
        let args = Args::parse_from([
            "launcher",
            "--model",
            "linear",
            "--stage-epoch",
            "30",
            "--record-checkpoints",
            "--name",
            "stage1",
        ]);
        let cfg = args.train_config();

        assert_eq!(cfg.variant, Variant::Linear);
        assert_eq!(cfg.stage_boundary, Some(30));
        assert!(cfg.record_checkpoints);
        assert!(cfg.checkpoint_path().ends_with("checkpoints/stage1.st"));
    }
}
