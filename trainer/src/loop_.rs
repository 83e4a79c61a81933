use std::{num::NonZeroUsize, sync::Arc};

use rand::Rng;

use collective::Collective;
use ml::{
    CrossEntropy, LabeledDataset, LrSchedule, Model, OneCycle, Optimizer, Sequential, Sgd,
    StepDecay, Variant,
};

use crate::{
    checkpoint::{self, CheckpointRecord},
    config::TrainConfig,
    data::ShardLoader,
    determinism::{Determinism, RngStream},
    error::{Result, TrainErr},
    eval,
    events::{METRIC_LOSS, METRIC_TEST_ACC, METRIC_TRAIN_ACC, MetricLog, RunLogs},
    instrument::GradTap,
    metrics::WorkerMetrics,
    partition::Partition,
    step::Replica,
};

/// The one rank that writes artifacts: metric logs, checkpoints, gradient
/// snapshots. Parameters are identical on every rank at epoch boundaries,
/// so any single rank's state stands in for the group's.
pub const WRITER_RANK: usize = 0;

/// Runs the full (or remaining, when resuming) training trajectory for one
/// rank of `group`.
///
/// Every rank of the group must call this with the same `cfg`, `det` and
/// datasets; the loop's branch structure is a pure function of those, which
/// is what keeps all ranks reaching every collective call together.
pub async fn run_training<C: Collective>(
    cfg: &TrainConfig,
    group: &C,
    det: Determinism,
    train_set: Arc<LabeledDataset>,
    test_set: Arc<LabeledDataset>,
) -> Result<WorkerMetrics> {
    cfg.validate()?;

    let world = NonZeroUsize::new(group.world_size())
        .ok_or_else(|| TrainErr::InvalidConfig("world size is zero".to_string()))?;
    let batch = cfg.per_worker_batch(world)?;

    let partition = Partition::new(train_set.len(), group.rank(), world, det, cfg.shuffle)?;
    let steps_per_epoch = partition.steps_per_epoch(batch);
    if steps_per_epoch == 0 {
        return Err(TrainErr::InvalidConfig(format!(
            "dataset of {} samples leaves some of {world} workers without a batch",
            train_set.len()
        )));
    }

    let model = Sequential::build(cfg.variant, train_set.input_dim(), train_set.classes());
    // Same stream, same seed: every rank samples identical initial weights.
    let params = model.init_params(&mut det.rng(RngStream::ModelInit));
    let size = model.size();
    let optimizer = Sgd::new(cfg.lr, cfg.momentum, cfg.weight_decay, size);

    let total_steps = (cfg.epochs.get() * steps_per_epoch) as u64;
    match cfg.variant {
        Variant::Mlp => {
            let replica = Replica::new(model, params, optimizer, OneCycle::new(cfg.lr, total_steps));
            run_segment(cfg, group, det, train_set, test_set, partition, batch, replica).await
        }
        Variant::Linear => {
            let replica = Replica::new(model, params, optimizer, StepDecay::new(cfg.lr, 0.1, 30));
            run_segment(cfg, group, det, train_set, test_set, partition, batch, replica).await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_segment<C: Collective, S: LrSchedule>(
    cfg: &TrainConfig,
    group: &C,
    det: Determinism,
    train_set: Arc<LabeledDataset>,
    test_set: Arc<LabeledDataset>,
    partition: Partition,
    batch: NonZeroUsize,
    mut replica: Replica<Sequential, Sgd, S>,
) -> Result<WorkerMetrics> {
    let rank = group.rank();
    let writer = rank == WRITER_RANK;
    let schedule = cfg.schedule();
    let steps_per_epoch = partition.steps_per_epoch(batch);

    // Restore before anything observes model state.
    let mut restored = 0usize;
    if let Some(path) = &cfg.resume_from {
        let record = checkpoint::load(path, &replica.model.layout(), replica.model.size(), group.device())?;
        replica.params = record.params;
        replica.optimizer.load_state_dict(record.optimizer)?;
        replica.scheduler.load_state_dict(record.scheduler)?;
        restored = record.epoch;

        log::info!(rank = rank, epoch = restored; "resumed from checkpoint");
    }

    let remaining = cfg.epochs.get().saturating_sub(restored);
    if remaining == 0 && writer {
        log::warn!(restored = restored, configured = cfg.epochs.get(); "nothing left to train");
    }

    // Writer-only artifacts. The gating predicates above stay rank-free;
    // only the sinks are rank-gated.
    let mut logs: Option<RunLogs> = if writer {
        Some(RunLogs::create(&cfg.run_dir(), &cfg.run_name)?)
    } else {
        None
    };
    let tap: Option<GradTap> = if writer && !cfg.instrument_steps.is_empty() {
        Some(GradTap::new(
            cfg.instrument_steps.clone(),
            cfg.grads_dir(),
            cfg.run_name.clone(),
        ))
    } else {
        None
    };

    // Held-out set plus a seeded same-size training subset, evaluated
    // together so the gap between them is visible in the logs.
    let mut test_loader = ShardLoader::new(Arc::clone(&test_set), (0..test_set.len()).collect(), batch.get());
    let mut train_eval_loader = {
        let mut rng = det.rng(RngStream::EvalSubset);
        let subset: Vec<usize> = (0..test_set.len())
            .map(|_| rng.random_range(0..train_set.len()))
            .collect();
        ShardLoader::new(Arc::clone(&train_set), subset, batch.get())
    };

    let mut loader = ShardLoader::new(Arc::clone(&train_set), Vec::new(), batch.get());
    let mut metrics = WorkerMetrics::default();
    let mut step_counter: u64 = 0;

    replica.model.set_training(true);

    'training: for epoch in 0..remaining {
        // Shuffle salt uses the absolute epoch so a resumed run sees the
        // same orders the uninterrupted run would.
        loader.reindex(partition.indices(restored + epoch));

        let mut epoch_loss = 0.0f64;

        for s in 0..steps_per_epoch {
            let minibatch = loader.next_batch().ok_or(TrainErr::ShardExhausted {
                rank,
                epoch,
                step: s,
            })?;

            let step = step_counter;
            let out = replica
                .train_step(&CrossEntropy::new(), &minibatch, group, tap.as_ref(), step)
                .await?;

            step_counter += 1;
            metrics.bump_step();
            metrics.add_samples(minibatch.len());
            if out.snapshot {
                metrics.grad_snapshots += 1;
            }
            epoch_loss += out.loss as f64;

            if let Some(logs) = logs.as_mut() {
                logs.append(METRIC_LOSS, step, out.loss)?;
                log::debug!(epoch = restored + epoch + 1, step = step, lr = out.lr; "loss {}", out.loss);
            }

            // step_counter now names the next step; past the ceiling the
            // remaining trajectory has no observational value. Same value
            // on every rank, so the group leaves together.
            if schedule.past_ceiling(step_counter) {
                if writer {
                    log::info!(step = step_counter; "last instrumented step captured, stopping");
                }
                break 'training;
            }
        }

        replica.end_epoch();
        metrics.bump_epoch();
        let absolute = restored + epoch + 1;

        if writer {
            log::info!(
                rank = rank,
                epoch = absolute,
                mean_loss = epoch_loss / steps_per_epoch as f64;
                "epoch complete"
            );
        }

        // Gating is local-epoch based; a resumed stage samples accuracy on
        // its own cadence, as the stage scripts do.
        if schedule.should_evaluate(epoch) && writer {
            let train_acc = eval::evaluate(&mut replica.model, &replica.params, &mut train_eval_loader)?;
            let test_acc = eval::evaluate(&mut replica.model, &replica.params, &mut test_loader)?;
            metrics.evals += 1;

            if let Some(logs) = logs.as_mut() {
                logs.append(METRIC_TRAIN_ACC, step_counter, train_acc)?;
                logs.append(METRIC_TEST_ACC, step_counter, test_acc)?;
            }
            log::info!(epoch = absolute, train_acc = train_acc, test_acc = test_acc; "accuracy sample");
        }

        if schedule.should_checkpoint(epoch) && writer {
            let record = CheckpointRecord {
                epoch: absolute,
                params: replica.params.clone(),
                optimizer: replica.optimizer.state_dict(),
                scheduler: replica.scheduler.state_dict(),
                device: group.device(),
            };
            checkpoint::save(&record, &replica.model.layout(), &cfg.checkpoint_path())?;
            metrics.checkpoints += 1;

            log::info!(epoch = absolute, path = cfg.checkpoint_path().display().to_string(); "checkpoint saved");
        }

        if schedule.stage_ends(epoch) {
            if writer {
                log::info!(epoch = absolute; "stage boundary reached");
            }
            break 'training;
        }
    }

    // Ranks leave the run together; a writer still flushing artifacts is
    // not left behind by its peers tearing down the group.
    group.barrier().await;

    Ok(metrics)
}
