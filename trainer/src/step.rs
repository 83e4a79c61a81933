use collective::Collective;
use ml::{Cadence, LossFn, LrSchedule, Model, Optimizer};

use crate::{data::Batch, error::Result, instrument::GradTap};

/// What one synchronized step produced.
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    /// This rank's local batch loss (pre-averaging).
    pub loss: f32,
    /// Learning rate in effect for the next step.
    pub lr: f32,
    /// Whether the gradient tap fired on this step.
    pub snapshot: bool,
}

/// One rank's full training state: the model replica, its flat parameter
/// and gradient buffers, and the optimizer/schedule pair driving updates.
///
/// All ranks hold byte-identical parameters at every step boundary; the
/// all-reduce inside [`Replica::train_step`] is what keeps them that way.
pub struct Replica<M, O, S> {
    pub model: M,
    pub params: Vec<f32>,
    grads: Vec<f32>,
    pub optimizer: O,
    pub scheduler: S,
}

impl<M: Model, O: Optimizer, S: LrSchedule> Replica<M, O, S> {
    pub fn new(model: M, params: Vec<f32>, optimizer: O, scheduler: S) -> Self {
        let size = model.size();
        debug_assert_eq!(params.len(), size);

        Self {
            model,
            params,
            grads: vec![0.0; size],
            optimizer,
            scheduler,
        }
    }

    /// Runs one synchronized training step on `batch`.
    ///
    /// Forward, loss, backward, then an all-reduce replaces the local
    /// gradient with the element-wise mean across all ranks before the
    /// optimizer applies it. The tap (if any) observes the synchronized
    /// gradient, after backward and before the update. Per-step schedules
    /// advance here; per-epoch schedules wait for [`Replica::end_epoch`].
    ///
    /// Blocks until every rank of `group` reaches its own `train_step`
    /// call for the same step index.
    pub async fn train_step<C: Collective>(
        &mut self,
        loss_fn: &impl LossFn,
        batch: &Batch,
        group: &C,
        tap: Option<&GradTap>,
        step: u64,
    ) -> Result<StepOutcome> {
        let logits = self.model.forward(&self.params, batch.xs.view());
        let loss = loss_fn.loss(logits.view(), &batch.ys);
        let d_logits = loss_fn.loss_prime(logits.view(), &batch.ys);

        self.grads.fill(0.0);
        self.model.backward(&self.params, &mut self.grads, d_logits);

        group.all_reduce_mean(&mut self.grads).await?;

        let snapshot = match tap {
            Some(tap) => tap.maybe_capture(step, &self.grads)?,
            None => false,
        };

        self.optimizer.update_params(&mut self.params, &self.grads);

        if self.scheduler.cadence() == Cadence::PerStep {
            let lr = self.scheduler.advance();
            self.optimizer.set_lr(lr);
        }

        Ok(StepOutcome {
            loss,
            lr: self.optimizer.lr(),
            snapshot,
        })
    }

    /// Epoch-boundary bookkeeping: advances per-epoch schedules.
    pub fn end_epoch(&mut self) {
        if self.scheduler.cadence() == Cadence::PerEpoch {
            let lr = self.scheduler.advance();
            self.optimizer.set_lr(lr);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use ndarray::array;
    use tokio::task::JoinSet;

    use collective::LocalGroup;
    use ml::{CrossEntropy, OneCycle, Sequential, Sgd, StepDecay, Variant};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn separable_batch(flip: bool) -> Batch {
        let sign = if flip { -1.0 } else { 1.0 };
        Batch {
            xs: array![[sign * 2.0], [sign * -2.0]],
            ys: if flip { vec![0, 1] } else { vec![1, 0] },
        }
    }

    fn solo_replica(seed: u64) -> Replica<Sequential, Sgd, OneCycle> {
        let model = Sequential::build(Variant::Linear, 1, 2);
        let params = model.init_params(&mut StdRng::seed_from_u64(seed));
        let size = model.size();

        Replica::new(
            model,
            params,
            Sgd::new(0.1, 0.9, 0.0, size),
            OneCycle::new(0.1, 100),
        )
    }

    #[tokio::test]
    async fn loss_decreases_on_a_separable_problem() {
        let world = NonZeroUsize::new(1).unwrap();
        let group = LocalGroup::create(world).remove(0);
        let mut replica = solo_replica(5);
        let loss_fn = CrossEntropy::new();
        let batch = separable_batch(false);

        let first = replica
            .train_step(&loss_fn, &batch, &group, None, 0)
            .await
            .unwrap();
        let mut last = first;
        for step in 1..30 {
            last = replica
                .train_step(&loss_fn, &batch, &group, None, step)
                .await
                .unwrap();
        }

        assert!(last.loss < first.loss, "{} !< {}", last.loss, first.loss);
    }

    #[tokio::test]
    async fn ranks_stay_parameter_identical_across_steps() {
        let world = NonZeroUsize::new(2).unwrap();
        let mut set = JoinSet::new();

        for group in LocalGroup::create(world) {
            set.spawn(async move {
                let mut replica = solo_replica(9); // same seed on both ranks
                let loss_fn = CrossEntropy::new();
                // Each rank trains on different data.
                let batch = separable_batch(group.rank() == 1);

                for step in 0..5 {
                    replica
                        .train_step(&loss_fn, &batch, &group, None, step)
                        .await
                        .unwrap();
                }
                replica.params
            });
        }

        let mut results = Vec::new();
        while let Some(params) = set.join_next().await {
            results.push(params.unwrap());
        }
        assert_eq!(results[0], results[1]);
    }

    #[tokio::test]
    async fn per_step_schedule_moves_the_lr_each_step() {
        let world = NonZeroUsize::new(1).unwrap();
        let group = LocalGroup::create(world).remove(0);
        let mut replica = solo_replica(2);
        let loss_fn = CrossEntropy::new();
        let batch = separable_batch(false);

        let a = replica
            .train_step(&loss_fn, &batch, &group, None, 0)
            .await
            .unwrap();
        let b = replica
            .train_step(&loss_fn, &batch, &group, None, 1)
            .await
            .unwrap();
        assert_ne!(a.lr, b.lr, "one-cycle warmup should climb per step");
    }

    #[tokio::test]
    async fn per_epoch_schedule_only_moves_at_end_epoch() {
        let world = NonZeroUsize::new(1).unwrap();
        let group = LocalGroup::create(world).remove(0);

        let model = Sequential::build(Variant::Linear, 1, 2);
        let params = model.init_params(&mut StdRng::seed_from_u64(3));
        let size = model.size();
        let mut replica = Replica::new(
            model,
            params,
            Sgd::new(0.1, 0.0, 0.0, size),
            StepDecay::new(0.1, 0.5, 1),
        );

        let loss_fn = CrossEntropy::new();
        let batch = separable_batch(false);
        let out = replica
            .train_step(&loss_fn, &batch, &group, None, 0)
            .await
            .unwrap();
        assert_eq!(out.lr, 0.1, "per-epoch schedule must not advance per step");

        replica.end_epoch();
        assert_eq!(replica.optimizer.lr(), 0.05);
    }
}
