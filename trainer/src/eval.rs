use std::ops::{Deref, DerefMut};

use ml::{Model, argmax_rows};

use crate::{
    data::ShardLoader,
    error::{Result, TrainErr},
};

/// Puts the model in inference mode and restores the previous mode on drop,
/// so early returns and errors inside an evaluation cannot leak eval mode
/// into the training loop.
struct EvalModeGuard<'a, M: Model> {
    model: &'a mut M,
    was_training: bool,
}

impl<'a, M: Model> EvalModeGuard<'a, M> {
    fn new(model: &'a mut M) -> Self {
        let was_training = model.is_training();
        model.set_training(false);
        Self {
            model,
            was_training,
        }
    }
}

impl<M: Model> Drop for EvalModeGuard<'_, M> {
    fn drop(&mut self) {
        self.model.set_training(self.was_training);
    }
}

impl<M: Model> Deref for EvalModeGuard<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        self.model
    }
}

impl<M: Model> DerefMut for EvalModeGuard<'_, M> {
    fn deref_mut(&mut self) -> &mut M {
        self.model
    }
}

/// Top-1 accuracy of `params` over everything behind `loader`, as a
/// percentage in `[0, 100]`.
///
/// Read-only with respect to training state: parameters are borrowed
/// immutably, no gradients or optimizer state are touched, and the
/// training-mode flag is restored on every exit path.
///
/// # Errors
/// `EmptyEvalSet` when the loader holds no samples; an accuracy over
/// nothing would silently poison downstream metrics.
pub fn evaluate<M: Model>(model: &mut M, params: &[f32], loader: &mut ShardLoader) -> Result<f32> {
    if loader.is_empty() {
        return Err(TrainErr::EmptyEvalSet);
    }

    let mut guard = EvalModeGuard::new(model);
    let mut correct = 0usize;
    let mut total = 0usize;

    loader.reset();
    while let Some(batch) = loader.next_batch() {
        let logits = guard.forward(params, batch.xs.view());
        let predicted = argmax_rows(logits.view());

        correct += predicted
            .iter()
            .zip(&batch.ys)
            .filter(|(p, y)| p == y)
            .count();
        total += batch.ys.len();
    }

    Ok(100.0 * correct as f32 / total as f32)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ndarray::array;

    use ml::{LabeledDataset, Sequential, Variant};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn loader_of(features: ndarray::Array2<f32>, labels: Vec<usize>) -> ShardLoader {
        let n = labels.len();
        let data = Arc::new(LabeledDataset::new(features, labels, 2).unwrap());
        ShardLoader::new(data, (0..n).collect(), 2)
    }

    /// A linear model whose head weights are hand-set so that class 1 wins
    /// exactly when the single feature is positive.
    fn signed_classifier() -> (Sequential, Vec<f32>) {
        let model = Sequential::build(Variant::Linear, 1, 2);
        // head.weight (1x2) = [-1, 1], head.bias = [0, 0]
        (model, vec![-1.0, 1.0, 0.0, 0.0])
    }

    #[test]
    fn counts_top1_matches_as_a_percentage() {
        let (mut model, params) = signed_classifier();
        let mut loader = loader_of(
            array![[1.0], [-2.0], [3.0], [-0.5]],
            vec![1, 0, 1, 1], // last label is wrong on purpose
        );

        let acc = evaluate(&mut model, &params, &mut loader).unwrap();
        assert_eq!(acc, 75.0);
    }

    #[test]
    fn evaluation_leaves_training_state_untouched() {
        let (mut model, params) = signed_classifier();
        let before = params.clone();
        let mut loader = loader_of(array![[1.0], [-1.0]], vec![1, 0]);

        assert!(model.is_training());
        let _ = evaluate(&mut model, &params, &mut loader).unwrap();

        assert!(model.is_training(), "train mode must be restored");
        assert_eq!(params, before, "parameters must be untouched");
    }

    #[test]
    fn mode_is_restored_even_on_error() {
        let (mut model, params) = signed_classifier();
        let mut empty = loader_of(array![[1.0]], vec![1]);
        empty.reindex(Vec::new());

        let err = evaluate(&mut model, &params, &mut empty).unwrap_err();
        assert!(matches!(err, TrainErr::EmptyEvalSet));
        assert!(model.is_training());
    }

    #[test]
    fn repeated_evaluation_is_idempotent() {
        let model = Sequential::build(Variant::Mlp, 4, 3);
        let params = model.init_params(&mut StdRng::seed_from_u64(11));
        let data = Arc::new(LabeledDataset::new(
            array![[0.1, 0.2, 0.3, 0.4], [1.0, 0.9, 0.8, 0.7], [0.0, 0.0, 1.0, 0.0]],
            vec![0, 1, 2],
            3,
        )
        .unwrap());
        let mut loader = ShardLoader::new(data, vec![0, 1, 2], 2);

        let mut model = model;
        let a = evaluate(&mut model, &params, &mut loader).unwrap();
        let b = evaluate(&mut model, &params, &mut loader).unwrap();
        assert_eq!(a, b);
    }
}
