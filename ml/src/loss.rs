use ndarray::{Array2, ArrayView2, Axis};

/// Differentiable loss over a batch of logits.
pub trait LossFn {
    /// Mean loss over the batch.
    fn loss(&self, logits: ArrayView2<f32>, labels: &[usize]) -> f32;

    /// Gradient of the mean loss w.r.t. the logits.
    fn loss_prime(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Array2<f32>;
}

/// Softmax cross-entropy.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    pub fn new() -> Self {
        Self
    }

    /// Row-wise softmax with max subtraction for stability.
    fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
        let mut probs = logits.to_owned();

        for mut row in probs.rows_mut() {
            let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }

        probs
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, logits: ArrayView2<f32>, labels: &[usize]) -> f32 {
        debug_assert_eq!(logits.nrows(), labels.len());

        let probs = Self::softmax(logits);
        let batch = labels.len() as f32;

        labels
            .iter()
            .enumerate()
            .map(|(row, &label)| -probs[(row, label)].max(f32::MIN_POSITIVE).ln())
            .sum::<f32>()
            / batch
    }

    fn loss_prime(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Array2<f32> {
        debug_assert_eq!(logits.nrows(), labels.len());

        let mut d = Self::softmax(logits);
        let batch = labels.len() as f32;

        for (row, &label) in labels.iter().enumerate() {
            d[(row, label)] -= 1.0;
        }
        d.mapv_inplace(|v| v / batch);
        d
    }
}

/// Top-1 prediction per row.
pub fn argmax_rows(logits: ArrayView2<f32>) -> Vec<usize> {
    logits
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap_or(0)
        })
        .collect()
}
