use ndarray::{Array2, Axis};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Normal;

use crate::error::{MlErr, Result};

/// In-memory labeled dataset: one feature row and one class label per
/// sample. Shared read-only between workers; partitioning happens by
/// index, never by copying the data.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    features: Array2<f32>,
    labels: Vec<usize>,
    classes: usize,
}

impl LabeledDataset {
    pub fn new(features: Array2<f32>, labels: Vec<usize>, classes: usize) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(MlErr::MalformedDataset(format!(
                "{} feature rows vs {} labels",
                features.nrows(),
                labels.len()
            )));
        }

        if let Some(&bad) = labels.iter().find(|&&l| l >= classes) {
            return Err(MlErr::MalformedDataset(format!(
                "label {bad} out of range for {classes} classes"
            )));
        }

        Ok(Self {
            features,
            labels,
            classes,
        })
    }

    /// Seeded synthetic classification set: one Gaussian blob per class,
    /// samples assigned round-robin so classes stay balanced.
    ///
    /// # Errors
    /// `MalformedDataset` when `classes` or `input_dim` is zero; no model
    /// can be built over either.
    pub fn synthetic_blobs<R: Rng>(
        samples: usize,
        input_dim: usize,
        classes: usize,
        spread: f32,
        rng: &mut R,
    ) -> Result<Self> {
        if classes == 0 {
            return Err(MlErr::MalformedDataset(
                "cannot generate samples for zero classes".to_string(),
            ));
        }
        if input_dim == 0 {
            return Err(MlErr::MalformedDataset(
                "cannot generate zero-dimensional features".to_string(),
            ));
        }

        let normal = Normal::new(0.0, 1.0).expect("unit normal is well-formed");

        let centers: Array2<f32> = Array2::random_using((classes, input_dim), normal, rng) * 3.0;
        let noise: Array2<f32> = Array2::random_using((samples, input_dim), normal, rng) * spread;

        let labels: Vec<usize> = (0..samples).map(|i| i % classes).collect();

        let mut features = noise;
        for (mut row, &label) in features.rows_mut().into_iter().zip(&labels) {
            row += &centers.row(label);
        }

        Ok(Self {
            features,
            labels,
            classes,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.features.ncols()
    }

    #[inline]
    pub fn classes(&self) -> usize {
        self.classes
    }

    #[inline]
    pub fn label(&self, index: usize) -> usize {
        self.labels[index]
    }

    /// Copies the given rows into a batch.
    pub fn gather(&self, indices: &[usize]) -> (Array2<f32>, Vec<usize>) {
        let xs = self.features.select(Axis(0), indices);
        let ys = indices.iter().map(|&i| self.labels[i]).collect();
        (xs, ys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn rejects_row_label_mismatch() {
        let out = LabeledDataset::new(array![[1.0], [2.0]], vec![0], 2);
        assert!(matches!(out, Err(MlErr::MalformedDataset(_))));
    }

    #[test]
    fn rejects_out_of_range_labels() {
        let out = LabeledDataset::new(array![[1.0]], vec![5], 2);
        assert!(matches!(out, Err(MlErr::MalformedDataset(_))));
    }

    #[test]
    fn synthetic_blobs_are_balanced_and_seeded() {
        let mut rng = StdRng::seed_from_u64(3);
        let ds = LabeledDataset::synthetic_blobs(10, 4, 2, 0.1, &mut rng).unwrap();

        assert_eq!(ds.len(), 10);
        assert_eq!(ds.input_dim(), 4);
        assert_eq!((0..10).filter(|&i| ds.label(i) == 0).count(), 5);

        let mut rng2 = StdRng::seed_from_u64(3);
        let ds2 = LabeledDataset::synthetic_blobs(10, 4, 2, 0.1, &mut rng2).unwrap();
        assert_eq!(ds.features, ds2.features);
    }

    #[test]
    fn synthetic_blobs_reject_degenerate_shapes() {
        let mut rng = StdRng::seed_from_u64(4);

        let no_classes = LabeledDataset::synthetic_blobs(4, 2, 0, 0.1, &mut rng);
        assert!(matches!(no_classes, Err(MlErr::MalformedDataset(_))));

        let no_features = LabeledDataset::synthetic_blobs(4, 0, 2, 0.1, &mut rng);
        assert!(matches!(no_features, Err(MlErr::MalformedDataset(_))));
    }

    #[test]
    fn gather_pulls_rows_in_index_order() {
        let ds = LabeledDataset::new(array![[0.0], [1.0], [2.0]], vec![0, 1, 0], 2).unwrap();

        let (xs, ys) = ds.gather(&[2, 0]);
        assert_eq!(xs, array![[2.0], [0.0]]);
        assert_eq!(ys, vec![0, 0]);
    }
}
