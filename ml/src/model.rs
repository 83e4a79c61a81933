use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::{
    init,
    layer::{ActFn, DenseLayer},
};

/// Which of the two classifier variants to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Dense net with a hidden layer; pairs with a per-step schedule.
    Mlp,
    /// Softmax regression; pairs with a per-epoch schedule.
    Linear,
}

/// Describes one named tensor inside the flat parameter buffer, in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub offset: usize,
    pub len: usize,
    /// `(rows, cols)` for weights, `(len, 1)` for biases.
    pub shape: (usize, usize),
}

/// A classifier over a flat parameter buffer.
pub trait Model {
    /// Total number of trainable scalars.
    fn size(&self) -> usize;

    /// Named tensors of the flat buffer, in declaration order.
    fn layout(&self) -> Vec<ParamSpec>;

    /// Computes logits for a batch of feature rows.
    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Array2<f32>;

    /// Backpropagates `d_logits` through the cached forward pass, writing
    /// parameter gradients into `grad` (declaration order).
    fn backward(&mut self, params: &[f32], grad: &mut [f32], d_logits: Array2<f32>);

    fn set_training(&mut self, on: bool);

    fn is_training(&self) -> bool;
}

/// Stack of dense layers evaluated in order.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<DenseLayer>,
    size: usize,
    training: bool,
}

impl Sequential {
    pub fn new(layers: Vec<DenseLayer>) -> Self {
        let size = layers.iter().map(DenseLayer::size).sum();
        Self {
            layers,
            size,
            training: true,
        }
    }

    /// Builds one of the two supported classifier variants.
    pub fn build(variant: Variant, input_dim: usize, classes: usize) -> Self {
        match variant {
            Variant::Mlp => Self::new(vec![
                DenseLayer::new("fc1", input_dim, 128, Some(ActFn::Relu)),
                DenseLayer::new("fc2", 128, 64, Some(ActFn::Relu)),
                DenseLayer::new("head", 64, classes, None),
            ]),
            Variant::Linear => Self::new(vec![DenseLayer::new(
                "head",
                input_dim,
                classes,
                None,
            )]),
        }
    }

    /// Samples a fresh flat parameter buffer for this model.
    pub fn init_params<R: Rng>(&self, rng: &mut R) -> Vec<f32> {
        init::init_params(&self.layout(), self.size, rng)
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.size
    }

    fn layout(&self) -> Vec<ParamSpec> {
        let mut specs = Vec::with_capacity(self.layers.len() * 2);
        let mut offset = 0;

        for layer in &self.layers {
            let weight_len = layer.in_dim() * layer.out_dim();
            specs.push(ParamSpec {
                name: format!("{}.weight", layer.name()),
                offset,
                len: weight_len,
                shape: (layer.in_dim(), layer.out_dim()),
            });
            offset += weight_len;

            specs.push(ParamSpec {
                name: format!("{}.bias", layer.name()),
                offset,
                len: layer.out_dim(),
                shape: (layer.out_dim(), 1),
            });
            offset += layer.out_dim();
        }

        specs
    }

    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Array2<f32> {
        debug_assert_eq!(params.len(), self.size);

        let mut offset = 0;
        let mut out = x.to_owned();

        for layer in &mut self.layers {
            let end = offset + layer.size();
            out = layer.forward(&params[offset..end], out.view());
            offset = end;
        }

        out
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], d_logits: Array2<f32>) {
        debug_assert_eq!(grad.len(), self.size);

        let mut end = self.size;
        let mut d = d_logits;

        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d);
            end = start;
        }
    }

    fn set_training(&mut self, on: bool) {
        self.training = on;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}
