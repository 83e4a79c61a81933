use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MlErr, Result};

/// Serializable optimizer internals, checkpointed alongside the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerState {
    pub kind: String,
    pub lr: f32,
    /// Internal flat buffers, keyed by buffer name.
    pub buffers: BTreeMap<String, Vec<f32>>,
}

/// Updates a flat parameter buffer from a synchronized gradient.
pub trait Optimizer {
    /// Applies one update step in place.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]);

    fn lr(&self) -> f32;

    /// Learning-rate override, driven by the schedule.
    fn set_lr(&mut self, lr: f32);

    fn state_dict(&self) -> OptimizerState;

    /// # Errors
    /// `StateKindMismatch` for a foreign state dict, `StateMismatch` when a
    /// buffer length disagrees with the live parameter count.
    fn load_state_dict(&mut self, state: OptimizerState) -> Result<()>;
}

/// SGD with momentum and weight decay.
#[derive(Debug, Clone)]
pub struct Sgd {
    lr: f32,
    momentum: f32,
    weight_decay: f32,
    velocity: Vec<f32>,
}

impl Sgd {
    /// # Args
    /// * `lr` - Initial learning rate.
    /// * `momentum` - Velocity retention factor.
    /// * `weight_decay` - L2 coupling added to each gradient entry.
    /// * `num_params` - Size of the flat buffers this optimizer will see.
    pub fn new(lr: f32, momentum: f32, weight_decay: f32, num_params: usize) -> Self {
        Self {
            lr,
            momentum,
            weight_decay,
            velocity: vec![0.0; num_params],
        }
    }
}

impl Optimizer for Sgd {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) {
        debug_assert_eq!(params.len(), self.velocity.len());
        debug_assert_eq!(grad.len(), self.velocity.len());

        let Self {
            lr,
            momentum,
            weight_decay,
            ..
        } = *self;

        for ((w, &g), v) in params.iter_mut().zip(grad).zip(&mut self.velocity) {
            let g = g + weight_decay * *w;
            *v = momentum * *v + g;
            *w -= lr * *v;
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn state_dict(&self) -> OptimizerState {
        OptimizerState {
            kind: "sgd".to_string(),
            lr: self.lr,
            buffers: BTreeMap::from([("velocity".to_string(), self.velocity.clone())]),
        }
    }

    fn load_state_dict(&mut self, state: OptimizerState) -> Result<()> {
        if state.kind != "sgd" {
            return Err(MlErr::StateKindMismatch {
                got: state.kind,
                expected: "sgd",
            });
        }

        let velocity = state
            .buffers
            .get("velocity")
            .ok_or_else(|| MlErr::StateMismatch {
                name: "velocity",
                got: 0,
                expected: self.velocity.len(),
            })?;

        if velocity.len() != self.velocity.len() {
            return Err(MlErr::StateMismatch {
                name: "velocity",
                got: velocity.len(),
                expected: self.velocity.len(),
            });
        }

        self.lr = state.lr;
        self.velocity.copy_from_slice(velocity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_sgd_steps_against_the_gradient() {
        let mut opt = Sgd::new(0.1, 0.0, 0.0, 2);
        let mut params = vec![1.0, -1.0];

        opt.update_params(&mut params, &[2.0, -4.0]);
        assert_eq!(params, vec![0.8, -0.6]);
    }

    #[test]
    fn momentum_accumulates_velocity() {
        let mut opt = Sgd::new(1.0, 0.5, 0.0, 1);
        let mut params = vec![0.0];

        opt.update_params(&mut params, &[1.0]); // v = 1.0, w = -1.0
        opt.update_params(&mut params, &[1.0]); // v = 1.5, w = -2.5
        assert_eq!(params, vec![-2.5]);
    }

    #[test]
    fn state_round_trip_restores_velocity_and_lr() {
        let mut opt = Sgd::new(0.05, 0.9, 5e-4, 3);
        let mut params = vec![1.0, 2.0, 3.0];
        opt.update_params(&mut params, &[0.1, 0.2, 0.3]);

        let state = opt.state_dict();

        let mut fresh = Sgd::new(0.5, 0.9, 5e-4, 3);
        fresh.load_state_dict(state).unwrap();

        assert_eq!(fresh.lr(), 0.05);
        assert_eq!(fresh.velocity, opt.velocity);
    }

    #[test]
    fn foreign_state_dict_is_rejected() {
        let mut opt = Sgd::new(0.1, 0.9, 0.0, 2);
        let state = OptimizerState {
            kind: "adam".to_string(),
            lr: 0.1,
            buffers: BTreeMap::new(),
        };

        assert!(matches!(
            opt.load_state_dict(state),
            Err(MlErr::StateKindMismatch { .. })
        ));
    }
}
