use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{MlErr, Result};

/// How often a schedule advances: once per training step, or once per epoch.
/// A policy of the model variant, not a universal rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    PerStep,
    PerEpoch,
}

/// Serializable schedule position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedState {
    pub kind: String,
    pub ticks: u64,
}

/// Learning-rate schedule advanced by the training loop.
pub trait LrSchedule {
    fn cadence(&self) -> Cadence;

    /// Advances one tick and returns the learning rate to apply next.
    fn advance(&mut self) -> f32;

    fn state_dict(&self) -> SchedState;

    /// # Errors
    /// `StateKindMismatch` when the state dict names a different schedule.
    fn load_state_dict(&mut self, state: SchedState) -> Result<()>;
}

/// One-cycle policy: linear warmup to `max_lr`, cosine anneal back down.
/// Advances per step.
#[derive(Debug, Clone)]
pub struct OneCycle {
    max_lr: f32,
    total_steps: u64,
    warmup_frac: f32,
    ticks: u64,
}

impl OneCycle {
    pub fn new(max_lr: f32, total_steps: u64) -> Self {
        Self {
            max_lr,
            total_steps: total_steps.max(1),
            warmup_frac: 0.3,
            ticks: 0,
        }
    }
}

impl LrSchedule for OneCycle {
    fn cadence(&self) -> Cadence {
        Cadence::PerStep
    }

    fn advance(&mut self) -> f32 {
        self.ticks = (self.ticks + 1).min(self.total_steps);
        let frac = self.ticks as f32 / self.total_steps as f32;

        if frac < self.warmup_frac {
            self.max_lr * frac / self.warmup_frac
        } else {
            let anneal = (frac - self.warmup_frac) / (1.0 - self.warmup_frac);
            self.max_lr * 0.5 * (1.0 + (PI * anneal).cos())
        }
    }

    fn state_dict(&self) -> SchedState {
        SchedState {
            kind: "one_cycle".to_string(),
            ticks: self.ticks,
        }
    }

    fn load_state_dict(&mut self, state: SchedState) -> Result<()> {
        if state.kind != "one_cycle" {
            return Err(MlErr::StateKindMismatch {
                got: state.kind,
                expected: "one_cycle",
            });
        }

        self.ticks = state.ticks;
        Ok(())
    }
}

/// Step decay: multiplies the base rate by `gamma` every `period` ticks.
/// Advances per epoch.
#[derive(Debug, Clone)]
pub struct StepDecay {
    base_lr: f32,
    gamma: f32,
    period: u64,
    ticks: u64,
}

impl StepDecay {
    pub fn new(base_lr: f32, gamma: f32, period: u64) -> Self {
        Self {
            base_lr,
            gamma,
            period: period.max(1),
            ticks: 0,
        }
    }
}

impl LrSchedule for StepDecay {
    fn cadence(&self) -> Cadence {
        Cadence::PerEpoch
    }

    fn advance(&mut self) -> f32 {
        self.ticks += 1;
        self.base_lr * self.gamma.powi((self.ticks / self.period) as i32)
    }

    fn state_dict(&self) -> SchedState {
        SchedState {
            kind: "step_decay".to_string(),
            ticks: self.ticks,
        }
    }

    fn load_state_dict(&mut self, state: SchedState) -> Result<()> {
        if state.kind != "step_decay" {
            return Err(MlErr::StateKindMismatch {
                got: state.kind,
                expected: "step_decay",
            });
        }

        self.ticks = state.ticks;
        Ok(())
    }
}
