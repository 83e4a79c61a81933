//! Commodity ML capabilities consumed by the training core: flat-parameter
//! dense models, softmax cross-entropy, SGD with momentum, learning-rate
//! schedules and in-memory labeled datasets.
//!
//! Parameters and gradients live in flat `f32` buffers; layers view their
//! slice of the buffer. This keeps gradient synchronization, checkpointing
//! and instrumentation a matter of shipping one contiguous vector around.

pub mod dataset;
pub mod error;
pub mod init;
pub mod layer;
pub mod loss;
pub mod model;
pub mod optim;
pub mod sched;

pub use dataset::LabeledDataset;
pub use error::{MlErr, Result};
pub use layer::{ActFn, DenseLayer};
pub use loss::{CrossEntropy, LossFn, argmax_rows};
pub use model::{Model, ParamSpec, Sequential, Variant};
pub use optim::{Optimizer, OptimizerState, Sgd};
pub use sched::{Cadence, LrSchedule, OneCycle, SchedState, StepDecay};
