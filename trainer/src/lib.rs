//! Distributed training-loop orchestrator.
//!
//! Ties process-group bring-up, deterministic data partitioning, the
//! synchronized gradient step and the staged checkpoint/evaluate/instrument
//! schedule into one resumable epoch loop. Model, loss, optimizer and
//! schedule internals live in the `ml` crate; the collective transport
//! lives in `collective`.

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod determinism;
pub mod error;
pub mod eval;
pub mod events;
pub mod instrument;
pub mod loop_;
pub mod metrics;
pub mod partition;
pub mod schedule;
pub mod step;

pub use config::TrainConfig;
pub use determinism::{Determinism, RngStream};
pub use error::{Result, TrainErr};
pub use loop_::{WRITER_RANK, run_training};
pub use metrics::WorkerMetrics;
pub use partition::{Partition, ShufflePolicy};
pub use schedule::StageSchedule;
