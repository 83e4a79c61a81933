//! Process-group bring-up and the collective-communication seam.
//!
//! The transport behind [`Collective`] is pluggable; the crate ships
//! [`LocalGroup`], a barrier-backed in-process backend used by the
//! single-host launcher and by tests.

mod bootstrap;
mod config;
mod device;
mod error;
mod group;
mod reduction;

pub use bootstrap::bootstrap;
pub use config::{Backend, DEFAULT_RENDEZVOUS_PORT, GroupConfig};
pub use device::Device;
pub use error::{GroupErr, Result};
pub use group::{Collective, LocalGroup};
pub use reduction::{pin_reduction_order, reduction_order_pinned};
