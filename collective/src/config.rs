use std::{
    net::{Ipv4Addr, SocketAddr},
    num::NonZeroUsize,
    time::Duration,
};

use crate::error::{GroupErr, Result};

/// Default rendezvous endpoint, kept on the loopback interface.
pub const DEFAULT_RENDEZVOUS_PORT: u16 = 2023;

/// Names the collective-communication backend behind the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-process barrier-backed backend (one task per rank).
    Local,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::Local => "local",
        }
    }
}

/// Immutable rendezvous configuration for a process group.
///
/// Carried explicitly instead of living in process environment variables so
/// that every rank sees the exact same bring-up parameters.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    pub backend: Backend,
    pub rendezvous: SocketAddr,
    pub world_size: NonZeroUsize,
    pub join_timeout: Duration,
}

impl GroupConfig {
    /// Creates a group configuration with the default rendezvous endpoint
    /// and a 30 second join timeout.
    ///
    /// # Args
    /// * `backend` - The collective backend to rendezvous on.
    /// * `world_size` - The number of ranks that must join.
    pub fn new(backend: Backend, world_size: NonZeroUsize) -> Self {
        Self {
            backend,
            rendezvous: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_RENDEZVOUS_PORT)),
            world_size,
            join_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_rendezvous(mut self, rendezvous: SocketAddr) -> Self {
        self.rendezvous = rendezvous;
        self
    }

    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }

    /// Rejects configurations no group could ever be built from.
    pub fn validate(&self) -> Result<()> {
        if self.join_timeout.is_zero() {
            return Err(GroupErr::InvalidConfig(
                "join timeout must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
