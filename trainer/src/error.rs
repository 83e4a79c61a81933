use std::{error::Error, fmt, io, path::PathBuf};

use collective::GroupErr;
use ml::MlErr;

/// The trainer module's result type.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// Training-run failures. None of these are locally recoverable: the run
/// aborts as a whole and resumes from the last checkpoint.
#[derive(Debug)]
pub enum TrainErr {
    Io(io::Error),
    Group(GroupErr),
    State(MlErr),
    InvalidConfig(String),
    /// The process seed is a one-way switch; a second value is refused.
    SeedAlreadyFixed {
        current: u64,
        requested: u64,
    },
    /// An evaluation dataloader produced no samples.
    EmptyEvalSet,
    /// A rank ran out of batches before the agreed step count.
    ShardExhausted {
        rank: usize,
        epoch: usize,
        step: usize,
    },
    /// A checkpoint file is missing, unreadable or malformed. Fatal:
    /// resuming with wrong state silently corrupts the trajectory.
    Checkpoint {
        path: PathBuf,
        detail: String,
    },
}

impl fmt::Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Io(e) => write!(f, "io error: {e}"),
            TrainErr::Group(e) => write!(f, "collective error: {e}"),
            TrainErr::State(e) => write!(f, "state error: {e}"),
            TrainErr::InvalidConfig(msg) => write!(f, "invalid training config: {msg}"),
            TrainErr::SeedAlreadyFixed { current, requested } => write!(
                f,
                "process seed already fixed to {current}, refusing reseed to {requested}"
            ),
            TrainErr::EmptyEvalSet => write!(f, "evaluation dataloader is empty"),
            TrainErr::ShardExhausted { rank, epoch, step } => write!(
                f,
                "rank {rank} exhausted its shard at epoch {epoch} step {step}"
            ),
            TrainErr::Checkpoint { path, detail } => {
                write!(f, "checkpoint {}: {detail}", path.display())
            }
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Io(e) => Some(e),
            TrainErr::Group(e) => Some(e),
            TrainErr::State(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<GroupErr> for TrainErr {
    fn from(value: GroupErr) -> Self {
        Self::Group(value)
    }
}

impl From<MlErr> for TrainErr {
    fn from(value: MlErr) -> Self {
        Self::State(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<TrainErr> for io::Error {
    fn from(value: TrainErr) -> Self {
        match value {
            TrainErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
