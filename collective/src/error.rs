use std::{error::Error, fmt, io, time::Duration};

/// The collective module's result type.
pub type Result<T> = std::result::Result<T, GroupErr>;

/// Process-group bring-up and collective-call failures.
#[derive(Debug)]
pub enum GroupErr {
    InvalidConfig(String),
    JoinTimeout {
        rank: usize,
        waited: Duration,
    },
    WorkerPanicked {
        detail: String,
    },
    SizeMismatch {
        rank: usize,
        got: usize,
        expected: usize,
    },
}

impl fmt::Display for GroupErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupErr::InvalidConfig(msg) => write!(f, "invalid group config: {msg}"),
            GroupErr::JoinTimeout { rank, waited } => {
                write!(f, "rank {rank} did not join within {waited:?}")
            }
            GroupErr::WorkerPanicked { detail } => write!(f, "worker task panicked: {detail}"),
            GroupErr::SizeMismatch {
                rank,
                got,
                expected,
            } => write!(
                f,
                "all-reduce size mismatch at rank {rank}: got {got}, expected {expected}"
            ),
        }
    }
}

impl Error for GroupErr {}

/// Boundary conversion for binaries / I/O APIs.
impl From<GroupErr> for io::Error {
    fn from(value: GroupErr) -> Self {
        match value {
            GroupErr::JoinTimeout { .. } => io::Error::new(io::ErrorKind::TimedOut, value),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
