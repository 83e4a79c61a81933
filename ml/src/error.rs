use std::{error::Error, fmt};

/// The ml crate's result type.
pub type Result<T> = std::result::Result<T, MlErr>;

#[derive(Debug)]
pub enum MlErr {
    /// A restored state buffer does not match the live component.
    StateMismatch {
        name: &'static str,
        got: usize,
        expected: usize,
    },
    /// A restored state dict belongs to a different component kind.
    StateKindMismatch {
        got: String,
        expected: &'static str,
    },
    /// Dataset rows and labels disagree, or a label is out of range.
    MalformedDataset(String),
}

impl fmt::Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::StateMismatch {
                name,
                got,
                expected,
            } => write!(
                f,
                "state buffer {name} length mismatch: got {got}, expected {expected}"
            ),
            MlErr::StateKindMismatch { got, expected } => {
                write!(f, "state dict kind mismatch: got {got}, expected {expected}")
            }
            MlErr::MalformedDataset(msg) => write!(f, "malformed dataset: {msg}"),
        }
    }
}

impl Error for MlErr {}
