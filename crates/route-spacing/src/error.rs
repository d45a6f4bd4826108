use thiserror::Error;

/// Geometry and configuration errors. The engine recovers from all of these
/// by degrading; they only escape from the standalone helpers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid polyline character {character:?} at position {position}")]
    InvalidCharacter { character: char, position: usize },

    #[error("polyline truncated at position {0}")]
    Truncated(usize),

    #[error("polyline value overflows at position {0}")]
    Overflow(usize),

    #[error("polyline point {0} is outside valid coordinate range")]
    OutOfRange(usize),

    #[error("invalid spacing thresholds: {0}")]
    Thresholds(String),
}

pub type Result<T> = std::result::Result<T, Error>;
