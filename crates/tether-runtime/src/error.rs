//! Error types for the engine boundary
//!
//! Nothing unwinds across the boundary; every fallible call returns
//! `Result<T, Error>` and callers branch on `Error::kind()`.

use crate::value::{RefKey, Value, ValueKind};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A string copy or list growth could not be allocated
    #[error("allocation failed")]
    AllocationFailed,

    /// A list was asked to shrink its storage below its length
    #[error("capacity {capacity} is below the current count {count}")]
    CapacityBelowCount { capacity: usize, count: usize },

    /// An accessor was used against the wrong kind of value
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: ValueKind,
    },

    /// The reference no longer names a live engine object
    #[error("invalid reference {0}")]
    InvalidReference(RefKey),

    /// The engine rejected the operation (unknown var, bad arguments, ...)
    #[error("{0}")]
    Engine(String),

    /// The string is not present in the engine's string table
    #[error("string {0:?} is not known to the engine")]
    UnknownString(String),

    /// The main context has shut down or was never started
    #[error("engine host is not running")]
    HostUnavailable,

    /// The host was called back into while it was already servicing a call
    #[error("engine host is already servicing a call on this thread")]
    Reentrant,
}

/// Coarse classification of an `Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Allocation,
    TypeMismatch,
    InvalidReference,
    Engine,
    Host,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AllocationFailed | Error::CapacityBelowCount { .. } => ErrorKind::Allocation,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::InvalidReference(_) => ErrorKind::InvalidReference,
            Error::Engine(_) | Error::UnknownString(_) => ErrorKind::Engine,
            Error::HostUnavailable | Error::Reentrant => ErrorKind::Host,
        }
    }

    pub fn type_mismatch(expected: &'static str, found: &Value) -> Self {
        Error::TypeMismatch {
            expected,
            found: found.kind(),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Error::Engine(message.into())
    }
}
