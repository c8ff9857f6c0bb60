//! Crate-level error types.

use std::fmt;

/// Errors returned by shedders and their building blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request was shed to protect the service.
    ///
    /// Callers usually map this to `503 Service Unavailable` or gRPC
    /// `UNAVAILABLE`. It is never retried internally.
    ServiceOverloaded,

    /// A shedder or window was built with an unusable shape.
    InvalidConfig {
        /// Option that failed validation.
        field: &'static str,
        /// Human-readable reason.
        message: String,
    },
}

impl Error {
    /// Check if this is the overload sentinel.
    pub fn is_overloaded(&self) -> bool {
        matches!(self, Error::ServiceOverloaded)
    }

    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ServiceOverloaded => write!(f, "service overloaded"),
            Error::InvalidConfig { field, message } => {
                write!(f, "invalid {}: {}", field, message)
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type alias for shedder operations.
pub type Result<T> = std::result::Result<T, Error>;
