//! CPU sampling error types.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors raised while reading CPU accounting data.
///
/// These never reach request paths: the sampler logs them and skips the tick.
#[derive(Debug)]
pub enum SamplerError {
    /// Reading an accounting file failed.
    Io { path: PathBuf, source: io::Error },
    /// An accounting file had unexpected content.
    Parse { path: PathBuf, value: String },
    /// No CPU accounting source is available on this platform.
    Unsupported,
}

impl SamplerError {
    pub(crate) fn parse(path: impl Into<PathBuf>, value: impl Into<String>) -> Self {
        SamplerError::Parse {
            path: path.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerError::Io { path, source } => {
                write!(f, "failed to read '{}': {}", path.display(), source)
            }
            SamplerError::Parse { path, value } => {
                write!(f, "failed to parse '{}' from '{}'", value, path.display())
            }
            SamplerError::Unsupported => write!(f, "cpu accounting not supported"),
        }
    }
}

impl std::error::Error for SamplerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SamplerError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type SamplerResult<T> = Result<T, SamplerError>;
