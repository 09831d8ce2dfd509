use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// The backend could not answer, even after the skip-unavailable retry.
    #[error("{command} failed: {reason}")]
    Unavailable { command: String, reason: String },
    #[error("`{0}` timed out")]
    Timeout(String),
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("operation {0} is not supported by this package manager")]
    Unsupported(&'static str),
}

impl AdapterError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
