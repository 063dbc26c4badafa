use crate::error::ConfigurationError;
use polars::error::PolarsError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure to read one archive file. Scans log these and drop the file.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("No archive file at '{0}'")]
    DataUnavailable(PathBuf),

    #[error("Failed to decode '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Decoding '{path}' did not finish within {timeout:?}")]
    DecodeTimeout { path: PathBuf, timeout: Duration },

    #[error("I/O error reading '{0}'")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse table '{0}'")]
    Csv(PathBuf, #[source] PolarsError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Scan cancelled")]
    Cancelled,

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl ArchiveError {
    pub fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ArchiveError::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Maps a failed read to [`ArchiveError::DataUnavailable`] when the file is missing.
    pub(crate) fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            ArchiveError::DataUnavailable(path)
        } else {
            ArchiveError::Io(path, err)
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ArchiveError::DataUnavailable(_))
    }
}
