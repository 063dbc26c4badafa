use crate::error::ConfigurationError;
use crate::stations::error::LocateStationError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("No complete forecast for '{poi}' ({horizon}) within {attempts} runs")]
    ExhaustedRetries {
        poi: String,
        horizon: String,
        attempts: u32,
    },

    #[error("No station near point of interest '{0}'")]
    NoStation(String),

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to write cache entry '{0}'")]
    CacheWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to read cache entry '{0}'")]
    CacheRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode forecast document")]
    CacheEncode(#[source] serde_json::Error),

    #[error("Failed to decode cache entry '{0}'")]
    CacheDecode(PathBuf, #[source] serde_json::Error),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    LocateStation(#[from] LocateStationError),

    // Covers errors joining tokio blocking tasks
    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Refresh cancelled")]
    Cancelled,
}

impl RefreshError {
    /// Errors that make further refresh cycles pointless. Everything else only affects
    /// one point of interest and horizon.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RefreshError::CacheDirCreation(..) | RefreshError::CacheWrite(..)
        )
    }
}
