use crate::archive::error::ArchiveError;
use crate::derived::DerivedError;
use crate::refresh::error::RefreshError;
use crate::stations::error::LocateStationError;
use crate::types::archive_kind::ArchiveKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeatherArchiveError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Derived(#[from] DerivedError),

    #[error(transparent)]
    LocateStation(#[from] LocateStationError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine cache directory")]
    CacheDirResolution,
}

impl WeatherArchiveError {
    /// True when the error stems from what the caller asked for rather than from the
    /// archive, e.g. an unknown quantity or station.
    pub fn is_client_error(&self) -> bool {
        matches!(self, WeatherArchiveError::Configuration(_))
    }
}

/// A request or configuration names something that does not exist. Never defaulted.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Unknown quantity '{0}'")]
    UnknownQuantity(String),

    #[error("Unknown archive kind '{0}'")]
    UnknownArchiveKind(String),

    #[error("Unknown model run selector '{0}'")]
    UnknownRunSelector(String),

    #[error("Unknown station '{0}'")]
    UnknownStation(String),

    #[error("Request names neither a station nor coordinates")]
    MissingLocation,

    #[error("Cadence must be positive, got {0} h")]
    InvalidCadence(i64),

    #[error("Invalid reference run '{0}', expected YYYYMMDDHH")]
    InvalidRun(String),

    #[error("Archive kind '{0}' requires a run selector")]
    MissingRun(ArchiveKind),

    #[error("Timestamp {0} is outside the representable range")]
    InvalidTimestamp(i64),

    #[error("Timestamp {timestamp} lies before reference run {reference_run}")]
    NegativeForecastOffset { reference_run: i64, timestamp: i64 },

    #[error("Failed to read settings file '{0}'")]
    ReadSettings(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse settings file '{0}'")]
    ParseSettings(PathBuf, #[source] Box<toml::de::Error>),
}
