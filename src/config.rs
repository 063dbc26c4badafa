//! Settings loading.
//!
//! Settings come from a TOML file, searched in this order:
//! 1. an explicit path (`--config` or `DWD_ARCHIVE_CONFIG`)
//! 2. `dwd-archive.toml` in the current directory
//! 3. `$XDG_CONFIG_HOME/dwd-archive/` (or `~/.config/dwd-archive/`)
//! 4. `/etc/dwd-archive/`
//!
//! and fall back to built-in defaults when no file is found.

use crate::archive::decoder::DecoderSet;
use crate::archive::grid_decoder::GridCommandDecoder;
use crate::archive::scanner::ArchiveScanner;
use crate::archive::table_decoder::TableDecoder;
use crate::error::{ConfigurationError, WeatherArchiveError};
use crate::refresh::validator::HorizonConfig;
use crate::stations::error::LocateStationError;
use crate::stations::locate_station::StationLocator;
use crate::types::archive_kind::ArchiveKind;
use crate::types::forecast::{ForecastModel, Poi};
use crate::types::quantity::QuantityConfig;
use crate::utils::get_cache_dir;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const APP_NAME: &str = "dwd-archive";
pub const CONFIG_ENV_VAR: &str = "DWD_ARCHIVE_CONFIG";
pub const CONFIG_FILE_NAME: &str = "dwd-archive.toml";

const MAX_CONCURRENCY: usize = 10;

/// Describes where the settings were loaded from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    CurrentDir(PathBuf),
    XdgConfig(PathBuf),
    System(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Explicit(p)
            | ConfigSource::CurrentDir(p)
            | ConfigSource::XdgConfig(p)
            | ConfigSource::System(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.path() {
            Some(p) => write!(f, "{}", p.display()),
            None => write!(f, "(defaults)"),
        }
    }
}

/// Root directory of each archive tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveRoots {
    pub observation: PathBuf,
    pub gridded_forecast: PathBuf,
    pub point_forecast: PathBuf,
}

impl ArchiveRoots {
    /// Places every archive under one directory, in `beob/`, `cosmo-d2/` and `mosmix/`.
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            observation: base.join("beob"),
            gridded_forecast: base.join("cosmo-d2"),
            point_forecast: base.join("mosmix"),
        }
    }

    /// Uses the same directory for every kind.
    pub fn uniform(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            observation: root.clone(),
            gridded_forecast: root.clone(),
            point_forecast: root,
        }
    }

    pub fn root(&self, kind: ArchiveKind) -> &Path {
        match kind {
            ArchiveKind::Observation => &self.observation,
            ArchiveKind::GriddedForecast => &self.gridded_forecast,
            ArchiveKind::PointForecast => &self.point_forecast,
        }
    }
}

impl Default for ArchiveRoots {
    fn default() -> Self {
        Self::under("/var/lib/dwd-archive")
    }
}

/// External program sampling gridded files, see
/// [`GridCommandDecoder`](crate::archive::grid_decoder::GridCommandDecoder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridDecoderConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Default for GridDecoderConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("grib-sample"),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefresherConfig {
    pub model: ForecastModel,
    /// Pause between refresh cycles, in seconds.
    pub wait_interval_secs: u64,
    /// Candidate runs tried before giving up, newest first. Runs are one model
    /// cadence apart, so the default 8 looks back 24 h for COSMO-D2 and 48 h for
    /// MOSMIX, see [`RefresherConfig::lookback`].
    pub max_attempts: u32,
    /// Simultaneous quantity fetches, clamped to `1..=10`.
    pub concurrency: usize,
    /// Limit for one decode call, in seconds.
    pub decode_timeout_secs: u64,
    pub horizons: Vec<HorizonConfig>,
}

impl RefresherConfig {
    pub fn concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_secs(self.wait_interval_secs)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_secs(self.decode_timeout_secs)
    }

    /// Time span covered by the candidate runs, one model cadence per attempt.
    pub fn lookback(&self) -> Duration {
        let hours = self.model.cadence_hours().unsigned_abs() * u64::from(self.max_attempts);
        Duration::from_secs(hours * 3600)
    }
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            model: ForecastModel::default(),
            wait_interval_secs: 600,
            max_attempts: 8,
            concurrency: 4,
            decode_timeout_secs: 60,
            horizons: HorizonConfig::defaults(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub archives: ArchiveRoots,
    /// Defaults to the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    pub station_catalog: Option<PathBuf>,
    pub grid_decoder: GridDecoderConfig,
    pub scan_concurrency: usize,
    pub log_level: Option<String>,
    pub refresher: RefresherConfig,
    pub quantities: Vec<QuantityConfig>,
    pub pois: Vec<Poi>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            archives: ArchiveRoots::default(),
            cache_dir: None,
            station_catalog: None,
            grid_decoder: GridDecoderConfig::default(),
            scan_concurrency: 4,
            log_level: None,
            refresher: RefresherConfig::default(),
            quantities: Vec::new(),
            pois: Vec::new(),
        }
    }
}

impl Settings {
    pub fn scan_concurrency(&self) -> usize {
        self.scan_concurrency.clamp(1, MAX_CONCURRENCY)
    }

    /// The configured cache directory, or the platform default.
    pub fn resolve_cache_dir(&self) -> Result<PathBuf, WeatherArchiveError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => get_cache_dir(),
        }
    }

    pub fn decoders(&self) -> DecoderSet {
        let grid = GridCommandDecoder::new(&self.grid_decoder.program)
            .with_args(self.grid_decoder.args.iter().cloned());
        DecoderSet::new(Arc::new(TableDecoder), Arc::new(grid))
    }

    /// A scanner over the configured archives that stops when `cancel` fires.
    pub fn scanner(&self, cancel: CancellationToken) -> ArchiveScanner {
        ArchiveScanner::builder()
            .roots(self.archives.clone())
            .decoders(self.decoders())
            .concurrency(self.scan_concurrency())
            .decode_timeout(self.refresher.decode_timeout())
            .cancel(cancel)
            .build()
    }

    /// Loads the station catalog, if one is configured.
    pub async fn station_locator(
        &self,
        cache_dir: &Path,
    ) -> Result<Option<StationLocator>, LocateStationError> {
        match &self.station_catalog {
            Some(catalog) => Ok(Some(StationLocator::load(catalog, cache_dir).await?)),
            None => Ok(None),
        }
    }
}

/// Finds the settings file. `explicit` wins over the environment variable.
pub fn find_config_file(explicit: Option<&Path>) -> ConfigSource {
    if let Some(path) = explicit {
        return ConfigSource::Explicit(path.to_path_buf());
    }

    if let Ok(path) = env::var(CONFIG_ENV_VAR) {
        let p = PathBuf::from(&path);
        if p.exists() {
            return ConfigSource::Explicit(p);
        }
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return ConfigSource::CurrentDir(local);
    }

    let xdg_path = xdg_config_path(CONFIG_FILE_NAME);
    if xdg_path.exists() {
        return ConfigSource::XdgConfig(xdg_path);
    }

    let system = PathBuf::from(format!("/etc/{}/{}", APP_NAME, CONFIG_FILE_NAME));
    if system.exists() {
        return ConfigSource::System(system);
    }

    ConfigSource::Defaults
}

fn xdg_config_path(filename: &str) -> PathBuf {
    if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join(APP_NAME).join(filename)
    } else if let Some(config) = dirs::config_dir() {
        config.join(APP_NAME).join(filename)
    } else {
        PathBuf::from(format!(".config/{}/{}", APP_NAME, filename))
    }
}

pub fn parse_settings(raw: &str, origin: &Path) -> Result<Settings, ConfigurationError> {
    toml::from_str(raw).map_err(|e| ConfigurationError::ParseSettings(origin.to_path_buf(), Box::new(e)))
}

/// Loads settings from `source`, or defaults when no file was found.
pub fn load_config(source: &ConfigSource) -> Result<Settings, ConfigurationError> {
    match source.path() {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| ConfigurationError::ReadSettings(path.to_path_buf(), e))?;
            parse_settings(&content, path)
        }
        None => Ok(Settings::default()),
    }
}
