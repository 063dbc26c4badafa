mod archive;
mod config;
mod derived;
mod error;
mod rate_limit;
mod refresh;
mod render;
mod stations;
mod types;
mod units;
mod utils;
mod weather_archive;

pub use error::{ConfigurationError, WeatherArchiveError};
pub use weather_archive::*;

pub use archive::decoder::{ArchiveDecoder, DecodedArchive, DecoderSet};
pub use archive::error::ArchiveError;
pub use archive::grid_decoder::GridCommandDecoder;
pub use archive::path::{resolve_path, GRIDDED_CUTOVER_MS};
pub use archive::scanner::{partition_paths, scan_paths, ArchiveScanner, ScanResult, ScanWindow};
pub use archive::table_decoder::TableDecoder;

pub use config::{
    find_config_file, load_config, parse_settings, ArchiveRoots, ConfigSource, GridDecoderConfig,
    RefresherConfig, Settings,
};

pub use derived::{
    accumulation_rate, compute, evaluate, meteorological_bearing, vector_angle, vector_norm,
    ConsistencyError, DerivedError,
};

pub use rate_limit::RequestLimiter;

pub use refresh::error::RefreshError;
pub use refresh::refresher::{CacheRefresher, FailedEntry, RefreshReport, StoredEntry};
pub use refresh::store::CacheStore;
pub use refresh::validator::{check_series, validate, Completeness, HorizonConfig, IncompleteReason};

pub use render::{to_delimited, to_json};

pub use stations::catalog::{load_catalog, parse_catalog};
pub use stations::error::LocateStationError;
pub use stations::locate_station::{find_in_vicinity, StationLocator};

pub use types::archive_kind::{parse_run_timestamp, Archive, ArchiveKind, MosmixRun, PointForecastFormat};
pub use types::forecast::{
    ForecastDocument, ForecastModel, GridLocation, LabeledSeries, Poi, SourceReference,
};
pub use types::into_utc_trait::{from_epoch_millis, IntoUtcDateTime};
pub use types::quantity::{find_quantity, Computation, QuantityConfig, SourceField};
pub use types::station::{Station, StationMatch};
pub use types::timeseries::{Sample, Timeseries};

pub use units::{convert, convert_series, Unit};
pub use utils::get_cache_dir;
