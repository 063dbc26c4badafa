//! The request facade used by a serving layer.
//!
//! Every request names quantities from the configured catalog and a time window in
//! epoch milliseconds. Unknown quantities, stations and run selectors are reported as
//! [`ConfigurationError`]s; missing or broken archive files only leave gaps in the
//! returned series.

use crate::archive::scanner::{ArchiveScanner, ScanResult, ScanWindow};
use crate::config::Settings;
use crate::derived::{self, DerivedError};
use crate::error::{ConfigurationError, WeatherArchiveError};
use crate::refresh::store::CacheStore;
use crate::stations::locate_station::StationLocator;
use crate::types::archive_kind::{parse_run_timestamp, Archive, MosmixRun, PointForecastFormat};
use crate::types::forecast::{ForecastDocument, LabeledSeries};
use crate::types::quantity::{find_quantity, QuantityConfig};
use crate::types::station::{Station, StationMatch};
use crate::Timeseries;
use bon::bon;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
///
/// # Examples
///
/// ```
/// use dwd_archive::LatLon;
///
/// let frankfurt = LatLon(50.11, 8.68);
/// assert_eq!(frankfurt.0, 50.11); // Latitude
/// assert_eq!(frankfurt.1, 8.68); // Longitude
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon(pub f64, pub f64);

/// Hours between observation files.
const OBSERVATION_CADENCE_HOURS: i64 = 24;
/// Hours between point forecast files of the same run slot.
const POINT_FORECAST_CADENCE_HOURS: i64 = 24;

/// Read access to the archives, the station catalog and the forecast cache.
///
/// # Examples
///
/// ```rust,no_run
/// # use dwd_archive::{Settings, WeatherArchive, WeatherArchiveError};
/// # async fn run() -> Result<(), WeatherArchiveError> {
/// let archive = WeatherArchive::from_settings(&Settings::default()).await?;
/// let series = archive
///     .observations()
///     .quantities(&["t_2m"])
///     .station("10637")
///     .start(1_710_201_600_000)
///     .end(1_710_288_000_000)
///     .call()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct WeatherArchive {
    scanner: Arc<ArchiveScanner>,
    stations: Arc<StationLocator>,
    quantities: Vec<QuantityConfig>,
    cache: CacheStore,
}

#[bon]
impl WeatherArchive {
    #[builder]
    pub fn new(
        scanner: Arc<ArchiveScanner>,
        #[builder(default = Arc::new(StationLocator::from_stations(Vec::new())))]
        stations: Arc<StationLocator>,
        quantities: Vec<QuantityConfig>,
        cache: CacheStore,
    ) -> Self {
        Self {
            scanner,
            stations,
            quantities,
            cache,
        }
    }

    /// Builds the facade from loaded settings, parsing the station catalog if one is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns [`WeatherArchiveError::CacheDirResolution`] when no cache directory is
    /// configured and the platform has none, and [`WeatherArchiveError::LocateStation`]
    /// when the catalog cannot be read.
    pub async fn from_settings(settings: &Settings) -> Result<Self, WeatherArchiveError> {
        let cache_dir = settings.resolve_cache_dir()?;
        let stations = settings
            .station_locator(&cache_dir)
            .await?
            .unwrap_or_else(|| StationLocator::from_stations(Vec::new()));
        Ok(Self {
            scanner: Arc::new(settings.scanner(CancellationToken::new())),
            stations: Arc::new(stations),
            quantities: settings.quantities.clone(),
            cache: CacheStore::new(cache_dir),
        })
    }

    pub fn quantities(&self) -> &[QuantityConfig] {
        &self.quantities
    }

    /// Lists catalog stations, see [`find_in_vicinity`](crate::find_in_vicinity).
    ///
    /// This method uses a builder pattern.
    ///
    /// * `.location(LatLon)`: Optional. Sort by distance from this point.
    /// * `.radius_meters(f64)`: Optional. Drop stations further away than this.
    /// * `.limit(usize)`: Optional. Maximum number of stations; `0` means no limit.
    #[builder]
    pub fn find_stations(
        &self,
        location: Option<LatLon>,
        radius_meters: Option<f64>,
        limit: Option<usize>,
    ) -> Vec<StationMatch> {
        self.stations.find_in_vicinity(location, radius_meters, limit)
    }

    /// Observed series for a station, or for the station nearest to `location`.
    ///
    /// * `.quantities(&[&str])`: **Required.** Quantity keys from the catalog.
    /// * `.station(&str)` or `.location(LatLon)`: **Required**, one of them.
    /// * `.start(i64)` / `.end(i64)`: **Required.** Inclusive window, epoch ms.
    #[builder]
    pub async fn observations(
        &self,
        quantities: &[&str],
        station: Option<&str>,
        location: Option<LatLon>,
        start: i64,
        end: i64,
    ) -> Result<Vec<LabeledSeries>, WeatherArchiveError> {
        let selected = self.select_quantities(quantities)?;
        let station = self.resolve_station(station, location)?;
        let window = ScanWindow::new(start, end, OBSERVATION_CADENCE_HOURS);
        let scan = self
            .scanner
            .scan(&Archive::Observation, &station.id, window, None)
            .await?;
        Ok(label_all(&selected, |quantity| {
            derived::evaluate(quantity, |key| scan.series.get(key))
        }))
    }

    /// Gridded forecast series sampled at `location` from one model run.
    ///
    /// * `.quantities(&[&str])`: **Required.**
    /// * `.location(LatLon)`: **Required.**
    /// * `.run(&str)`: **Required.** Reference run as `YYYYMMDDHH`.
    /// * `.start(i64)` / `.end(i64)`: **Required.** Inclusive window, epoch ms.
    /// * `.cadence_hours(i64)`: Optional. Step between forecast files, defaults to 1.
    #[builder]
    pub async fn gridded_forecast(
        &self,
        quantities: &[&str],
        location: LatLon,
        run: &str,
        start: i64,
        end: i64,
        #[builder(default = 1)] cadence_hours: i64,
    ) -> Result<Vec<LabeledSeries>, WeatherArchiveError> {
        let selected = self.select_quantities(quantities)?;
        let archive = Archive::GriddedForecast {
            reference_run: parse_run_timestamp(run)?,
        };
        let window = ScanWindow::new(start, end, cadence_hours);

        let mut scan = ScanResult::default();
        let keys: BTreeSet<String> = selected
            .iter()
            .flat_map(|q| q.sources())
            .map(|field| field.key.to_uppercase())
            .collect();
        for key in keys {
            let mut result = self.scanner.scan(&archive, &key, window, Some(location)).await?;
            if scan.grid_cell.is_none() {
                scan.grid_cell = result.grid_cell;
            }
            if let Some(series) = result.series.remove(&key) {
                scan.series.insert(key, series);
            }
        }
        debug!("Gridded forecast sampled at grid cell {:?}", scan.grid_cell);
        Ok(label_all(&selected, |quantity| {
            derived::evaluate(quantity, |key| scan.series.get(key))
        }))
    }

    /// Point forecast series of one run slot, for a station or the station nearest
    /// to `location`. Every day between `start` and `end` contributes its run.
    ///
    /// * `.quantities(&[&str])`: **Required.**
    /// * `.station(&str)` or `.location(LatLon)`: **Required**, one of them.
    /// * `.run(&str)`: **Required.** Run slot, e.g. `"R09"` or `"09"`.
    /// * `.start(i64)` / `.end(i64)`: **Required.** Inclusive window, epoch ms.
    /// * `.format(PointForecastFormat)`: Optional. Defaults to the compressed bundle.
    #[builder]
    pub async fn point_forecast(
        &self,
        quantities: &[&str],
        station: Option<&str>,
        location: Option<LatLon>,
        run: &str,
        start: i64,
        end: i64,
        #[builder(default)] format: PointForecastFormat,
    ) -> Result<Vec<LabeledSeries>, WeatherArchiveError> {
        let selected = self.select_quantities(quantities)?;
        let station = self.resolve_station(station, location)?;
        let archive = Archive::PointForecast {
            run: run.parse::<MosmixRun>()?,
            format,
        };
        let window = ScanWindow::new(start, end, POINT_FORECAST_CADENCE_HOURS);
        let scan = self.scanner.scan(&archive, &station.id, window, None).await?;
        Ok(label_all(&selected, |quantity| {
            derived::evaluate(quantity, |key| scan.series.get(key))
        }))
    }

    /// The cached forecast document for a point of interest and horizon, if the
    /// refresher has written one.
    pub async fn cached_forecast(
        &self,
        poi: &str,
        horizon: &str,
    ) -> Result<Option<ForecastDocument>, WeatherArchiveError> {
        Ok(self.cache.load(poi, horizon).await?)
    }

    fn select_quantities(&self, keys: &[&str]) -> Result<Vec<&QuantityConfig>, ConfigurationError> {
        keys.iter()
            .map(|key| {
                find_quantity(&self.quantities, key)
                    .ok_or_else(|| ConfigurationError::UnknownQuantity(key.to_string()))
            })
            .collect()
    }

    fn resolve_station(
        &self,
        id: Option<&str>,
        location: Option<LatLon>,
    ) -> Result<Station, ConfigurationError> {
        match (id, location) {
            (Some(id), _) => self
                .stations
                .get(id)
                .cloned()
                .ok_or_else(|| ConfigurationError::UnknownStation(id.to_string())),
            (None, Some(point)) => self
                .stations
                .nearest(point)
                .map(|m| m.station)
                .ok_or_else(|| {
                    ConfigurationError::UnknownStation(format!("near {:.4},{:.4}", point.0, point.1))
                }),
            (None, None) => Err(ConfigurationError::MissingLocation),
        }
    }
}

/// Pairs each quantity with its evaluated series. A quantity that cannot be
/// computed comes back empty without affecting the others.
fn label_all<F>(quantities: &[&QuantityConfig], mut evaluate: F) -> Vec<LabeledSeries>
where
    F: FnMut(&QuantityConfig) -> Result<Timeseries, DerivedError>,
{
    quantities
        .iter()
        .map(|&quantity| {
            let data = match evaluate(quantity) {
                Ok(series) => series,
                Err(DerivedError::MissingSource(key)) => {
                    debug!("No data for source '{}' of '{}'", key, quantity.key);
                    Timeseries::new()
                }
                Err(DerivedError::Consistency(e)) => {
                    warn!("Computing '{}' failed: {}", quantity.key, e);
                    Timeseries::new()
                }
            };
            LabeledSeries {
                label: quantity.label.clone(),
                unit: quantity.unit.to_string(),
                data,
            }
        })
        .collect()
}
