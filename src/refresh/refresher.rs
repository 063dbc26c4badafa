//! Background refresh of the forecast cache.
//!
//! For every point of interest and horizon the refresher walks back from the latest
//! nominal run of the configured model, one cadence step at a time, until it finds a
//! run whose forecast is complete. That run is written to the cache; if none of the
//! candidate runs qualifies, the cached entry is left alone.

use crate::archive::error::ArchiveError;
use crate::archive::scanner::{ArchiveScanner, ScanWindow};
use crate::config::RefresherConfig;
use crate::derived::{self, DerivedError};
use crate::refresh::error::RefreshError;
use crate::refresh::store::CacheStore;
use crate::refresh::validator::{validate, Completeness, HorizonConfig};
use crate::stations::locate_station::StationLocator;
use crate::types::archive_kind::{Archive, ArchiveKind};
use crate::types::forecast::{ForecastDocument, GridLocation, LabeledSeries, Poi};
use crate::types::into_utc_trait::IntoUtcDateTime;
use crate::types::quantity::QuantityConfig;
use crate::types::station::StationMatch;
use crate::weather_archive::LatLon;
use crate::Timeseries;
use bon::bon;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const MS_PER_HOUR: i64 = 3_600_000;
/// Incomplete reasons included in the log line of a rejected run.
const LOGGED_REASONS: usize = 3;

/// Where a forecast is sampled for one point of interest.
#[derive(Debug, Clone)]
enum Target {
    Grid(LatLon),
    Station(StationMatch),
}

/// Source series fetched for one candidate run, keyed by upper-case source key.
#[derive(Debug, Default)]
struct Fetched {
    series: HashMap<String, Timeseries>,
    grid_cells: HashMap<String, LatLon>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub poi: String,
    pub horizon: String,
    pub reference_run: DateTime<Utc>,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct FailedEntry {
    pub poi: String,
    pub horizon: String,
    pub error: RefreshError,
}

/// Outcome of one pass over every point of interest and horizon.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub stored: Vec<StoredEntry>,
    pub failed: Vec<FailedEntry>,
}

pub struct CacheRefresher {
    scanner: Arc<ArchiveScanner>,
    stations: Option<Arc<StationLocator>>,
    store: CacheStore,
    quantities: Vec<QuantityConfig>,
    pois: Vec<Poi>,
    settings: RefresherConfig,
}

#[bon]
impl CacheRefresher {
    #[builder]
    pub fn new(
        scanner: Arc<ArchiveScanner>,
        stations: Option<Arc<StationLocator>>,
        store: CacheStore,
        quantities: Vec<QuantityConfig>,
        pois: Vec<Poi>,
        #[builder(default)] settings: RefresherConfig,
    ) -> Self {
        Self {
            scanner,
            stations,
            store,
            quantities,
            pois,
            settings,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Refreshes every entry, then waits `wait_interval`, until `cancel` fires.
    ///
    /// Returns an error only for failures that affect every entry, like an
    /// unwritable cache directory.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), RefreshError> {
        self.store.ensure_dir().await?;
        info!(
            "Refreshing {} points of interest with {} every {:?}, looking back {:?}",
            self.pois.len(),
            self.settings.model,
            self.settings.wait_interval(),
            self.settings.lookback()
        );
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.refresh_all_at(Utc::now()) => outcome,
            };
            match outcome {
                Ok(report) => info!(
                    "Refresh cycle done: {} entries stored, {} failed",
                    report.stored.len(),
                    report.failed.len()
                ),
                Err(RefreshError::Cancelled) => break,
                Err(e) => {
                    error!("Stopping refresher: {}", e);
                    return Err(e);
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.wait_interval()) => {}
            }
        }
        info!("Refresher stopped");
        Ok(())
    }

    /// Runs one refresh pass as if the current time were `now`.
    ///
    /// Failures of a single point of interest or horizon are logged and reported;
    /// only fatal errors and cancellation end the pass early.
    pub async fn refresh_all_at(
        &self,
        now: impl IntoUtcDateTime,
    ) -> Result<RefreshReport, RefreshError> {
        let now = now.into_utc();
        let mut report = RefreshReport::default();
        for poi in &self.pois {
            for horizon in &self.settings.horizons {
                match self.refresh_one(poi, horizon, now).await {
                    Ok(entry) => report.stored.push(entry),
                    Err(e) if e.is_fatal() || matches!(e, RefreshError::Cancelled) => return Err(e),
                    Err(e) => {
                        warn!("Refresh of '{}' ({}) failed: {}", poi.id, horizon.name, e);
                        report.failed.push(FailedEntry {
                            poi: poi.id.clone(),
                            horizon: horizon.name.clone(),
                            error: e,
                        });
                    }
                }
            }
        }
        Ok(report)
    }

    /// Searches for the newest complete run for `poi` and stores it.
    pub async fn refresh_one(
        &self,
        poi: &Poi,
        horizon: &HorizonConfig,
        now: DateTime<Utc>,
    ) -> Result<StoredEntry, RefreshError> {
        let target = self.target_for(poi)?;
        let model = self.settings.model;
        let attempts = self.settings.max_attempts;
        let mut run = model.latest_run(now);

        for attempt in 1..=attempts {
            let Some(archive) = model.archive_for_run(run) else {
                run -= model.cadence();
                continue;
            };
            info!(
                "Trying {} run {} for '{}' ({}), attempt {}/{}",
                model,
                run.format("%Y%m%d%H"),
                poi.id,
                horizon.name,
                attempt,
                attempts
            );
            let fetched = match &target {
                Target::Grid(point) => self.fetch_grid(run, *point, horizon).await?,
                Target::Station(station) => self.fetch_point(&archive, run, station).await?,
            };
            let run_ms = run.timestamp_millis();
            let results = self.derive(&fetched, run_ms, horizon);

            match validate(run_ms, &self.quantities, &results, horizon) {
                Completeness::Complete => {
                    let document = self.assemble(poi, &target, &fetched, results, run_ms);
                    let path = self.store.store(&poi.id, &horizon.name, &document).await?;
                    info!(
                        "Cached {} run {} for '{}' ({})",
                        model,
                        run.format("%Y%m%d%H"),
                        poi.id,
                        horizon.name
                    );
                    return Ok(StoredEntry {
                        poi: poi.id.clone(),
                        horizon: horizon.name.clone(),
                        reference_run: run,
                        path,
                    });
                }
                Completeness::Incomplete(reasons) => {
                    let summary: Vec<String> = reasons
                        .iter()
                        .take(LOGGED_REASONS)
                        .map(ToString::to_string)
                        .collect();
                    info!(
                        "Run {} incomplete for '{}' ({}): {}",
                        run.format("%Y%m%d%H"),
                        poi.id,
                        horizon.name,
                        summary.join("; ")
                    );
                }
            }
            run -= model.cadence();
        }

        warn!(
            "No complete {} run for '{}' ({}) in the last {} runs, keeping cached entry",
            model, poi.id, horizon.name, attempts
        );
        Err(RefreshError::ExhaustedRetries {
            poi: poi.id.clone(),
            horizon: horizon.name.clone(),
            attempts,
        })
    }

    fn target_for(&self, poi: &Poi) -> Result<Target, RefreshError> {
        let point = LatLon(poi.lat, poi.lon);
        if !self.settings.model.uses_stations() {
            return Ok(Target::Grid(point));
        }
        self.stations
            .as_ref()
            .and_then(|locator| locator.nearest(point))
            .map(Target::Station)
            .ok_or_else(|| RefreshError::NoStation(poi.id.clone()))
    }

    /// Scans every source key of the configured quantities for `run`, each key on
    /// its own task, at most `concurrency` at a time.
    async fn fetch_grid(
        &self,
        run: DateTime<Utc>,
        point: LatLon,
        horizon: &HorizonConfig,
    ) -> Result<Fetched, RefreshError> {
        let keys: BTreeSet<String> = self
            .quantities
            .iter()
            .flat_map(|q| q.sources())
            .map(|field| field.key.to_uppercase())
            .collect();
        let archive = Archive::GriddedForecast { reference_run: run };
        let run_ms = run.timestamp_millis();
        let window = ScanWindow::new(
            run_ms,
            run_ms + horizon.length_ms() - 1,
            (horizon.sample_spacing_ms / MS_PER_HOUR).max(1),
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency()));
        let mut tasks = JoinSet::new();
        for key in keys {
            let scanner = self.scanner.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = scanner.scan(&archive, &key, window, Some(point)).await;
                (key, outcome)
            });
        }

        let mut fetched = Fetched::default();
        while let Some(joined) = tasks.join_next().await {
            let (key, outcome) = joined?;
            match outcome {
                Ok(mut result) => {
                    if let Some(cell) = result.grid_cell {
                        fetched.grid_cells.insert(key.clone(), cell);
                    }
                    if let Some(series) = result.series.remove(&key) {
                        fetched.series.insert(key, series);
                    }
                }
                Err(ArchiveError::Cancelled) => return Err(RefreshError::Cancelled),
                Err(e) => warn!("Fetching '{}' failed: {}", key, e),
            }
        }
        Ok(fetched)
    }

    /// Reads the station's point forecast file for `archive`, which holds every key.
    async fn fetch_point(
        &self,
        archive: &Archive,
        run: DateTime<Utc>,
        station: &StationMatch,
    ) -> Result<Fetched, RefreshError> {
        let root = self.scanner.root(ArchiveKind::PointForecast);
        let path = archive.resolve(root, run.timestamp_millis(), &station.station.id)?;
        match self
            .scanner
            .decode_path(ArchiveKind::PointForecast, &path, None)
            .await
        {
            Ok(decoded) => Ok(Fetched {
                series: decoded.series.into_iter().collect(),
                grid_cells: HashMap::new(),
            }),
            Err(ArchiveError::Cancelled) => Err(RefreshError::Cancelled),
            Err(e) if e.is_unavailable() => {
                debug!("Point forecast {} not available yet", path.display());
                Ok(Fetched::default())
            }
            Err(e) => {
                warn!("Dropping point forecast {}: {}", path.display(), e);
                Ok(Fetched::default())
            }
        }
    }

    /// Converts the fetched sources and evaluates every quantity, trimmed to the
    /// horizon. Quantities that cannot be computed are left out.
    fn derive(
        &self,
        fetched: &Fetched,
        run_ms: i64,
        horizon: &HorizonConfig,
    ) -> HashMap<String, Timeseries> {
        let mut results = HashMap::new();
        for quantity in &self.quantities {
            match derived::evaluate(quantity, |key| fetched.series.get(key)) {
                Ok(series) => {
                    results.insert(
                        quantity.key.clone(),
                        series.trim_to_horizon(run_ms, horizon.length_ms()),
                    );
                }
                Err(DerivedError::MissingSource(key)) => {
                    debug!("'{}' has no data for source '{}'", quantity.key, key)
                }
                Err(e) => warn!("Computing '{}' failed: {}", quantity.key, e),
            }
        }
        results
    }

    fn assemble(
        &self,
        poi: &Poi,
        target: &Target,
        fetched: &Fetched,
        mut results: HashMap<String, Timeseries>,
        run_ms: i64,
    ) -> ForecastDocument {
        let location = match target {
            Target::Grid(_) => self
                .quantities
                .iter()
                .flat_map(|q| q.sources())
                .find_map(|field| fetched.grid_cells.get(&field.key.to_uppercase()))
                .map(|cell| GridLocation {
                    lon: cell.1,
                    lat: cell.0,
                }),
            Target::Station(m) => Some(GridLocation {
                lon: m.station.longitude,
                lat: m.station.latitude,
            }),
        };
        let forecasts = self
            .quantities
            .iter()
            .map(|quantity| LabeledSeries {
                label: quantity.label.clone(),
                unit: quantity.unit.to_string(),
                data: results.remove(&quantity.key).unwrap_or_default(),
            })
            .collect();
        let model = self.settings.model;
        ForecastDocument {
            source_reference: model.source_reference(),
            forecast_model_type: model.model_type().to_string(),
            location,
            poi: poi.clone(),
            reference_timestamp: run_ms,
            query_timestamp: Utc::now().timestamp_millis(),
            forecasts,
        }
    }
}
