use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dwd_archive::{
    parse_run_timestamp, ArchiveDecoder, ArchiveError, ArchiveRoots, ArchiveScanner, CacheRefresher,
    CacheStore, Computation, DecodedArchive, DecoderSet, ForecastDocument, ForecastModel,
    HorizonConfig, LatLon, Poi, QuantityConfig, RefreshError, RefresherConfig, SourceField,
    Timeseries, Unit,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const HOUR: i64 = 3_600_000;
const FILE_PREFIX: &str = "cosmo-d2_germany_regular-lat-lon_single-level_";

/// Serves gridded files from memory: a file exists when its run lists its offset.
struct FakeGrid {
    offsets: HashMap<String, HashSet<i64>>,
    missing: HashSet<(String, String, i64)>,
    values: HashMap<String, f64>,
    uncovered_lat: Option<f64>,
}

impl FakeGrid {
    fn new() -> Self {
        Self {
            offsets: HashMap::new(),
            missing: HashSet::new(),
            values: HashMap::new(),
            uncovered_lat: None,
        }
    }

    fn with_run(mut self, run: &str, offsets: impl IntoIterator<Item = i64>) -> Self {
        self.offsets.insert(run.to_string(), offsets.into_iter().collect());
        self
    }

    fn with_value(mut self, key: &str, value: f64) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    /// Drops a single key's file from an otherwise available run.
    fn without(mut self, run: &str, key: &str, offset: i64) -> Self {
        self.missing
            .insert((run.to_string(), key.to_string(), offset));
        self
    }

    /// Points at this latitude lie outside the model domain.
    fn uncovered_at(mut self, lat: f64) -> Self {
        self.uncovered_lat = Some(lat);
        self
    }
}

#[async_trait]
impl ArchiveDecoder for FakeGrid {
    async fn decode(&self, path: &Path, point: Option<LatLon>) -> Result<DecodedArchive, ArchiveError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(FILE_PREFIX))
            .and_then(|n| n.strip_suffix(".grib2.bz2"))
            .ok_or_else(|| ArchiveError::decode(path, "unexpected file name"))?;
        let mut parts = name.splitn(3, '_');
        let (Some(run), Some(offset), Some(key)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ArchiveError::decode(path, "unexpected file name"));
        };
        let offset: i64 = offset
            .parse()
            .map_err(|_| ArchiveError::decode(path, "bad offset"))?;
        let covered = match (point, self.uncovered_lat) {
            (Some(LatLon(lat, _)), Some(uncovered)) => lat != uncovered,
            _ => true,
        };
        let available = covered
            && self
                .offsets
                .get(run)
                .is_some_and(|offsets| offsets.contains(&offset))
            && !self
                .missing
                .contains(&(run.to_string(), key.to_string(), offset));
        if !available {
            return Err(ArchiveError::DataUnavailable(path.to_path_buf()));
        }
        let run_ms = parse_run_timestamp(run)
            .map_err(|e| ArchiveError::decode(path, e.to_string()))?
            .timestamp_millis();
        let value = self.values.get(key).copied().unwrap_or(273.15);
        Ok(DecodedArchive {
            series: BTreeMap::from([(
                key.to_string(),
                Timeseries::from_pairs([(run_ms + offset * HOUR, value)]),
            )]),
            grid_cell: Some(LatLon(50.08, 8.62)),
        })
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 12, 8, 47, 0).unwrap()
}

fn run_ms(run: &str) -> i64 {
    parse_run_timestamp(run).unwrap().timestamp_millis()
}

fn wind_speed() -> QuantityConfig {
    QuantityConfig {
        key: "wind_speed".to_string(),
        label: "Wind speed".to_string(),
        unit: Unit::MetrePerSecond,
        computation: Computation::VectorNorm {
            zonal: SourceField::new("U_10M", Unit::MetrePerSecond),
            meridional: SourceField::new("V_10M", Unit::MetrePerSecond),
        },
    }
}

fn temperature() -> QuantityConfig {
    QuantityConfig {
        key: "t_2m".to_string(),
        label: "Temperature".to_string(),
        unit: Unit::Celsius,
        computation: Computation::BaseValue {
            source: SourceField::new("T_2M", Unit::Kelvin),
        },
    }
}

fn poi() -> Poi {
    Poi {
        id: "ffm".to_string(),
        lat: 50.11,
        lon: 8.68,
    }
}

fn refresher(
    grid: FakeGrid,
    cache_dir: &Path,
    quantities: Vec<QuantityConfig>,
    max_attempts: u32,
    cancel: CancellationToken,
) -> CacheRefresher {
    refresher_for(grid, cache_dir, quantities, vec![poi()], max_attempts, cancel)
}

fn refresher_for(
    grid: FakeGrid,
    cache_dir: &Path,
    quantities: Vec<QuantityConfig>,
    pois: Vec<Poi>,
    max_attempts: u32,
    cancel: CancellationToken,
) -> CacheRefresher {
    let scanner = ArchiveScanner::builder()
        .roots(ArchiveRoots::uniform("/nwp"))
        .decoders(DecoderSet::uniform(Arc::new(grid)))
        .concurrency(8)
        .cancel(cancel)
        .build();
    CacheRefresher::builder()
        .scanner(Arc::new(scanner))
        .store(CacheStore::new(cache_dir))
        .quantities(quantities)
        .pois(pois)
        .settings(RefresherConfig {
            model: ForecastModel::CosmoD2,
            max_attempts,
            horizons: vec![HorizonConfig::new("27h", 27, 27, HOUR)],
            ..RefresherConfig::default()
        })
        .build()
}

fn previous_document() -> ForecastDocument {
    ForecastDocument {
        source_reference: ForecastModel::CosmoD2.source_reference(),
        forecast_model_type: "COSMO-D2".to_string(),
        location: None,
        poi: poi(),
        reference_timestamp: 42,
        query_timestamp: 43,
        forecasts: vec![],
    }
}

async fn seeded_store(dir: &Path) -> CacheStore {
    let store = CacheStore::new(dir);
    store.ensure_dir().await.unwrap();
    store.store("ffm", "27h", &previous_document()).await.unwrap();
    store
}

#[tokio::test]
async fn test_complete_latest_run_replaces_cache_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path()).await;
    let grid = FakeGrid::new().with_run("2024031206", 0..27);

    let report = refresher(grid, dir.path(), vec![temperature()], 8, CancellationToken::new())
        .refresh_all_at(now())
        .await
        .unwrap();

    assert_eq!(report.stored.len(), 1);
    assert!(report.failed.is_empty());
    assert_eq!(report.stored[0].reference_run.timestamp_millis(), run_ms("2024031206"));

    let document = store.load("ffm", "27h").await.unwrap().unwrap();
    assert_eq!(document.reference_timestamp, run_ms("2024031206"));
    assert_eq!(document.forecast_model_type, "COSMO-D2");
    let location = document.location.unwrap();
    assert_eq!((location.lat, location.lon), (50.08, 8.62));
    assert_eq!(document.forecasts.len(), 1);
    let temperature = &document.forecasts[0];
    assert_eq!(temperature.label, "Temperature");
    assert_eq!(temperature.unit, "°C");
    assert_eq!(temperature.data.len(), 27);
    assert!(temperature.data.values().all(|v| v.abs() < 1e-9));
}

#[tokio::test]
async fn test_incomplete_latest_run_falls_back_one_step() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path()).await;
    let grid = FakeGrid::new()
        .with_run("2024031206", 0..26)
        .with_run("2024031203", 0..30);

    let report = refresher(grid, dir.path(), vec![temperature()], 8, CancellationToken::new())
        .refresh_all_at(now())
        .await
        .unwrap();

    assert_eq!(report.stored.len(), 1);
    let document = store.load("ffm", "27h").await.unwrap().unwrap();
    assert_eq!(document.reference_timestamp, run_ms("2024031203"));
    assert_eq!(document.forecasts[0].data.len(), 27);
}

#[tokio::test]
async fn test_gap_in_latest_run_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path()).await;
    let grid = FakeGrid::new()
        .with_run("2024031206", (0..28).filter(|&h| h != 10))
        .with_run("2024031203", 0..27);

    refresher(grid, dir.path(), vec![temperature()], 8, CancellationToken::new())
        .refresh_all_at(now())
        .await
        .unwrap();

    let document = store.load("ffm", "27h").await.unwrap().unwrap();
    assert_eq!(document.reference_timestamp, run_ms("2024031203"));
}

#[tokio::test]
async fn test_exhausted_retries_keep_previous_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path()).await;
    // Nine cadence steps before the latest run.
    let only_complete = "2024031103";
    let grid = || FakeGrid::new().with_run(only_complete, 0..27);

    let report = refresher(grid(), dir.path(), vec![temperature()], 8, CancellationToken::new())
        .refresh_all_at(now())
        .await
        .unwrap();

    assert!(report.stored.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0].error,
        RefreshError::ExhaustedRetries { attempts: 8, .. }
    ));
    assert_eq!(store.load("ffm", "27h").await.unwrap(), Some(previous_document()));

    let report = refresher(grid(), dir.path(), vec![temperature()], 10, CancellationToken::new())
        .refresh_all_at(now())
        .await
        .unwrap();
    assert_eq!(report.stored.len(), 1);
    let document = store.load("ffm", "27h").await.unwrap().unwrap();
    assert_eq!(document.reference_timestamp, run_ms(only_complete));
}

#[tokio::test]
async fn test_vector_quantities_from_components() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path()).await;
    let grid = FakeGrid::new()
        .with_run("2024031206", 0..27)
        .with_value("U_10M", 3.0)
        .with_value("V_10M", 4.0);
    let zonal = SourceField::new("U_10M", Unit::MetrePerSecond);
    let meridional = SourceField::new("V_10M", Unit::MetrePerSecond);
    let quantities = vec![
        QuantityConfig {
            key: "wind_speed".to_string(),
            label: "Wind speed".to_string(),
            unit: Unit::MetrePerSecond,
            computation: Computation::VectorNorm {
                zonal: zonal.clone(),
                meridional: meridional.clone(),
            },
        },
        QuantityConfig {
            key: "wind_direction".to_string(),
            label: "Wind direction".to_string(),
            unit: Unit::Degree,
            computation: Computation::VectorAngle { zonal, meridional },
        },
    ];

    refresher(grid, dir.path(), quantities, 8, CancellationToken::new())
        .refresh_all_at(now())
        .await
        .unwrap();

    let document = store.load("ffm", "27h").await.unwrap().unwrap();
    assert_eq!(document.reference_timestamp, run_ms("2024031206"));
    let speed = &document.forecasts[0];
    assert!(speed.data.values().all(|v| (v - 5.0).abs() < 1e-9));
    let direction = &document.forecasts[1];
    assert_eq!(direction.data.len(), 27);
    let expected = 3.0_f64.atan2(4.0).to_degrees() + 180.0;
    assert!(direction.data.values().all(|v| (v - expected).abs() < 1e-9));
}

#[tokio::test]
async fn test_cancelled_refresh_stops() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let grid = FakeGrid::new().with_run("2024031206", 0..27);

    let err = refresher(grid, dir.path(), vec![temperature()], 8, cancel)
        .refresh_all_at(now())
        .await
        .unwrap_err();
    assert!(matches!(err, RefreshError::Cancelled));
    assert_eq!(store.load("ffm", "27h").await.unwrap(), Some(previous_document()));
}

#[tokio::test]
async fn test_run_loop_stops_on_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    let cancel = CancellationToken::new();
    let grid = FakeGrid::new().with_run("2024031206", 0..27);
    let refresher = refresher(grid, &cache_dir, vec![temperature()], 1, cancel.clone());

    cancel.cancel();
    refresher.run(cancel).await.unwrap();
    assert!(cache_dir.is_dir());
}

#[tokio::test]
async fn test_misaligned_components_fall_back_to_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path()).await;
    let grid = FakeGrid::new()
        .with_run("2024031206", 0..27)
        .with_run("2024031203", 0..30)
        .without("2024031206", "V_10M", 10)
        .with_value("U_10M", 3.0)
        .with_value("V_10M", 4.0);

    let report = refresher(
        grid,
        dir.path(),
        vec![temperature(), wind_speed()],
        8,
        CancellationToken::new(),
    )
    .refresh_all_at(now())
    .await
    .unwrap();

    assert_eq!(report.stored.len(), 1);
    assert!(report.failed.is_empty());
    let document = store.load("ffm", "27h").await.unwrap().unwrap();
    assert_eq!(document.reference_timestamp, run_ms("2024031203"));
    assert_eq!(document.forecasts[1].data.len(), 27);
    assert!(document.forecasts[1].data.values().all(|v| (v - 5.0).abs() < 1e-9));
}

#[tokio::test]
async fn test_failing_poi_leaves_others_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path()).await;
    let offshore = Poi {
        id: "offshore".to_string(),
        lat: 70.0,
        lon: 8.68,
    };
    let grid = FakeGrid::new()
        .with_run("2024031206", 0..27)
        .uncovered_at(offshore.lat);

    let report = refresher_for(
        grid,
        dir.path(),
        vec![temperature()],
        vec![offshore, poi()],
        8,
        CancellationToken::new(),
    )
    .refresh_all_at(now())
    .await
    .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].poi, "offshore");
    assert!(matches!(
        report.failed[0].error,
        RefreshError::ExhaustedRetries { .. }
    ));
    assert_eq!(report.stored.len(), 1);
    assert_eq!(report.stored[0].poi, "ffm");
    assert_eq!(store.load("offshore", "27h").await.unwrap(), None);
    let document = store.load("ffm", "27h").await.unwrap().unwrap();
    assert_eq!(document.reference_timestamp, run_ms("2024031206"));
}
