//! Points of interest, forecast models and the cached forecast document.

use crate::types::archive_kind::{Archive, MosmixRun, PointForecastFormat};
use crate::Timeseries;
use chrono::{DateTime, Duration, DurationRound, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed location for which forecasts are cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
}

/// Where the served forecast came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    pub name: String,
    pub url: String,
}

/// Centre of the grid cell (or station) the forecast was sampled at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLocation {
    pub lon: f64,
    pub lat: f64,
}

/// One quantity's series with its display label and unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSeries {
    pub label: String,
    pub unit: String,
    pub data: Timeseries,
}

/// The document cached per `(POI, horizon)`. Always written whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastDocument {
    pub source_reference: SourceReference,
    pub forecast_model_type: String,
    pub location: Option<GridLocation>,
    pub poi: Poi,
    /// Reference run, epoch milliseconds.
    pub reference_timestamp: i64,
    /// Time the document was assembled, epoch milliseconds.
    pub query_timestamp: i64,
    pub forecasts: Vec<LabeledSeries>,
}

/// Forecast products the refresher can cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum ForecastModel {
    /// Gridded model, new run every 3 hours, sampled at the POI coordinates.
    #[default]
    CosmoD2,
    /// Point forecast at the station nearest to the POI, runs at 03, 09, 15 and 21 UTC.
    Mosmix {
        #[serde(default)]
        format: PointForecastFormat,
    },
}

impl ForecastModel {
    pub fn cadence_hours(&self) -> i64 {
        match self {
            ForecastModel::CosmoD2 => 3,
            ForecastModel::Mosmix { .. } => 6,
        }
    }

    pub fn cadence(&self) -> TimeDelta {
        Duration::hours(self.cadence_hours())
    }

    /// Hour of the first run of a UTC day.
    fn first_run_hour(&self) -> i64 {
        match self {
            ForecastModel::CosmoD2 => 0,
            ForecastModel::Mosmix { .. } => 3,
        }
    }

    /// The most recent nominal run at or before `now`.
    pub fn latest_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let offset = Duration::hours(self.first_run_hour());
        let shifted = now - offset;
        let aligned = shifted
            .duration_trunc(self.cadence())
            .unwrap_or(shifted);
        aligned + offset
    }

    /// The archive holding the given run of this model.
    pub fn archive_for_run(&self, run: DateTime<Utc>) -> Option<Archive> {
        match self {
            ForecastModel::CosmoD2 => Some(Archive::GriddedForecast { reference_run: run }),
            ForecastModel::Mosmix { format } => {
                MosmixRun::from_hour(run.hour()).map(|run| Archive::PointForecast {
                    run,
                    format: *format,
                })
            }
        }
    }

    pub fn uses_stations(&self) -> bool {
        matches!(self, ForecastModel::Mosmix { .. })
    }

    pub fn model_type(&self) -> &'static str {
        match self {
            ForecastModel::CosmoD2 => "COSMO-D2",
            ForecastModel::Mosmix { .. } => "MOSMIX_L",
        }
    }

    pub fn source_reference(&self) -> SourceReference {
        let (name, url) = match self {
            ForecastModel::CosmoD2 => (
                "Deutscher Wetterdienst, COSMO-D2",
                "https://opendata.dwd.de/weather/nwp/cosmo-d2/grib/",
            ),
            ForecastModel::Mosmix { .. } => (
                "Deutscher Wetterdienst, MOSMIX",
                "https://opendata.dwd.de/weather/local_forecasts/mos/MOSMIX_L/",
            ),
        };
        SourceReference {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

impl fmt::Display for ForecastModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_type())
    }
}
