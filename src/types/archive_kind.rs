//! Defines the kinds of on-disk archives and the run selectors that address them.
//!
//! Requests arrive with string selectors (`"observation"`, `"09"`, `"2024031206"`);
//! these are parsed into the typed [`Archive`] once, at the boundary, and unknown
//! values are reported as [`ConfigurationError`] rather than defaulted.

use crate::error::ConfigurationError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three archive trees served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    /// Observed station reports (BEOB), one file per station per UTC day.
    Observation,
    /// Gridded numerical model output, one file per run, quantity and forecast hour.
    GriddedForecast,
    /// Post-processed point forecasts (MOSMIX), one file per run and station.
    PointForecast,
}

impl ArchiveKind {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            ArchiveKind::Observation => "observation",
            ArchiveKind::GriddedForecast => "gridded_forecast",
            ArchiveKind::PointForecast => "point_forecast",
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArchiveKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "observation" | "beob" => Ok(ArchiveKind::Observation),
            "gridded_forecast" | "cosmo-d2" | "cosmo" => Ok(ArchiveKind::GriddedForecast),
            "point_forecast" | "mosmix" => Ok(ArchiveKind::PointForecast),
            _ => Err(ConfigurationError::UnknownArchiveKind(s.to_string())),
        }
    }
}

/// The four daily MOSMIX runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MosmixRun {
    R03,
    R09,
    R15,
    R21,
}

impl MosmixRun {
    pub const ALL: [MosmixRun; 4] = [MosmixRun::R03, MosmixRun::R09, MosmixRun::R15, MosmixRun::R21];

    pub fn hour(&self) -> u32 {
        match self {
            MosmixRun::R03 => 3,
            MosmixRun::R09 => 9,
            MosmixRun::R15 => 15,
            MosmixRun::R21 => 21,
        }
    }

    pub fn selector(&self) -> &'static str {
        match self {
            MosmixRun::R03 => "03",
            MosmixRun::R09 => "09",
            MosmixRun::R15 => "15",
            MosmixRun::R21 => "21",
        }
    }

    pub fn from_hour(hour: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|run| run.hour() == hour)
    }
}

impl FromStr for MosmixRun {
    type Err = ConfigurationError;

    /// Accepts `"09"` as well as `"R09"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let selector = trimmed
            .strip_prefix('R')
            .or_else(|| trimmed.strip_prefix('r'))
            .unwrap_or(trimmed);
        Self::ALL
            .into_iter()
            .find(|run| run.selector() == selector)
            .ok_or_else(|| ConfigurationError::UnknownRunSelector(s.to_string()))
    }
}

impl fmt::Display for MosmixRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.selector())
    }
}

/// Whether a point forecast is read from the compressed bundle or the extracted table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointForecastFormat {
    #[default]
    Compressed,
    Extracted,
}

impl PointForecastFormat {
    pub(crate) fn extension(&self) -> &'static str {
        match self {
            PointForecastFormat::Compressed => "csv.gz",
            PointForecastFormat::Extracted => "csv",
        }
    }
}

/// A fully specified archive: the kind plus whatever run selection it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Archive {
    Observation,
    GriddedForecast { reference_run: DateTime<Utc> },
    PointForecast {
        run: MosmixRun,
        format: PointForecastFormat,
    },
}

impl Archive {
    pub fn kind(&self) -> ArchiveKind {
        match self {
            Archive::Observation => ArchiveKind::Observation,
            Archive::GriddedForecast { .. } => ArchiveKind::GriddedForecast,
            Archive::PointForecast { .. } => ArchiveKind::PointForecast,
        }
    }

    /// Builds an archive from the string selectors used at the request boundary.
    ///
    /// Gridded forecasts expect the reference run as `YYYYMMDDHH`, point forecasts
    /// one of `"03"`, `"09"`, `"15"`, `"21"`. Observations take no run.
    pub fn from_parts(
        kind: &str,
        run: Option<&str>,
        format: PointForecastFormat,
    ) -> Result<Self, ConfigurationError> {
        let kind: ArchiveKind = kind.parse()?;
        match kind {
            ArchiveKind::Observation => Ok(Archive::Observation),
            ArchiveKind::GriddedForecast => {
                let run = run.ok_or(ConfigurationError::MissingRun(kind))?;
                Ok(Archive::GriddedForecast {
                    reference_run: parse_run_timestamp(run)?,
                })
            }
            ArchiveKind::PointForecast => {
                let run = run.ok_or(ConfigurationError::MissingRun(kind))?;
                Ok(Archive::PointForecast {
                    run: run.parse()?,
                    format,
                })
            }
        }
    }
}

/// Parses a `YYYYMMDDHH` run string as a UTC instant.
pub fn parse_run_timestamp(run: &str) -> Result<DateTime<Utc>, ConfigurationError> {
    let run = run.trim();
    if run.len() != 10 || !run.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigurationError::InvalidRun(run.to_string()));
    }
    NaiveDateTime::parse_from_str(&format!("{run}00"), "%Y%m%d%H%M")
        .map(|naive| naive.and_utc())
        .map_err(|_| ConfigurationError::InvalidRun(run.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unknown_kind_is_configuration_error() {
        let err = "radar".parse::<ArchiveKind>().unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownArchiveKind(k) if k == "radar"));
    }

    #[test]
    fn test_mosmix_run_selectors() {
        assert_eq!("09".parse::<MosmixRun>().unwrap(), MosmixRun::R09);
        assert_eq!("R21".parse::<MosmixRun>().unwrap(), MosmixRun::R21);
        assert!(matches!(
            "06".parse::<MosmixRun>(),
            Err(ConfigurationError::UnknownRunSelector(_))
        ));
        assert_eq!(MosmixRun::from_hour(21), Some(MosmixRun::R21));
        assert_eq!(MosmixRun::from_hour(0), None);
    }

    #[test]
    fn test_archive_from_parts() {
        let archive = Archive::from_parts("gridded_forecast", Some("2024031206"), Default::default())
            .unwrap();
        assert_eq!(
            archive,
            Archive::GriddedForecast {
                reference_run: Utc.with_ymd_and_hms(2024, 3, 12, 6, 0, 0).unwrap()
            }
        );
        assert!(matches!(
            Archive::from_parts("mosmix", None, Default::default()),
            Err(ConfigurationError::MissingRun(ArchiveKind::PointForecast))
        ));
        assert!(matches!(
            Archive::from_parts("gridded_forecast", Some("2024-03-12"), Default::default()),
            Err(ConfigurationError::InvalidRun(_))
        ));
        assert_eq!(
            Archive::from_parts("observation", Some("ignored"), Default::default()).unwrap(),
            Archive::Observation
        );
    }
}
