//! Maps a request onto the partition file that holds it.
//!
//! Layouts, relative to the archive root of each kind:
//!
//! * observations: `<YYYYMMDD>/<id>-BEOB.csv`, ids shorter than five characters are
//!   padded with `_` (`E434_-BEOB.csv`)
//! * gridded forecasts since 2018-05-15T09:00Z:
//!   `<run>/<key>/cosmo-d2_germany_regular-lat-lon_single-level_<run>_<HHH>_<KEY>.grib2.bz2`
//! * gridded forecasts before that:
//!   `cosmo-de/<run>/<key>/COSMODE_single_level_elements_<KEY>_<run>_<HHH>.grib2.bz2`
//! * point forecasts: `<YYYYMMDD><RR>/MOSMIX_L_<YYYYMMDD><RR>_<id>.csv[.gz]`
//!
//! `<run>` is the reference run as `YYYYMMDDHH`, `<HHH>` the forecast hour offset.

use crate::error::ConfigurationError;
use crate::types::archive_kind::{Archive, PointForecastFormat};
use crate::types::into_utc_trait::from_epoch_millis;
use std::path::{Path, PathBuf};

/// First run published under the COSMO-D2 naming, 2018-05-15T09:00Z.
pub const GRIDDED_CUTOVER_MS: i64 = 1_526_374_800_000;

const MS_PER_HOUR: i64 = 3_600_000;
const OBSERVATION_ID_WIDTH: usize = 5;

/// Resolves a partition path from the string selectors used at the request boundary.
///
/// `id` is the station id for observations and point forecasts and the quantity key
/// for gridded forecasts.
pub fn resolve_path(
    base: &Path,
    kind: &str,
    timestamp: i64,
    id: &str,
    run: Option<&str>,
) -> Result<PathBuf, ConfigurationError> {
    Archive::from_parts(kind, run, PointForecastFormat::default())?.resolve(base, timestamp, id)
}

impl Archive {
    /// The file under `base` holding `id` at `timestamp`.
    pub fn resolve(&self, base: &Path, timestamp: i64, id: &str) -> Result<PathBuf, ConfigurationError> {
        let at = from_epoch_millis(timestamp).ok_or(ConfigurationError::InvalidTimestamp(timestamp))?;
        match self {
            Archive::Observation => {
                let file = if id.len() >= OBSERVATION_ID_WIDTH {
                    format!("{id}-BEOB.csv")
                } else {
                    format!("{:_<width$}-BEOB.csv", id, width = OBSERVATION_ID_WIDTH)
                };
                Ok(base.join(at.format("%Y%m%d").to_string()).join(file))
            }
            Archive::GriddedForecast { reference_run } => {
                let run_ms = reference_run.timestamp_millis();
                if timestamp < run_ms {
                    return Err(ConfigurationError::NegativeForecastOffset {
                        reference_run: run_ms,
                        timestamp,
                    });
                }
                let offset = (timestamp - run_ms) / MS_PER_HOUR;
                let run = reference_run.format("%Y%m%d%H").to_string();
                let lower = id.to_lowercase();
                let upper = id.to_uppercase();
                if run_ms < GRIDDED_CUTOVER_MS {
                    Ok(base.join("cosmo-de").join(&run).join(lower).join(format!(
                        "COSMODE_single_level_elements_{upper}_{run}_{offset:03}.grib2.bz2"
                    )))
                } else {
                    Ok(base.join(&run).join(lower).join(format!(
                        "cosmo-d2_germany_regular-lat-lon_single-level_{run}_{offset:03}_{upper}.grib2.bz2"
                    )))
                }
            }
            Archive::PointForecast { run, format } => {
                let partition = format!("{}{}", at.format("%Y%m%d"), run.selector());
                Ok(base
                    .join(&partition)
                    .join(format!("MOSMIX_L_{partition}_{id}.{}", format.extension())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ms(y: i32, m: u32, d: u32, h: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().timestamp_millis()
    }

    #[test]
    fn test_cutover_constant() {
        assert_eq!(GRIDDED_CUTOVER_MS, ms(2018, 5, 15, 9));
    }

    #[test]
    fn test_observation_paths() {
        let base = Path::new("/data/beob");
        let ts = ms(2024, 3, 12, 17);
        assert_eq!(
            resolve_path(base, "observation", ts, "10637", None).unwrap(),
            PathBuf::from("/data/beob/20240312/10637-BEOB.csv")
        );
        assert_eq!(
            resolve_path(base, "observation", ts, "E434", None).unwrap(),
            PathBuf::from("/data/beob/20240312/E434_-BEOB.csv")
        );
    }

    #[test]
    fn test_gridded_naming_eras() {
        let base = Path::new("/data/nwp");
        let before = resolve_path(base, "gridded_forecast", ms(2018, 5, 15, 8), "T_2M", Some("2018051506"))
            .unwrap();
        assert_eq!(
            before,
            PathBuf::from(
                "/data/nwp/cosmo-de/2018051506/t_2m/COSMODE_single_level_elements_T_2M_2018051506_002.grib2.bz2"
            )
        );
        let after = resolve_path(base, "gridded_forecast", ms(2018, 5, 16, 9), "t_2m", Some("2018051509"))
            .unwrap();
        assert_eq!(
            after,
            PathBuf::from(
                "/data/nwp/2018051509/t_2m/cosmo-d2_germany_regular-lat-lon_single-level_2018051509_024_T_2M.grib2.bz2"
            )
        );
    }

    #[test]
    fn test_gridded_rejects_time_before_run() {
        let err = resolve_path(Path::new("/"), "gridded_forecast", ms(2024, 1, 1, 0), "PMSL", Some("2024010103"))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::NegativeForecastOffset { .. }));
    }

    #[test]
    fn test_point_forecast_paths() {
        let base = Path::new("/data/mosmix");
        assert_eq!(
            resolve_path(base, "point_forecast", ms(2024, 3, 12, 0), "10637", Some("09")).unwrap(),
            PathBuf::from("/data/mosmix/2024031209/MOSMIX_L_2024031209_10637.csv.gz")
        );
        let extracted = Archive::PointForecast {
            run: crate::types::archive_kind::MosmixRun::R21,
            format: PointForecastFormat::Extracted,
        };
        assert_eq!(
            extracted.resolve(base, ms(2024, 3, 12, 0), "10637").unwrap(),
            PathBuf::from("/data/mosmix/2024031221/MOSMIX_L_2024031221_10637.csv")
        );
    }

    #[test]
    fn test_unknown_kind_and_run() {
        assert!(matches!(
            resolve_path(Path::new("/"), "satellite", 0, "x", None),
            Err(ConfigurationError::UnknownArchiveKind(_))
        ));
        assert!(matches!(
            resolve_path(Path::new("/"), "mosmix", 0, "x", Some("12")),
            Err(ConfigurationError::UnknownRunSelector(_))
        ));
    }
}
