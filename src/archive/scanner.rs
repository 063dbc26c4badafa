//! Enumerates the partitions covering a time window and decodes them concurrently.
//!
//! A file that is missing or fails to decode is logged and dropped; the rest of the
//! window is still returned.

use crate::archive::decoder::{ArchiveDecoder, DecodedArchive, DecoderSet};
use crate::archive::error::ArchiveError;
use crate::config::ArchiveRoots;
use crate::error::ConfigurationError;
use crate::types::archive_kind::{Archive, ArchiveKind, PointForecastFormat};
use crate::weather_archive::LatLon;
use crate::Timeseries;
use bon::bon;
use futures_util::stream::{self, StreamExt};
use log::{debug, warn};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MS_PER_HOUR: i64 = 3_600_000;

/// An inclusive time range in epoch milliseconds, walked at `cadence_hours`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub start: i64,
    pub end: i64,
    pub cadence_hours: i64,
}

impl ScanWindow {
    pub fn new(start: i64, end: i64, cadence_hours: i64) -> Self {
        Self {
            start,
            end,
            cadence_hours,
        }
    }
}

/// Lists the distinct partition files covering `window`, in walk order.
///
/// The walk starts at the beginning of the cadence bucket containing `window.start`
/// and steps while the cursor is not after `window.end`. Steps that resolve to an
/// already listed file are skipped. Gridded forecasts skip steps before their run.
pub fn partition_paths(
    base: &Path,
    archive: &Archive,
    id: &str,
    window: &ScanWindow,
) -> Result<Vec<PathBuf>, ConfigurationError> {
    if window.cadence_hours <= 0 {
        return Err(ConfigurationError::InvalidCadence(window.cadence_hours));
    }
    let cadence = window.cadence_hours * MS_PER_HOUR;
    let first_valid = match archive {
        Archive::GriddedForecast { reference_run } => reference_run.timestamp_millis(),
        _ => i64::MIN,
    };

    let mut cursor = window.start.div_euclid(cadence) * cadence;
    let mut seen = HashSet::new();
    let mut paths = Vec::new();
    while cursor <= window.end {
        if cursor >= first_valid {
            let path = archive.resolve(base, cursor, id)?;
            if seen.insert(path.clone()) {
                paths.push(path);
            }
        }
        cursor += cadence;
    }
    Ok(paths)
}

/// [`partition_paths`] taking the string selectors used at the request boundary.
pub fn scan_paths(
    base: &Path,
    kind: &str,
    start: i64,
    end: i64,
    id: &str,
    run: Option<&str>,
    cadence_hours: i64,
) -> Result<Vec<PathBuf>, ConfigurationError> {
    let archive = Archive::from_parts(kind, run, PointForecastFormat::default())?;
    partition_paths(base, &archive, id, &ScanWindow::new(start, end, cadence_hours))
}

/// Merged result of a scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    /// One series per source key, restricted to the scan window.
    pub series: BTreeMap<String, Timeseries>,
    /// Grid cell of the first file that reported one.
    pub grid_cell: Option<LatLon>,
    pub files_read: usize,
    pub files_dropped: usize,
}

impl ScanResult {
    pub fn get(&self, key: &str) -> Option<&Timeseries> {
        self.series.get(&key.to_uppercase())
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveScanner {
    roots: ArchiveRoots,
    decoders: DecoderSet,
    concurrency: usize,
    decode_timeout: Duration,
    cancel: CancellationToken,
}

#[bon]
impl ArchiveScanner {
    #[builder]
    pub fn new(
        roots: ArchiveRoots,
        decoders: DecoderSet,
        #[builder(default = 4)] concurrency: usize,
        #[builder(default = Duration::from_secs(60))] decode_timeout: Duration,
        #[builder(default)] cancel: CancellationToken,
    ) -> Self {
        Self {
            roots,
            decoders,
            concurrency: concurrency.max(1),
            decode_timeout,
            cancel,
        }
    }

    pub fn root(&self, kind: ArchiveKind) -> &Path {
        self.roots.root(kind)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Decodes every partition of `archive` covering `window` and merges the results.
    ///
    /// Within a key, samples from earlier partitions win over later ones when
    /// timestamps collide. Only [`ArchiveError::Cancelled`] and configuration errors
    /// abort the scan.
    pub async fn scan(
        &self,
        archive: &Archive,
        id: &str,
        window: ScanWindow,
        point: Option<LatLon>,
    ) -> Result<ScanResult, ArchiveError> {
        let paths = partition_paths(self.root(archive.kind()), archive, id, &window)?;
        let decoder = self.decoders.for_kind(archive.kind());
        debug!(
            "Scanning {} partitions of {} for '{}'",
            paths.len(),
            archive.kind(),
            id
        );

        let mut outcomes: Vec<(usize, PathBuf, Result<DecodedArchive, ArchiveError>)> =
            stream::iter(paths.into_iter().enumerate())
                .map(|(index, path)| {
                    let decoder = decoder.clone();
                    async move {
                        let outcome = self.decode_with(decoder.as_ref(), &path, point).await;
                        (index, path, outcome)
                    }
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut result = ScanResult::default();
        let mut parts: BTreeMap<String, Vec<Timeseries>> = BTreeMap::new();
        for (_, path, outcome) in outcomes {
            match outcome {
                Ok(decoded) => {
                    result.files_read += 1;
                    if result.grid_cell.is_none() {
                        result.grid_cell = decoded.grid_cell;
                    }
                    for (key, series) in decoded.series {
                        parts.entry(key).or_default().push(series);
                    }
                }
                Err(ArchiveError::Cancelled) => return Err(ArchiveError::Cancelled),
                Err(e) if e.is_unavailable() => {
                    debug!("Skipping missing partition {}", path.display());
                    result.files_dropped += 1;
                }
                Err(e) => {
                    warn!("Dropping {} from scan: {}", path.display(), e);
                    result.files_dropped += 1;
                }
            }
        }
        result.series = parts
            .into_iter()
            .map(|(key, parts)| (key, Timeseries::merge(parts).within(window.start, window.end)))
            .collect();
        Ok(result)
    }

    /// Decodes one file with the decoder for `kind`, honouring timeout and cancellation.
    pub async fn decode_path(
        &self,
        kind: ArchiveKind,
        path: &Path,
        point: Option<LatLon>,
    ) -> Result<DecodedArchive, ArchiveError> {
        let decoder = self.decoders.for_kind(kind);
        self.decode_with(decoder.as_ref(), path, point).await
    }

    async fn decode_with(
        &self,
        decoder: &dyn ArchiveDecoder,
        path: &Path,
        point: Option<LatLon>,
    ) -> Result<DecodedArchive, ArchiveError> {
        if self.cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ArchiveError::Cancelled),
            outcome = tokio::time::timeout(self.decode_timeout, decoder.decode(path, point)) => {
                outcome.unwrap_or_else(|_| {
                    Err(ArchiveError::DecodeTimeout {
                        path: path.to_path_buf(),
                        timeout: self.decode_timeout,
                    })
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn ms(d: u32, h: u32, min: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 3, d, h, min, 0).unwrap().timestamp_millis()
    }

    #[test]
    fn test_two_day_boundaries_give_three_partitions() {
        let base = Path::new("/beob");
        let expected: Vec<PathBuf> = ["20240311", "20240312", "20240313"]
            .iter()
            .map(|day| base.join(day).join("10637-BEOB.csv"))
            .collect();
        for (start, end) in [
            (ms(11, 0, 0), ms(13, 0, 0)),
            (ms(11, 10, 30), ms(13, 5, 0)),
            (ms(11, 1, 0), ms(13, 23, 59)),
            (ms(11, 23, 59), ms(13, 0, 1)),
        ] {
            let paths = partition_paths(
                base,
                &Archive::Observation,
                "10637",
                &ScanWindow::new(start, end, 24),
            )
            .unwrap();
            assert_eq!(paths, expected, "window {start}..{end}");
        }
    }

    #[test]
    fn test_finer_cadence_deduplicates_paths() {
        let paths = scan_paths(Path::new("/beob"), "observation", ms(11, 0, 0), ms(12, 23, 0), "E434", None, 1)
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("20240311/E434_-BEOB.csv"));
    }

    #[test]
    fn test_invalid_cadence() {
        let err = scan_paths(Path::new("/"), "observation", 0, 1, "x", None, 0).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidCadence(0)));
    }

    #[test]
    fn test_gridded_partitions_start_at_run() {
        let paths = scan_paths(Path::new("/nwp"), "gridded_forecast", ms(12, 0, 0), ms(12, 8, 0), "T_2M", Some("2024031206"), 1)
            .unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths[0].to_string_lossy().ends_with("_2024031206_000_T_2M.grib2.bz2"));
    }

    enum Fixture {
        Series(Vec<(i64, f64)>),
        Broken,
        Hang,
    }

    struct FixtureDecoder {
        files: HashMap<PathBuf, Fixture>,
    }

    #[async_trait]
    impl ArchiveDecoder for FixtureDecoder {
        async fn decode(&self, path: &Path, _point: Option<LatLon>) -> Result<DecodedArchive, ArchiveError> {
            match self.files.get(path) {
                None => Err(ArchiveError::DataUnavailable(path.to_path_buf())),
                Some(Fixture::Broken) => Err(ArchiveError::decode(path, "truncated")),
                Some(Fixture::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ArchiveError::decode(path, "unreachable"))
                }
                Some(Fixture::Series(pairs)) => Ok(DecodedArchive {
                    series: BTreeMap::from([("TT".to_string(), Timeseries::from_pairs(pairs.clone()))]),
                    grid_cell: None,
                }),
            }
        }
    }

    fn scanner(files: HashMap<PathBuf, Fixture>, cancel: CancellationToken) -> ArchiveScanner {
        ArchiveScanner::builder()
            .roots(ArchiveRoots::uniform("/beob"))
            .decoders(DecoderSet::uniform(Arc::new(FixtureDecoder { files })))
            .concurrency(2)
            .decode_timeout(Duration::from_millis(200))
            .cancel(cancel)
            .build()
    }

    #[tokio::test]
    async fn test_scan_drops_failing_files_and_merges_rest() {
        let day = |d: &str| PathBuf::from("/beob").join(d).join("10637-BEOB.csv");
        let files = HashMap::from([
            (
                day("20240311"),
                Fixture::Series(vec![(ms(11, 23, 0), 1.0), (ms(12, 0, 0), 2.0)]),
            ),
            (day("20240312"), Fixture::Broken),
            (
                day("20240313"),
                Fixture::Series(vec![(ms(13, 1, 0), 4.0), (ms(12, 0, 0), 9.0), (ms(13, 9, 0), 5.0)]),
            ),
            (day("20240314"), Fixture::Hang),
        ]);
        let result = scanner(files, CancellationToken::new())
            .scan(
                &Archive::Observation,
                "10637",
                ScanWindow::new(ms(11, 12, 0), ms(14, 6, 0), 24),
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.files_read, 2);
        assert_eq!(result.files_dropped, 2);
        let tt = result.get("tt").unwrap();
        assert_eq!(
            tt.samples().iter().map(|s| (s.timestamp, s.value)).collect::<Vec<_>>(),
            vec![
                (ms(11, 23, 0), 1.0),
                (ms(12, 0, 0), 2.0),
                (ms(13, 1, 0), 4.0),
                (ms(13, 9, 0), 5.0)
            ]
        );
    }

    #[tokio::test]
    async fn test_scan_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = scanner(HashMap::new(), cancel)
            .scan(
                &Archive::Observation,
                "10637",
                ScanWindow::new(ms(11, 0, 0), ms(12, 0, 0), 24),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Cancelled));
    }
}
