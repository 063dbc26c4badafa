//! Reads DWD station tables (observation reports and extracted point forecasts).
//!
//! The tables are semicolon separated. The first three rows hold source keys, units and
//! descriptions; every following row starts with a `dd.mm.yy;HH:MM` UTC timestamp.
//! Numbers use a decimal comma and `---` marks a missing reading.

use crate::archive::decoder::{ArchiveDecoder, DecodedArchive};
use crate::archive::error::ArchiveError;
use crate::weather_archive::LatLon;
use crate::Timeseries;
use async_compression::tokio::bufread::GzipDecoder;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::debug;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, BufReader};
use tokio::task;

const HEADER_ROWS: usize = 3;
const MISSING_MARKER: &str = "---";

#[derive(Debug, Clone, Copy, Default)]
pub struct TableDecoder;

impl TableDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Reads the file, transparently inflating `.gz` bundles.
    async fn read_bytes(path: &Path) -> Result<Vec<u8>, ArchiveError> {
        if path.extension().is_some_and(|ext| ext == "gz") {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| ArchiveError::from_io(path, e))?;
            let mut decoder = GzipDecoder::new(BufReader::new(file));
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .await
                .map_err(|e| ArchiveError::decode(path, format!("gzip stream: {e}")))?;
            Ok(decompressed)
        } else {
            tokio::fs::read(path)
                .await
                .map_err(|e| ArchiveError::from_io(path, e))
        }
    }

    /// Parses raw table bytes into one series per source key.
    pub fn parse_table(bytes: Vec<u8>, path: &Path) -> Result<BTreeMap<String, Timeseries>, ArchiveError> {
        let df = CsvReadOptions::default()
            .with_has_header(false)
            .with_infer_schema_length(Some(0))
            .map_parse_options(|opts| opts.with_separator(b';').with_truncate_ragged_lines(true))
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()
            .map_err(|e| ArchiveError::Csv(path.to_path_buf(), e))?;

        if df.height() <= HEADER_ROWS || df.width() < 3 {
            return Err(ArchiveError::decode(path, "table holds no data rows"));
        }

        let columns = df
            .get_columns()
            .iter()
            .map(|column| column.str().map(|ca| ca.into_iter().collect::<Vec<_>>()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ArchiveError::Csv(path.to_path_buf(), e))?;

        let timestamps = (HEADER_ROWS..df.height())
            .map(|row| match (columns[0][row], columns[1][row]) {
                (Some(date), Some(time)) => parse_timestamp(date, time).ok_or_else(|| {
                    ArchiveError::decode(path, format!("bad timestamp '{date};{time}' in row {row}"))
                }),
                _ => Err(ArchiveError::decode(path, format!("missing timestamp in row {row}"))),
            })
            .collect::<Result<Vec<i64>, _>>()?;

        let mut series = BTreeMap::new();
        for column in &columns[2..] {
            let Some(key) = column[0].map(str::trim).filter(|k| !k.is_empty()) else {
                continue;
            };
            let values = column[HEADER_ROWS..]
                .iter()
                .map(|cell| {
                    let raw = cell.unwrap_or_default();
                    parse_value(raw)
                        .ok_or_else(|| ArchiveError::decode(path, format!("bad value '{raw}' for {key}")))
                })
                .collect::<Result<Vec<f64>, _>>()?;
            series.insert(
                key.to_uppercase(),
                Timeseries::from_pairs(timestamps.iter().copied().zip(values)),
            );
        }
        debug!("Parsed {} series from {}", series.len(), path.display());
        Ok(series)
    }
}

#[async_trait]
impl ArchiveDecoder for TableDecoder {
    async fn decode(&self, path: &Path, _point: Option<LatLon>) -> Result<DecodedArchive, ArchiveError> {
        let bytes = Self::read_bytes(path).await?;
        let path_buf: PathBuf = path.to_path_buf();
        let series = task::spawn_blocking(move || Self::parse_table(bytes, &path_buf)).await??;
        Ok(DecodedArchive {
            series,
            grid_cell: None,
        })
    }
}

fn parse_timestamp(date: &str, time: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(&format!("{} {}", date.trim(), time.trim()), "%d.%m.%y %H:%M")
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}

fn parse_value(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() || cell == MISSING_MARKER {
        return Some(f64::NAN);
    }
    cell.replace(',', ".").parse().ok()
}
