//! Samples gridded model files by running an external decoder program.
//!
//! The program is called as `<program> [args..] <file> <lat> <lon>` and prints one line
//! per sampled value: `<KEY> <epoch_ms> <cell_lat> <cell_lon> <value>`.

use crate::archive::decoder::{ArchiveDecoder, DecodedArchive};
use crate::archive::error::ArchiveError;
use crate::weather_archive::LatLon;
use crate::{Sample, Timeseries};
use async_trait::async_trait;
use log::debug;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct GridCommandDecoder {
    program: PathBuf,
    args: Vec<String>,
}

impl GridCommandDecoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments placed before the file and coordinate.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn parse_output(stdout: &str, path: &Path) -> Result<DecodedArchive, ArchiveError> {
        let mut samples: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
        let mut grid_cell = None;
        for (n, line) in stdout.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [key, timestamp, lat, lon, value] = fields[..] else {
                return Err(ArchiveError::decode(path, format!("line {}: expected 5 fields", n + 1)));
            };
            let bad = |what: &str| ArchiveError::decode(path, format!("line {}: bad {what}", n + 1));
            let timestamp: i64 = timestamp.parse().map_err(|_| bad("timestamp"))?;
            let cell = LatLon(
                lat.parse().map_err(|_| bad("latitude"))?,
                lon.parse().map_err(|_| bad("longitude"))?,
            );
            let value: f64 = value.parse().map_err(|_| bad("value"))?;
            grid_cell.get_or_insert(cell);
            samples
                .entry(key.to_uppercase())
                .or_default()
                .push(Sample::new(timestamp, value));
        }
        Ok(DecodedArchive {
            series: samples
                .into_iter()
                .map(|(key, samples)| (key, Timeseries::from_unsorted(samples)))
                .collect(),
            grid_cell,
        })
    }
}

#[async_trait]
impl ArchiveDecoder for GridCommandDecoder {
    async fn decode(&self, path: &Path, point: Option<LatLon>) -> Result<DecodedArchive, ArchiveError> {
        let point = point.ok_or_else(|| ArchiveError::decode(path, "gridded file needs a coordinate"))?;
        tokio::fs::metadata(path)
            .await
            .map_err(|e| ArchiveError::from_io(path, e))?;

        debug!("Sampling {} at {:?} with {}", path.display(), point, self.program.display());
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .arg(point.0.to_string())
            .arg(point.1.to_string())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ArchiveError::Io(self.program.clone(), e))?;

        if !output.status.success() {
            return Err(ArchiveError::decode(
                path,
                format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Self::parse_output(&String::from_utf8_lossy(&output.stdout), path)
    }
}
