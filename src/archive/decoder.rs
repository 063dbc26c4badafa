//! The seam between the scanner and whatever understands a particular file format.

use crate::archive::error::ArchiveError;
use crate::types::archive_kind::ArchiveKind;
use crate::weather_archive::LatLon;
use crate::Timeseries;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Series read from one archive file, keyed by upper-case source key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedArchive {
    pub series: BTreeMap<String, Timeseries>,
    /// Centre of the grid cell that was sampled, for gridded files.
    pub grid_cell: Option<LatLon>,
}

impl DecodedArchive {
    pub fn get(&self, key: &str) -> Option<&Timeseries> {
        self.series.get(&key.to_uppercase())
    }
}

#[async_trait]
pub trait ArchiveDecoder: Send + Sync {
    /// Reads `path`, sampling at `point` where the format is gridded.
    ///
    /// A missing file must be reported as [`ArchiveError::DataUnavailable`].
    async fn decode(&self, path: &Path, point: Option<LatLon>) -> Result<DecodedArchive, ArchiveError>;
}

/// The decoder used for each archive kind.
#[derive(Clone)]
pub struct DecoderSet {
    table: Arc<dyn ArchiveDecoder>,
    grid: Arc<dyn ArchiveDecoder>,
}

impl DecoderSet {
    pub fn new(table: Arc<dyn ArchiveDecoder>, grid: Arc<dyn ArchiveDecoder>) -> Self {
        Self { table, grid }
    }

    /// Uses one decoder for every kind.
    pub fn uniform(decoder: Arc<dyn ArchiveDecoder>) -> Self {
        Self {
            table: decoder.clone(),
            grid: decoder,
        }
    }

    pub fn for_kind(&self, kind: ArchiveKind) -> Arc<dyn ArchiveDecoder> {
        match kind {
            ArchiveKind::Observation | ArchiveKind::PointForecast => self.table.clone(),
            ArchiveKind::GriddedForecast => self.grid.clone(),
        }
    }
}

impl std::fmt::Debug for DecoderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderSet").finish_non_exhaustive()
    }
}
