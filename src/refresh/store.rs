//! On-disk cache of forecast documents, one JSON file per point of interest and horizon.
//!
//! Entries are written to a temporary file in the cache directory and renamed into
//! place, so readers see either the previous or the new document.

use crate::refresh::error::RefreshError;
use crate::types::forecast::ForecastDocument;
use crate::utils::ensure_cache_dir_exists;
use log::debug;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::task;

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, poi: &str, horizon: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", file_safe(poi), file_safe(horizon)))
    }

    /// Creates the cache directory if needed.
    pub async fn ensure_dir(&self) -> Result<(), RefreshError> {
        ensure_cache_dir_exists(&self.dir)
            .await
            .map_err(|e| RefreshError::CacheDirCreation(self.dir.clone(), e))
    }

    /// Reads an entry. `Ok(None)` means the entry was never written.
    pub async fn load(&self, poi: &str, horizon: &str) -> Result<Option<ForecastDocument>, RefreshError> {
        let path = self.entry_path(poi, horizon);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RefreshError::CacheRead(path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RefreshError::CacheDecode(path, e))
    }

    /// Replaces the entry for `(poi, horizon)` with `document`.
    pub async fn store(
        &self,
        poi: &str,
        horizon: &str,
        document: &ForecastDocument,
    ) -> Result<PathBuf, RefreshError> {
        let bytes = serde_json::to_vec(document).map_err(RefreshError::CacheEncode)?;
        let target = self.entry_path(poi, horizon);
        let dir = self.dir.clone();
        let target_clone = target.clone();
        task::spawn_blocking(move || write_atomically(&dir, &target_clone, &bytes)).await??;
        debug!("Stored cache entry {}", target.display());
        Ok(target)
    }
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), RefreshError> {
    let to_error = |e: io::Error| RefreshError::CacheWrite(target.to_path_buf(), e);
    let mut temp_file = NamedTempFile::new_in(dir).map_err(to_error)?;
    temp_file.write_all(bytes).map_err(to_error)?;
    temp_file.as_file().sync_all().map_err(to_error)?;
    temp_file
        .persist(target)
        .map_err(|e| to_error(e.error))?;
    Ok(())
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '.') { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::forecast::{ForecastModel, Poi};

    fn document(reference_timestamp: i64) -> ForecastDocument {
        ForecastDocument {
            source_reference: ForecastModel::CosmoD2.source_reference(),
            forecast_model_type: "COSMO-D2".to_string(),
            location: None,
            poi: Poi {
                id: "ffm".to_string(),
                lat: 50.1,
                lon: 8.7,
            },
            reference_timestamp,
            query_timestamp: reference_timestamp + 1,
            forecasts: vec![],
        }
    }

    #[tokio::test]
    async fn test_store_replaces_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));
        store.ensure_dir().await.unwrap();

        assert_eq!(store.load("ffm", "27h").await.unwrap(), None);
        store.store("ffm", "27h", &document(1)).await.unwrap();
        let path = store.store("ffm", "27h", &document(2)).await.unwrap();
        assert_eq!(path, store.dir().join("ffm_27h.json"));
        assert_eq!(store.load("ffm", "27h").await.unwrap(), Some(document(2)));

        let mut entries = tokio::fs::read_dir(store.dir()).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1, "no temporary files are left behind");
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        tokio::fs::write(&file, b"x").await.unwrap();
        let err = CacheStore::new(&file).ensure_dir().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_entry_names_are_file_safe() {
        let store = CacheStore::new("/cache");
        assert_eq!(store.entry_path("a/b c", "45h"), PathBuf::from("/cache/a_b_c_45h.json"));
    }
}
