use crate::stations::catalog::load_catalog;
use crate::stations::error::LocateStationError;
use crate::types::station::{Station, StationMatch};
use crate::weather_archive::LatLon;
use bincode::config::{Configuration, Fixint, LittleEndian};
use haversine::{distance, Location as HaversineLocation, Units};
use log::{debug, info, warn};
use ordered_float::OrderedFloat;
use rstar::RTree;
use std::collections::HashMap;
use std::path::Path;

const BINCODE_CACHE_FILE_NAME: &str = "station_catalog.bin";
const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();
/// R-Tree candidates checked with haversine when looking for the nearest station.
const NEAREST_CANDIDATES: usize = 16;

#[derive(Debug, Clone)]
pub struct StationLocator {
    rtree: RTree<Station>,
    stations: Vec<Station>,
    by_id: HashMap<String, usize>,
}

impl StationLocator {
    /// Loads the catalog at `catalog_path`, reusing the bincode cache in `cache_dir` while
    /// it is at least as new as the catalog text.
    pub async fn load(catalog_path: &Path, cache_dir: &Path) -> Result<Self, LocateStationError> {
        let cache_file = cache_dir.join(BINCODE_CACHE_FILE_NAME);

        let stations = if Self::cache_is_fresh(&cache_file, catalog_path).await {
            let path_clone = cache_file.clone();
            tokio::task::spawn_blocking(move || Self::get_cached_stations(&path_clone)).await??
        } else {
            info!("Parsing station catalog {}", catalog_path.display());
            let stations = load_catalog(catalog_path).await?;
            tokio::fs::create_dir_all(cache_dir)
                .await
                .map_err(|e| LocateStationError::CacheDirCreation(cache_dir.to_path_buf(), e))?;
            Self::cache_stations(stations.clone(), &cache_file).await?;
            stations
        };
        Ok(Self::from_stations(stations))
    }

    pub fn from_stations(stations: Vec<Station>) -> Self {
        let by_id = stations
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        let rtree = RTree::bulk_load(stations.clone());
        StationLocator {
            rtree,
            stations,
            by_id,
        }
    }

    async fn cache_is_fresh(cache_file: &Path, catalog_path: &Path) -> bool {
        let modified = |path: &Path| {
            let path = path.to_path_buf();
            async move { tokio::fs::metadata(&path).await.and_then(|m| m.modified()).ok() }
        };
        match (modified(cache_file).await, modified(catalog_path).await) {
            (Some(cache), Some(catalog)) => cache >= catalog,
            (Some(_), None) => {
                warn!(
                    "Station catalog {} is not readable, using cached copy",
                    catalog_path.display()
                );
                true
            }
            _ => false,
        }
    }

    fn get_cached_stations(cache_path: &Path) -> Result<Vec<Station>, LocateStationError> {
        let bytes = std::fs::read(cache_path)
            .map_err(|e| LocateStationError::CacheRead(cache_path.to_path_buf(), e))?;
        let (decoded_stations, _) =
            bincode::serde::decode_from_slice::<Vec<Station>, _>(&bytes, BINCODE_CONFIG).map_err(
                |e| LocateStationError::CacheDecode(cache_path.to_path_buf(), Box::from(e)),
            )?;
        debug!(
            "Loaded {} stations from {}",
            decoded_stations.len(),
            cache_path.display()
        );
        Ok(decoded_stations)
    }

    async fn cache_stations(
        stations: Vec<Station>,
        cache_path: &Path,
    ) -> Result<(), LocateStationError> {
        let bincode_data = tokio::task::spawn_blocking({
            move || {
                bincode::serde::encode_to_vec(stations, BINCODE_CONFIG)
                    .map_err(|e| LocateStationError::CacheEncode(Box::new(e)))
            }
        })
        .await??;
        tokio::fs::write(&cache_path, &bincode_data)
            .await
            .map_err(|e| LocateStationError::CacheWrite(cache_path.to_path_buf(), e))?;
        debug!(
            "Wrote station cache ({} bytes) to {}",
            bincode_data.len(),
            cache_path.display()
        );
        Ok(())
    }

    /// Stations in catalog order.
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn get(&self, id: &str) -> Option<&Station> {
        self.by_id.get(id).map(|&i| &self.stations[i])
    }

    /// The station closest to `point` by great-circle distance.
    pub fn nearest(&self, point: LatLon) -> Option<StationMatch> {
        self.rtree
            .nearest_neighbor_iter(&[point.0, point.1])
            .take(NEAREST_CANDIDATES)
            .map(|station| (station, haversine_km(point, station)))
            .min_by_key(|(_, km)| OrderedFloat(*km))
            .map(|(station, km)| StationMatch {
                station: station.clone(),
                distance: Some(round_km(km)),
            })
    }

    pub fn find_in_vicinity(
        &self,
        coordinates: Option<LatLon>,
        radius_meters: Option<f64>,
        limit: Option<usize>,
    ) -> Vec<StationMatch> {
        find_in_vicinity(&self.stations, coordinates, radius_meters, limit)
    }
}

fn haversine_km(point: LatLon, station: &Station) -> f64 {
    distance(
        HaversineLocation {
            latitude: point.0,
            longitude: point.1,
        },
        HaversineLocation {
            latitude: station.latitude,
            longitude: station.longitude,
        },
        Units::Kilometers,
    )
}

fn round_km(km: f64) -> f64 {
    (km * 1000.0).round() / 1000.0
}

/// Lists catalog stations, nearest first when `coordinates` are given.
///
/// Without coordinates the catalog is returned in order and without distances. With
/// coordinates every station gets its great-circle distance in kilometres (rounded to
/// three decimals), stations further than `radius_meters` are dropped and the rest are
/// sorted ascending. A `limit` of `None` or `Some(0)` returns every match.
pub fn find_in_vicinity(
    catalog: &[Station],
    coordinates: Option<LatLon>,
    radius_meters: Option<f64>,
    limit: Option<usize>,
) -> Vec<StationMatch> {
    let mut matches: Vec<StationMatch> = match coordinates {
        None => catalog
            .iter()
            .cloned()
            .map(StationMatch::without_distance)
            .collect(),
        Some(point) => {
            let radius_km = radius_meters.map(|m| m / 1000.0);
            let mut scored: Vec<(f64, &Station)> = catalog
                .iter()
                .map(|station| (haversine_km(point, station), station))
                .filter(|(km, _)| radius_km.map_or(true, |r| *km <= r))
                .collect();
            scored.sort_by_key(|(km, _)| OrderedFloat(*km));
            scored
                .into_iter()
                .map(|(km, station)| StationMatch {
                    station: station.clone(),
                    distance: Some(round_km(km)),
                })
                .collect()
        }
    };
    if let Some(limit) = limit.filter(|&n| n > 0) {
        matches.truncate(limit);
    }
    matches
}
