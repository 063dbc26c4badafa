//! Parser for the DWD station catalog report.
//!
//! The report is split into sections. Each section lists its stations column by column:
//! a label line (`Kennung`, `Stationsname`, `Breite`, `Länge`, `Höhe`, or the English
//! `id`, `name`, `lat`, `lon`, `alt`) followed by one line per station. The five blocks
//! of a section are parallel, so the n-th line of every block belongs to the n-th
//! station. Numbers may use a decimal comma and the Unicode minus sign.

use crate::stations::error::LocateStationError;
use crate::types::station::Station;
use log::{debug, warn};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Id,
    Name,
    Latitude,
    Longitude,
    Elevation,
}

impl Column {
    fn from_label(line: &str) -> Option<Self> {
        match line.trim().trim_end_matches(':').to_lowercase().as_str() {
            "kennung" | "id" => Some(Column::Id),
            "stationsname" | "name" => Some(Column::Name),
            "breite" | "lat" | "latitude" => Some(Column::Latitude),
            "länge" | "laenge" | "lon" | "longitude" => Some(Column::Longitude),
            "höhe" | "hoehe" | "alt" | "elevation" => Some(Column::Elevation),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Section<'a> {
    ids: Vec<&'a str>,
    names: Vec<&'a str>,
    latitudes: Vec<&'a str>,
    longitudes: Vec<&'a str>,
    elevations: Vec<&'a str>,
}

impl<'a> Section<'a> {
    fn block(&mut self, column: Column) -> &mut Vec<&'a str> {
        match column {
            Column::Id => &mut self.ids,
            Column::Name => &mut self.names,
            Column::Latitude => &mut self.latitudes,
            Column::Longitude => &mut self.longitudes,
            Column::Elevation => &mut self.elevations,
        }
    }

    fn is_empty(&self) -> bool {
        self.ids.is_empty()
            && self.names.is_empty()
            && self.latitudes.is_empty()
            && self.longitudes.is_empty()
            && self.elevations.is_empty()
    }

    fn into_stations(self, index: usize) -> Option<Vec<Station>> {
        let n = self.ids.len();
        let lengths = [
            self.names.len(),
            self.latitudes.len(),
            self.longitudes.len(),
            self.elevations.len(),
        ];
        if lengths.iter().any(|&len| len != n) {
            warn!(
                "Skipping catalog section {}: block lengths differ ({} ids, {:?})",
                index, n, lengths
            );
            return None;
        }
        let mut stations = Vec::with_capacity(n);
        for i in 0..n {
            let parsed = (
                parse_number(self.latitudes[i]),
                parse_number(self.longitudes[i]),
                parse_number(self.elevations[i]),
            );
            let (Some(latitude), Some(longitude), Some(elevation)) = parsed else {
                warn!(
                    "Skipping catalog section {}: unreadable coordinates for station '{}'",
                    index, self.ids[i]
                );
                return None;
            };
            stations.push(Station {
                id: self.ids[i].to_string(),
                name: self.names[i].to_string(),
                latitude,
                longitude,
                elevation,
            });
        }
        Some(stations)
    }
}

/// Parses `1,5`, `−3,25` or `-3.25` style numbers.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .replace('\u{2212}', "-")
        .replace(',', ".")
        .parse()
        .ok()
}

/// Parses the catalog report. Malformed sections are skipped with a warning and
/// duplicate ids keep their first occurrence.
pub fn parse_catalog(text: &str) -> Vec<Station> {
    let mut sections = Vec::new();
    let mut current = Section::default();
    let mut column: Option<Column> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(label) = Column::from_label(line) {
            if label == Column::Id && !current.is_empty() {
                sections.push(std::mem::take(&mut current));
            }
            column = Some(label);
            continue;
        }
        match column {
            Some(column) => current.block(column).push(line),
            None => debug!("Ignoring catalog preamble line '{}'", line),
        }
    }
    if !current.is_empty() {
        sections.push(current);
    }

    let mut seen = HashSet::new();
    let mut stations = Vec::new();
    for (index, section) in sections.into_iter().enumerate() {
        for station in section.into_stations(index).unwrap_or_default() {
            if seen.insert(station.id.clone()) {
                stations.push(station);
            } else {
                warn!("Duplicate station id '{}' in catalog, keeping the first", station.id);
            }
        }
    }
    stations
}

/// Reads and parses the catalog file at `path`.
pub async fn load_catalog(path: &Path) -> Result<Vec<Station>, LocateStationError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LocateStationError::CatalogRead(path.to_path_buf(), e))?;
    let text = String::from_utf8_lossy(&bytes);
    let stations = parse_catalog(&text);
    if stations.is_empty() {
        return Err(LocateStationError::EmptyCatalog(path.to_path_buf()));
    }
    Ok(stations)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
Stationskatalog MOSMIX
Seite 1

Kennung
10637
E434
Stationsname
Frankfurt/Main
Zugspitze Gipfel
Breite
50,05
47,42
Länge
8,60
10,98
Höhe
100
2964

Kennung
89002
Stationsname
Neumayer
Breite
\u{2212}70,67
Länge
\u{2212}8,27
Höhe
50

Kennung
11111
22222
Stationsname
Broken
Breite
1,0
2,0
Länge
1,0
2,0
Höhe
1
2
";

    #[test]
    fn test_parse_sections() {
        let stations = parse_catalog(REPORT);
        let ids: Vec<&str> = stations.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["10637", "E434", "89002"]);
        assert_eq!(stations[1].name, "Zugspitze Gipfel");
        assert_eq!(stations[1].elevation, 2964.0);
        assert_eq!(stations[2].latitude, -70.67);
        assert_eq!(stations[2].longitude, -8.27);
    }

    #[test]
    fn test_english_labels_and_duplicates() {
        let report = "id\nA1\nA1\nname\nOne\nTwo\nlat\n1.5\n2.5\nlon\n3\n4\nalt\n5\n6\n";
        let stations = parse_catalog(report);
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].name, "One");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" \u{2212}1,25 "), Some(-1.25));
        assert_eq!(parse_number("abc"), None);
    }

    #[tokio::test]
    async fn test_load_catalog_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_catalog(&dir.path().join("none.txt")).await.unwrap_err();
        assert!(matches!(missing, LocateStationError::CatalogRead(..)));

        let empty = dir.path().join("empty.txt");
        tokio::fs::write(&empty, "nothing here").await.unwrap();
        assert!(matches!(
            load_catalog(&empty).await.unwrap_err(),
            LocateStationError::EmptyCatalog(_)
        ));
    }
}
