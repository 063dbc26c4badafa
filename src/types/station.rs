//! Defines the data structures representing DWD observation stations, as parsed from the
//! station catalog, together with the `rstar` implementations used for spatial lookup.

use rstar::{PointDistance, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

// --- Data Structures ---

/// A single weather station from the DWD station catalog.
///
/// Identifiers are the short codes used in observation file names (e.g. `"10637"` or
/// `"E434"`). They are unique within one catalog.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Station {
    /// The station identifier, at most 5 characters.
    pub id: String,
    /// The station's display name.
    pub name: String,
    /// Latitude in decimal degrees (positive for North, negative for South).
    pub latitude: f64,
    /// Longitude in decimal degrees (positive for East, negative for West).
    pub longitude: f64,
    /// Elevation above sea level in metres.
    pub elevation: f64,
}

/// A station returned from a vicinity search.
///
/// `distance` is the great-circle distance in kilometres from the query point, rounded
/// to three decimals. It is absent when the search had no reference point.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StationMatch {
    #[serde(flatten)]
    pub station: Station,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub distance: Option<f64>,
}

impl StationMatch {
    pub fn without_distance(station: Station) -> Self {
        Self {
            station,
            distance: None,
        }
    }
}

// --- R-Tree Implementations ---

/// Lets a `Station` live in an R-Tree keyed on `[latitude, longitude]`.
impl RTreeObject for Station {
    type Envelope = AABB<[f64; 2]>;

    /// A station is a point, so its envelope is the degenerate box around it.
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.latitude, self.longitude])
    }
}

impl PointDistance for Station {
    /// Squared Euclidean distance in degree space.
    ///
    /// Only used to order R-Tree candidates. Reported distances are always computed
    /// with the haversine formula.
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.latitude - point[0];
        let dy = self.longitude - point[1];
        dx * dx + dy * dy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_without_distance_omits_field() {
        let station = Station {
            id: "10637".to_string(),
            name: "Frankfurt/Main".to_string(),
            latitude: 50.05,
            longitude: 8.6,
            elevation: 100.0,
        };
        let json = serde_json::to_value(StationMatch::without_distance(station.clone())).unwrap();
        assert_eq!(json["id"], "10637");
        assert!(json.get("distance").is_none());

        let with = StationMatch {
            station,
            distance: Some(1.25),
        };
        let json = serde_json::to_value(with).unwrap();
        assert_eq!(json["distance"], 1.25);
    }
}
