//! Conversion between the physical units used by the archives and the units served.
//!
//! Conversions are looked up in a fixed table of bidirectional pairs. A pair that is
//! not in the table is not an error: the value is passed through unchanged.

use log::debug;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// A physical unit as written in archive headers and quantity configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Unit {
    Celsius,
    Kelvin,
    Hectopascal,
    Pascal,
    Percent,
    /// Dimensionless ratio in `[0, 1]`.
    Fraction,
    KilowattPerSquareMetre,
    WattPerSquareMetre,
    KilometrePerHour,
    MetrePerSecond,
    Millimetre,
    KilogramPerSquareMetre,
    Degree,
    /// Any unit without a table entry, kept verbatim.
    Other(String),
}

impl Unit {
    pub fn symbol(&self) -> &str {
        match self {
            Unit::Celsius => "°C",
            Unit::Kelvin => "K",
            Unit::Hectopascal => "hPa",
            Unit::Pascal => "Pa",
            Unit::Percent => "%",
            Unit::Fraction => "1",
            Unit::KilowattPerSquareMetre => "kW/m²",
            Unit::WattPerSquareMetre => "W/m²",
            Unit::KilometrePerHour => "km/h",
            Unit::MetrePerSecond => "m/s",
            Unit::Millimetre => "mm",
            Unit::KilogramPerSquareMetre => "kg/m²",
            Unit::Degree => "°",
            Unit::Other(symbol) => symbol,
        }
    }
}

impl FromStr for Unit {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "°C" | "C" | "degC" | "deg C" => Unit::Celsius,
            "K" => Unit::Kelvin,
            "hPa" => Unit::Hectopascal,
            "Pa" => Unit::Pascal,
            "%" => Unit::Percent,
            "1" | "fraction" => Unit::Fraction,
            "kW/m²" | "kW/m2" => Unit::KilowattPerSquareMetre,
            "W/m²" | "W/m2" => Unit::WattPerSquareMetre,
            "km/h" => Unit::KilometrePerHour,
            "m/s" => Unit::MetrePerSecond,
            "mm" => Unit::Millimetre,
            "kg/m²" | "kg/m2" => Unit::KilogramPerSquareMetre,
            "°" | "deg" | "degrees" => Unit::Degree,
            other => Unit::Other(other.to_string()),
        })
    }
}

impl From<String> for Unit {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(unit) => unit,
            Err(never) => match never {},
        }
    }
}

impl From<&str> for Unit {
    fn from(value: &str) -> Self {
        Unit::from(value.to_string())
    }
}

impl From<Unit> for String {
    fn from(value: Unit) -> Self {
        value.symbol().to_string()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Looks up the table entry for `from -> to`.
fn conversion(from: &Unit, to: &Unit) -> Option<fn(f64) -> f64> {
    use Unit::*;
    let f: fn(f64) -> f64 = match (from, to) {
        (Celsius, Kelvin) => |v| v + 273.15,
        (Kelvin, Celsius) => |v| v - 273.15,
        (Hectopascal, Pascal) => |v| v * 100.0,
        (Pascal, Hectopascal) => |v| v / 100.0,
        (Percent, Fraction) => |v| v / 100.0,
        (Fraction, Percent) => |v| v * 100.0,
        (KilowattPerSquareMetre, WattPerSquareMetre) => |v| v * 1000.0,
        (WattPerSquareMetre, KilowattPerSquareMetre) => |v| v / 1000.0,
        (KilometrePerHour, MetrePerSecond) => |v| v / 3.6,
        (MetrePerSecond, KilometrePerHour) => |v| v * 3.6,
        // 1 kg of water spread over 1 m² is 1 mm deep.
        (KilogramPerSquareMetre, Millimetre) | (Millimetre, KilogramPerSquareMetre) => |v| v,
        _ => return None,
    };
    Some(f)
}

/// Converts `value` from `from` to `to`.
///
/// Identical units and `NaN` inputs are returned untouched. Pairs without a table
/// entry are passed through and logged at debug level.
pub fn convert(value: f64, from: &Unit, to: &Unit) -> f64 {
    if from == to || value.is_nan() {
        return value;
    }
    match conversion(from, to) {
        Some(f) => f(value),
        None => {
            debug!("No conversion from {} to {}, passing value through", from, to);
            value
        }
    }
}

/// Converts every value of a series, leaving timestamps untouched.
pub fn convert_series(
    series: &crate::Timeseries,
    from: &Unit,
    to: &Unit,
) -> crate::Timeseries {
    if from == to {
        return series.clone();
    }
    if conversion(from, to).is_none() {
        debug!("No conversion from {} to {}, passing series through", from, to);
        return series.clone();
    }
    series.map_values(|v| convert(v, from, to))
}
