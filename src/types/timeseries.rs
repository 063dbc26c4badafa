//! Time-indexed values keyed by epoch milliseconds (UTC).
//!
//! A [`Timeseries`] always holds strictly increasing timestamps. Missing readings are
//! stored as `f64::NAN` and serialized as JSON `null`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One reading at an instant, in milliseconds since the Unix epoch (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    #[serde(with = "nan_as_null")]
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// An ordered sequence of samples with strictly increasing, unique timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeseries {
    samples: Vec<Sample>,
}

impl Timeseries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a series from samples in any order.
    ///
    /// Samples are sorted by timestamp; when several samples share a timestamp the
    /// first one in input order is kept.
    pub fn from_unsorted(mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        samples.dedup_by_key(|s| s.timestamp);
        Self { samples }
    }

    /// Convenience constructor from `(timestamp, value)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i64, f64)>) -> Self {
        Self::from_unsorted(pairs.into_iter().map(|(t, v)| Sample::new(t, v)).collect())
    }

    /// Merges several series into one, keeping the earliest-supplied sample for
    /// duplicate timestamps.
    pub fn merge(parts: impl IntoIterator<Item = Timeseries>) -> Self {
        let samples = parts.into_iter().flat_map(|p| p.samples).collect();
        Self::from_unsorted(samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = i64> + '_ {
        self.samples.iter().map(|s| s.timestamp)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }

    /// Applies `f` to every value, leaving timestamps untouched.
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            samples: self
                .samples
                .iter()
                .map(|s| Sample::new(s.timestamp, f(s.value)))
                .collect(),
        }
    }

    /// Keeps samples with `start <= timestamp <= end`.
    pub fn within(&self, start: i64, end: i64) -> Self {
        Self {
            samples: self
                .samples
                .iter()
                .filter(|s| s.timestamp >= start && s.timestamp <= end)
                .copied()
                .collect(),
        }
    }

    /// Keeps samples with `start <= timestamp < start + length_ms`.
    pub fn trim_to_horizon(&self, start: i64, length_ms: i64) -> Self {
        let end = start.saturating_add(length_ms);
        Self {
            samples: self
                .samples
                .iter()
                .filter(|s| s.timestamp >= start && s.timestamp < end)
                .copied()
                .collect(),
        }
    }

    /// Returns the first consecutive pair whose spacing differs from `spacing_ms`,
    /// as `(index of later sample, actual spacing)`.
    pub fn first_irregular_step(&self, spacing_ms: i64) -> Option<(usize, i64)> {
        self.samples
            .windows(2)
            .enumerate()
            .map(|(i, w)| (i + 1, w[1].timestamp - w[0].timestamp))
            .find(|(_, delta)| *delta != spacing_ms)
    }
}

impl FromIterator<Sample> for Timeseries {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Timeseries {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

mod nan_as_null {
    use super::*;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}
