//! Derived quantities computed from decoded, unit-converted base series.

use crate::types::quantity::{Computation, QuantityConfig, SourceField};
use crate::units::{convert_series, Unit};
use crate::{Sample, Timeseries};
use std::collections::HashMap;
use thiserror::Error;

/// Two series meant to be combined index by index do not line up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("Series lengths differ: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("Timestamps differ at index {index}: {left} vs {right}")]
    TimestampMismatch { index: usize, left: i64, right: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerivedError {
    #[error("Source series '{0}' is not available")]
    MissingSource(String),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

/// Turns an accumulated quantity into the average rate over each interval.
///
/// For `i >= 1`:
/// `rate[i] = ((t[i] - t0) * v[i] - (t[i-1] - t0) * v[i-1]) / (t[i] - t[i-1])`
/// with `t0` the first timestamp. The first sample is kept as is.
pub fn accumulation_rate(series: &Timeseries) -> Timeseries {
    let samples = series.samples();
    let Some(first) = samples.first() else {
        return Timeseries::new();
    };
    let t0 = first.timestamp;
    let mut out = Vec::with_capacity(samples.len());
    out.push(*first);
    for pair in samples.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        let elapsed_prev = (prev.timestamp - t0) as f64;
        let elapsed_cur = (cur.timestamp - t0) as f64;
        let interval = (cur.timestamp - prev.timestamp) as f64;
        let rate = (elapsed_cur * cur.value - elapsed_prev * prev.value) / interval;
        out.push(Sample::new(cur.timestamp, rate));
    }
    Timeseries::from_unsorted(out)
}

fn check_aligned(a: &Timeseries, b: &Timeseries) -> Result<(), ConsistencyError> {
    if a.len() != b.len() {
        return Err(ConsistencyError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    match a
        .iter()
        .zip(b.iter())
        .enumerate()
        .find(|(_, (x, y))| x.timestamp != y.timestamp)
    {
        Some((index, (x, y))) => Err(ConsistencyError::TimestampMismatch {
            index,
            left: x.timestamp,
            right: y.timestamp,
        }),
        None => Ok(()),
    }
}

fn combine(
    a: &Timeseries,
    b: &Timeseries,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Timeseries, ConsistencyError> {
    check_aligned(a, b)?;
    Ok(Timeseries::from_unsorted(
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| Sample::new(x.timestamp, f(x.value, y.value)))
            .collect(),
    ))
}

/// Elementwise magnitude `sqrt(u² + v²)`.
pub fn vector_norm(zonal: &Timeseries, meridional: &Timeseries) -> Result<Timeseries, ConsistencyError> {
    combine(zonal, meridional, |u, v| u.hypot(v))
}

/// Elementwise meteorological bearing, see [`meteorological_bearing`].
pub fn vector_angle(zonal: &Timeseries, meridional: &Timeseries) -> Result<Timeseries, ConsistencyError> {
    combine(zonal, meridional, meteorological_bearing)
}

/// Direction the wind blows from, in degrees clockwise from north, in `[0, 360)`.
///
/// `u` is the zonal (eastward) and `v` the meridional (northward) component.
pub fn meteorological_bearing(u: f64, v: f64) -> f64 {
    if u.is_nan() || v.is_nan() {
        return f64::NAN;
    }
    if u == 0.0 {
        return if v <= 0.0 { 0.0 } else { 180.0 };
    }
    if v == 0.0 {
        return if u > 0.0 { 270.0 } else { 90.0 };
    }
    let mut alpha = u.atan2(v).to_degrees();
    if u < 0.0 {
        alpha += 360.0;
    }
    (alpha + 180.0).rem_euclid(360.0)
}

fn source<'a>(
    inputs: &'a HashMap<String, Timeseries>,
    field: &SourceField,
) -> Result<&'a Timeseries, DerivedError> {
    inputs
        .get(&field.key)
        .ok_or_else(|| DerivedError::MissingSource(field.key.clone()))
}

/// Evaluates `computation` over series keyed by source key.
pub fn compute(
    computation: &Computation,
    inputs: &HashMap<String, Timeseries>,
) -> Result<Timeseries, DerivedError> {
    match computation {
        Computation::BaseValue { source: field } => Ok(source(inputs, field)?.clone()),
        Computation::AccumulationRate { source: field } => {
            Ok(accumulation_rate(source(inputs, field)?))
        }
        Computation::VectorNorm { zonal, meridional } => Ok(vector_norm(
            source(inputs, zonal)?,
            source(inputs, meridional)?,
        )?),
        Computation::VectorAngle { zonal, meridional } => Ok(vector_angle(
            source(inputs, zonal)?,
            source(inputs, meridional)?,
        )?),
    }
}

/// Converts the decoded sources of `quantity` into its unit and evaluates it.
///
/// `lookup` receives upper-case source keys as produced by the decoders.
pub fn evaluate<'a>(
    quantity: &QuantityConfig,
    lookup: impl Fn(&str) -> Option<&'a Timeseries>,
) -> Result<Timeseries, DerivedError> {
    let inputs: HashMap<String, Timeseries> = quantity
        .sources()
        .into_iter()
        .filter_map(|field| {
            let series = lookup(&field.key.to_uppercase())?;
            let unit = input_unit(quantity, field);
            Some((field.key.clone(), convert_series(series, &field.unit, unit)))
        })
        .collect();
    let derived = compute(&quantity.computation, &inputs)?;
    match &quantity.computation {
        Computation::AccumulationRate { source: field } => {
            let raw_first = lookup(&field.key.to_uppercase()).and_then(Timeseries::first);
            Ok(restore_first(derived, raw_first))
        }
        _ => Ok(derived),
    }
}

/// The first rate has no preceding interval and carries the raw,
/// unconverted first sample of the accumulated source.
fn restore_first(rate: Timeseries, raw_first: Option<&Sample>) -> Timeseries {
    let Some(raw) = raw_first else {
        return rate;
    };
    let mut samples = rate.samples().to_vec();
    if let Some(first) = samples.first_mut() {
        first.value = raw.value;
    }
    Timeseries::from_unsorted(samples)
}

/// Angles are computed from the raw vector components; everything else in the
/// quantity's own unit.
fn input_unit<'a>(quantity: &'a QuantityConfig, field: &'a SourceField) -> &'a Unit {
    match quantity.computation {
        Computation::VectorAngle { .. } => &field.unit,
        _ => &quantity.unit,
    }
}
