//! Decides whether a candidate forecast run is complete enough to be cached.

use crate::types::quantity::QuantityConfig;
use crate::Timeseries;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

const MS_PER_HOUR: i64 = 3_600_000;

/// A cached forecast length together with the samples it must contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizonConfig {
    /// Used in cache file names, e.g. `"27h"`.
    pub name: String,
    pub hours: i64,
    pub required_samples: usize,
    pub sample_spacing_ms: i64,
}

impl HorizonConfig {
    pub fn new(name: impl Into<String>, hours: i64, required_samples: usize, sample_spacing_ms: i64) -> Self {
        Self {
            name: name.into(),
            hours,
            required_samples,
            sample_spacing_ms,
        }
    }

    pub fn length_ms(&self) -> i64 {
        self.hours * MS_PER_HOUR
    }

    /// The 27 h and 45 h hourly horizons.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("27h", 27, 27, MS_PER_HOUR),
            Self::new("45h", 45, 45, MS_PER_HOUR),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncompleteReason {
    Missing {
        quantity: String,
    },
    TooFewSamples {
        quantity: String,
        found: usize,
        required: usize,
    },
    IrregularSpacing {
        quantity: String,
        index: usize,
        spacing_ms: i64,
        expected_ms: i64,
    },
}

impl fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncompleteReason::Missing { quantity } => write!(f, "{quantity}: no data"),
            IncompleteReason::TooFewSamples {
                quantity,
                found,
                required,
            } => write!(f, "{quantity}: {found} of {required} samples"),
            IncompleteReason::IrregularSpacing {
                quantity,
                index,
                spacing_ms,
                expected_ms,
            } => write!(
                f,
                "{quantity}: step of {spacing_ms} ms before sample {index}, expected {expected_ms} ms"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completeness {
    Complete,
    Incomplete(Vec<IncompleteReason>),
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        matches!(self, Completeness::Complete)
    }
}

/// Checks one already trimmed series against the horizon requirements.
pub fn check_series(
    quantity: &str,
    series: &Timeseries,
    horizon: &HorizonConfig,
) -> Option<IncompleteReason> {
    if series.len() < horizon.required_samples {
        return Some(IncompleteReason::TooFewSamples {
            quantity: quantity.to_string(),
            found: series.len(),
            required: horizon.required_samples,
        });
    }
    series
        .first_irregular_step(horizon.sample_spacing_ms)
        .map(|(index, spacing_ms)| IncompleteReason::IrregularSpacing {
            quantity: quantity.to_string(),
            index,
            spacing_ms,
            expected_ms: horizon.sample_spacing_ms,
        })
}

/// A run is complete when every configured quantity has a result that, trimmed to
/// `[reference_run, reference_run + horizon)`, holds enough evenly spaced samples.
pub fn validate(
    reference_run: i64,
    quantities: &[QuantityConfig],
    results: &HashMap<String, Timeseries>,
    horizon: &HorizonConfig,
) -> Completeness {
    let reasons: Vec<IncompleteReason> = quantities
        .iter()
        .filter_map(|quantity| match results.get(&quantity.key) {
            None => Some(IncompleteReason::Missing {
                quantity: quantity.key.clone(),
            }),
            Some(series) => check_series(
                &quantity.key,
                &series.trim_to_horizon(reference_run, horizon.length_ms()),
                horizon,
            ),
        })
        .collect();
    if reasons.is_empty() {
        Completeness::Complete
    } else {
        Completeness::Incomplete(reasons)
    }
}
