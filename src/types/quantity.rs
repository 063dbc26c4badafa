//! Quantity-of-interest configuration: which archived fields feed a served quantity,
//! in which units, and how they are combined.

use crate::units::Unit;
use serde::{Deserialize, Serialize};

/// One archived field together with the unit it is stored in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceField {
    pub key: String,
    pub unit: Unit,
}

impl SourceField {
    pub fn new(key: impl Into<String>, unit: impl Into<Unit>) -> Self {
        Self {
            key: key.into(),
            unit: unit.into(),
        }
    }
}

/// How a served quantity is derived from its archived source fields.
///
/// Vector variants take a zonal (west to east) and a meridional (south to north)
/// component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Computation {
    BaseValue {
        source: SourceField,
    },
    AccumulationRate {
        source: SourceField,
    },
    VectorNorm {
        zonal: SourceField,
        meridional: SourceField,
    },
    VectorAngle {
        zonal: SourceField,
        meridional: SourceField,
    },
}

impl Computation {
    /// The archived fields this computation reads.
    pub fn sources(&self) -> Vec<&SourceField> {
        match self {
            Computation::BaseValue { source } | Computation::AccumulationRate { source } => {
                vec![source]
            }
            Computation::VectorNorm { zonal, meridional }
            | Computation::VectorAngle { zonal, meridional } => vec![zonal, meridional],
        }
    }

    /// True when the result needs more than one independently fetched series.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Computation::VectorNorm { .. } | Computation::VectorAngle { .. }
        )
    }
}

/// A served quantity. Loaded once from configuration and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityConfig {
    /// Identifier requested by clients, e.g. `"t_2m"`.
    pub key: String,
    /// Human readable label used in rendered output.
    pub label: String,
    /// Unit the quantity is served in.
    pub unit: Unit,
    pub computation: Computation,
}

impl QuantityConfig {
    pub fn sources(&self) -> Vec<&SourceField> {
        self.computation.sources()
    }
}

/// Finds a quantity by its key.
pub fn find_quantity<'a>(catalog: &'a [QuantityConfig], key: &str) -> Option<&'a QuantityConfig> {
    catalog.iter().find(|q| q.key.eq_ignore_ascii_case(key))
}
