//! Measurements
//!
//! An immutable `(name, unit, value)` triple. Serialized as
//! `{"name": ..., "unit": "MILLISECONDS", "value": 12.5}`, the shape the
//! results service stores.

use serde::{Deserialize, Serialize};

/// Measurement unit, serialized as an upper-case token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Unit {
    /// Milliseconds
    Milliseconds,
    /// Bytes
    Bytes,
    /// Queries per second
    QueryPerSecond,
    /// Percentage (0-100)
    Percent,
    /// Dimensionless count
    None,
}

impl Unit {
    /// Wire token
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Milliseconds => "MILLISECONDS",
            Unit::Bytes => "BYTES",
            Unit::QueryPerSecond => "QUERY_PER_SECOND",
            Unit::Percent => "PERCENT",
            Unit::None => "NONE",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MILLISECONDS" => Ok(Unit::Milliseconds),
            "BYTES" => Ok(Unit::Bytes),
            "QUERY_PER_SECOND" => Ok(Unit::QueryPerSecond),
            "PERCENT" => Ok(Unit::Percent),
            "NONE" => Ok(Unit::None),
            other => Err(format!("Unknown measurement unit: {}", other)),
        }
    }
}

/// One quantitative observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Metric name
    pub name: String,
    /// Unit of `value`
    pub unit: Unit,
    /// Observed value
    pub value: f64,
}

impl Measurement {
    /// Create a measurement
    pub fn new(name: impl Into<String>, unit: Unit, value: f64) -> Self {
        Self {
            name: name.into(),
            unit,
            value,
        }
    }

    /// Shorthand for a millisecond measurement
    pub fn millis(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, Unit::Milliseconds, value)
    }

    /// Shorthand for a byte measurement
    pub fn bytes(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, Unit::Bytes, value)
    }
}

impl std::fmt::Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={} {}", self.name, self.value, self.unit)
    }
}
