//! types.rs
//! Core value types shared by every layer: series identity, dimensions,
//! timestamps and the immutable `Series` itself.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::error::StoreError;

/// Time axis of every series. Monthly and seasonal records are stamped on a day.
pub type Timestamp = NaiveDate;

/// Well-known dimension names.
pub mod dims {
    pub const VARIABLE: &str = "variable";
    pub const REGION: &str = "region";
    pub const SCENARIO: &str = "scenario";
    pub const MODEL: &str = "model";
    pub const SOURCE: &str = "source";
    pub const INDICATOR: &str = "indicator";
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(pub String);

impl SeriesId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for SeriesId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl From<String> for SeriesId {
    fn from(s: String) -> Self { Self(s) }
}

/// Categorical coordinates of a series (`region = "nh"`, `scenario = "ssp126"`, ...).
pub type Dimensions = BTreeMap<String, String>;

/// Inclusive date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl DateRange {
    /// Builds a range, rejecting `start > end`.
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, StoreError> {
        if start > end {
            return Err(StoreError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn is_inverted(&self) -> bool { self.start > self.end }

    #[inline(always)]
    pub fn contains(&self, t: Timestamp) -> bool { self.start <= t && t <= self.end }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// An immutable, validated time series.
///
/// `timestamps` is strictly increasing and aligned 1:1 with `values`; `None`
/// marks a missing observation. Construction is the only place the invariants
/// are checked, so every `Series` in the process is well-formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSeries", into = "RawSeries")]
pub struct Series {
    id: SeriesId,
    dimensions: Dimensions,
    timestamps: Vec<Timestamp>,
    values: Vec<Option<f64>>,
}

impl Series {
    pub fn new(
        id: impl Into<SeriesId>,
        dimensions: Dimensions,
        timestamps: Vec<Timestamp>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, StoreError> {
        let id = id.into();
        let fail = |reason: String| StoreError::MalformedSeries { id: id.clone(), reason };

        if id.0.trim().is_empty() {
            return Err(fail("empty series id".into()));
        }
        if timestamps.len() != values.len() {
            return Err(fail(format!(
                "{} timestamps but {} values",
                timestamps.len(),
                values.len()
            )));
        }
        if let Some(pos) = timestamps.windows(2).position(|w| w[0] >= w[1]) {
            return Err(fail(format!(
                "timestamps not strictly increasing at index {} ({} -> {})",
                pos + 1,
                timestamps[pos],
                timestamps[pos + 1]
            )));
        }
        if let Some(pos) = values.iter().position(|v| matches!(v, Some(x) if !x.is_finite())) {
            return Err(fail(format!("non-finite value at index {}", pos)));
        }

        Ok(Self { id, dimensions, timestamps, values })
    }

    /// Builds a series from a raw float column where NaN encodes "missing".
    pub fn from_raw(
        id: impl Into<SeriesId>,
        dimensions: Dimensions,
        timestamps: Vec<Timestamp>,
        raw: Vec<f64>,
    ) -> Result<Self, StoreError> {
        let values = raw.into_iter().map(|v| if v.is_nan() { None } else { Some(v) }).collect();
        Self::new(id, dimensions, timestamps, values)
    }

    pub fn id(&self) -> &SeriesId { &self.id }
    pub fn dimensions(&self) -> &Dimensions { &self.dimensions }
    pub fn dimension(&self, name: &str) -> Option<&str> { self.dimensions.get(name).map(String::as_str) }
    pub fn timestamps(&self) -> &[Timestamp] { &self.timestamps }
    pub fn values(&self) -> &[Option<f64>] { &self.values }
    pub fn len(&self) -> usize { self.timestamps.len() }
    pub fn is_empty(&self) -> bool { self.timestamps.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, Option<f64>)> + '_ {
        self.timestamps.iter().copied().zip(self.values.iter().copied())
    }

    /// Value at an exact timestamp, if the timestamp exists.
    pub fn value_at(&self, t: Timestamp) -> Option<Option<f64>> {
        self.timestamps.binary_search(&t).ok().map(|i| self.values[i])
    }

    /// Number of non-missing observations.
    pub fn observed_count(&self) -> usize { self.values.iter().filter(|v| v.is_some()).count() }

    /// Re-labels a derived series. The data is untouched, so invariants still hold.
    pub fn with_identity(mut self, id: impl Into<SeriesId>, dimensions: Dimensions) -> Self {
        self.id = id.into();
        self.dimensions = dimensions;
        self
    }

    /// Builds a series from data that is already known to satisfy the invariants
    /// (kernel output over validated input).
    pub(crate) fn from_parts_unchecked(
        id: SeriesId,
        dimensions: Dimensions,
        timestamps: Vec<Timestamp>,
        values: Vec<Option<f64>>,
    ) -> Self {
        debug_assert_eq!(timestamps.len(), values.len());
        debug_assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
        Self { id, dimensions, timestamps, values }
    }
}

/// Unvalidated wire form of a `Series`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSeries {
    pub id: SeriesId,
    #[serde(default)]
    pub dimensions: Dimensions,
    pub timestamps: Vec<Timestamp>,
    pub values: Vec<Option<f64>>,
}

impl TryFrom<RawSeries> for Series {
    type Error = StoreError;

    fn try_from(raw: RawSeries) -> Result<Self, Self::Error> {
        Series::new(raw.id, raw.dimensions, raw.timestamps, raw.values)
    }
}

impl From<Series> for RawSeries {
    fn from(s: Series) -> Self {
        RawSeries { id: s.id, dimensions: s.dimensions, timestamps: s.timestamps, values: s.values }
    }
}
