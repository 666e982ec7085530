//! state.rs
//! The versioned, immutable selection state of one session.

use crate::store::DateRange;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;

/// A user-facing filter axis. Graph nodes declare which of these they read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    Region,
    Scenario,
    DateRange,
    Indicators,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Dimension::Region => "region",
            Dimension::Scenario => "scenario",
            Dimension::DateRange => "date_range",
            Dimension::Indicators => "selected_indicators",
        };
        f.write_str(s)
    }
}

/// Short set of dimensions; never more than the four variants.
pub type DimensionSet = SmallVec<[Dimension; 4]>;

pub fn intersects(a: &[Dimension], b: &[Dimension]) -> bool {
    a.iter().any(|d| b.contains(d))
}

/// A committed filter. Every mutation goes through [`FilterState::apply`],
/// which returns a new state with the next version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    region: String,
    scenario: String,
    date_range: DateRange,
    selected_indicators: BTreeSet<String>,
    version: u64,
}

impl FilterState {
    /// The session-start state (version 0).
    pub fn initial(region: impl Into<String>, scenario: impl Into<String>, date_range: DateRange) -> Self {
        Self {
            region: region.into(),
            scenario: scenario.into(),
            date_range,
            selected_indicators: BTreeSet::new(),
            version: 0,
        }
    }

    pub fn region(&self) -> &str { &self.region }
    pub fn scenario(&self) -> &str { &self.scenario }
    pub fn date_range(&self) -> DateRange { self.date_range }
    pub fn selected_indicators(&self) -> &BTreeSet<String> { &self.selected_indicators }
    pub fn version(&self) -> u64 { self.version }

    /// Produces the successor state. Never fails and never touches `self`.
    pub fn apply(&self, patch: &FilterPatch) -> FilterState {
        FilterState {
            region: patch.region.clone().unwrap_or_else(|| self.region.clone()),
            scenario: patch.scenario.clone().unwrap_or_else(|| self.scenario.clone()),
            date_range: patch.date_range.unwrap_or(self.date_range),
            selected_indicators: patch
                .selected_indicators
                .clone()
                .unwrap_or_else(|| self.selected_indicators.clone()),
            version: self.version + 1,
        }
    }

    /// A state carrying `other`'s values with the version that follows `self`.
    pub(crate) fn restore(&self, other: &FilterState) -> FilterState {
        FilterState { version: self.version + 1, ..other.clone() }
    }

    /// Dimensions whose values differ between `self` and `other`.
    pub fn changed_dimensions(&self, other: &FilterState) -> DimensionSet {
        let mut out = DimensionSet::new();
        if self.region != other.region {
            out.push(Dimension::Region);
        }
        if self.scenario != other.scenario {
            out.push(Dimension::Scenario);
        }
        if self.date_range != other.date_range {
            out.push(Dimension::DateRange);
        }
        if self.selected_indicators != other.selected_indicators {
            out.push(Dimension::Indicators);
        }
        out
    }

    /// The current value of a bindable dimension, as matched against series dimensions.
    pub fn binding(&self, dim: Dimension) -> Option<&str> {
        match dim {
            Dimension::Region => Some(&self.region),
            Dimension::Scenario => Some(&self.scenario),
            Dimension::DateRange | Dimension::Indicators => None,
        }
    }
}

/// A partial filter. `None` fields keep the previous value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPatch {
    pub region: Option<String>,
    pub scenario: Option<String>,
    pub date_range: Option<DateRange>,
    pub selected_indicators: Option<BTreeSet<String>>,
}

impl FilterPatch {
    pub fn new() -> Self { Self::default() }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn indicators<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_indicators = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_none()
            && self.scenario.is_none()
            && self.date_range.is_none()
            && self.selected_indicators.is_none()
    }

    /// Folds a later patch over this one; fields set in `later` win.
    pub fn merge(self, later: FilterPatch) -> FilterPatch {
        FilterPatch {
            region: later.region.or(self.region),
            scenario: later.scenario.or(self.scenario),
            date_range: later.date_range.or(self.date_range),
            selected_indicators: later.selected_indicators.or(self.selected_indicators),
        }
    }
}
