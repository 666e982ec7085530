//! validate.rs
//! Boundary checks for user-submitted patches. A rejected patch never reaches
//! `FilterState::apply`, so the previous state stays in force.

use super::state::FilterPatch;
use crate::indicators::IndicatorRegistry;
use crate::store::{dims, SeriesStore, Timestamp};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid filter: date range starts {start} after it ends {end}")]
    InvertedRange { start: Timestamp, end: Timestamp },
    #[error("invalid filter: unknown region '{0}'")]
    UnknownRegion(String),
    #[error("invalid filter: unknown scenario '{0}'")]
    UnknownScenario(String),
    #[error("invalid filter: unknown indicator '{0}'")]
    UnknownIndicator(String),
}

/// The admissible values for each filter dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCatalog {
    pub regions: BTreeSet<String>,
    pub scenarios: BTreeSet<String>,
    pub indicators: BTreeSet<String>,
}

impl FilterCatalog {
    /// Regions and scenarios come from the loaded data, indicators from the registry.
    pub fn from_sources(store: &SeriesStore, registry: &IndicatorRegistry) -> Self {
        Self {
            regions: store.dimension_values(dims::REGION),
            scenarios: store.dimension_values(dims::SCENARIO),
            indicators: registry.names().map(str::to_string).collect(),
        }
    }
}

pub fn validate(patch: &FilterPatch, catalog: &FilterCatalog) -> Result<(), FilterError> {
    if let Some(range) = &patch.date_range {
        if range.is_inverted() {
            return Err(FilterError::InvertedRange { start: range.start, end: range.end });
        }
    }
    if let Some(region) = &patch.region {
        if !catalog.regions.contains(region) {
            return Err(FilterError::UnknownRegion(region.clone()));
        }
    }
    if let Some(scenario) = &patch.scenario {
        if !catalog.scenarios.contains(scenario) {
            return Err(FilterError::UnknownScenario(scenario.clone()));
        }
    }
    if let Some(selected) = &patch.selected_indicators {
        if let Some(unknown) = selected.iter().find(|n| !catalog.indicators.contains(*n)) {
            return Err(FilterError::UnknownIndicator(unknown.clone()));
        }
    }
    Ok(())
}
