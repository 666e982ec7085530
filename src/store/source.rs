//! source.rs
//! The ingestion boundary. File and format parsing live outside the crate; a
//! `SeriesSource` hands over unvalidated columns and the store checks them.

use super::error::StoreError;
use super::types::{Dimensions, RawSeries};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Names one loadable unit (a dataset URL, a file, a table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub location: String,
    /// Dimensions stamped onto every series of this source unless the series
    /// already carries them (e.g. `source = "osisaf"`).
    #[serde(default)]
    pub dimensions: Dimensions,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self { name: name.into(), location: location.into(), dimensions: Dimensions::new() }
    }

    pub fn with_dimension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(key.into(), value.into());
        self
    }
}

pub trait SeriesSource: Send + Sync {
    fn load(&self, descriptor: &SourceDescriptor) -> Result<Vec<RawSeries>, StoreError>;
}

/// Series already held in memory, keyed by descriptor location.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: HashMap<String, Vec<RawSeries>>,
}

impl MemorySource {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, location: impl Into<String>, series: Vec<RawSeries>) {
        self.tables.entry(location.into()).or_default().extend(series);
    }
}

impl SeriesSource for MemorySource {
    fn load(&self, descriptor: &SourceDescriptor) -> Result<Vec<RawSeries>, StoreError> {
        self.tables.get(&descriptor.location).cloned().ok_or_else(|| StoreError::Source {
            source_name: descriptor.name.clone(),
            reason: format!("nothing registered at '{}'", descriptor.location),
        })
    }
}
