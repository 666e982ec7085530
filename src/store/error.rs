//! error.rs

use super::types::{SeriesId, Timestamp};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("series '{0}' not found")]
    NotFound(SeriesId),
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: Timestamp, end: Timestamp },
    #[error("malformed series '{id}': {reason}")]
    MalformedSeries { id: SeriesId, reason: String },
    #[error("series '{0}' loaded twice")]
    DuplicateSeries(SeriesId),
    #[error("source '{source_name}' failed to load: {reason}")]
    Source { source_name: String, reason: String },
}
