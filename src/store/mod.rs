//! store/mod.rs
//! The read-only series store and the types every other layer builds on.
pub mod error;
pub mod source;
pub mod table;
pub mod types;

pub use error::StoreError;
pub use source::{MemorySource, SeriesSource, SourceDescriptor};
pub use table::{slice, SeriesStore};
pub use types::{dims, DateRange, Dimensions, RawSeries, Series, SeriesId, Timestamp};
