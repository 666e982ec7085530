//! filter/mod.rs
//! Filter/selection state: the only mutable input of a session.
pub mod history;
pub mod state;
pub mod validate;

pub use history::FilterHistory;
pub use state::{intersects, Dimension, DimensionSet, FilterPatch, FilterState};
pub use validate::{validate, FilterCatalog, FilterError};
