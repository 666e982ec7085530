//! indicators/mod.rs
//! Declarative indicator definitions, their kernels and the registry.
pub mod catalog;
pub mod definition;
pub mod error;
pub mod kernel;
pub mod params;
pub mod registry;

pub use catalog::{register_standard, standard_registry};
pub use definition::{ComputeFn, ComputeInput, IndicatorDefinition, InputRef, Operation, SeriesSelector};
pub use error::{IndicatorError, RegistryError};
pub use kernel::Season;
pub use params::{ParamValue, Params};
pub use registry::{IndicatorRegistry, ResolvedIndicator};
