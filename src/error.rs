//! error.rs
//! The crate-level error type.

use crate::compute::{ComputationError, GraphError};
use crate::config::ConfigError;
use crate::filter::FilterError;
use crate::indicators::{IndicatorError, RegistryError};
use crate::store::StoreError;
use thiserror::Error;

/// Every failure the engine reports, by the module that raised it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
    #[error(transparent)]
    InvalidFilter(#[from] FilterError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Computation(#[from] ComputationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("session runtime has shut down")]
    SessionClosed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
