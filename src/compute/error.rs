//! error.rs
//! Node failures and graph-level errors.

use super::node::NodeKey;
use crate::indicators::{IndicatorError, RegistryError};
use thiserror::Error;

/// Why a node failed to produce a value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Cause {
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("upstream {0}")]
    Upstream(Box<ComputationError>),
    #[error("node is not part of the graph")]
    UnknownNode,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("computation of {key} failed: {cause}")]
pub struct ComputationError {
    pub key: NodeKey,
    pub cause: Cause,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Computation(#[from] ComputationError),
    #[error("filter version {offered} does not advance past {current}")]
    VersionRegression { current: u64, offered: u64 },
}
