//! error.rs
//! Registration and evaluation errors for indicators.

use crate::store::StoreError;
use thiserror::Error;

/// Registration-time and resolution-time failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("indicator '{0}' is already registered")]
    DuplicateName(String),
    #[error("registering '{name}' would create a dependency cycle: {}", cycle.join(" -> "))]
    CyclicDependency { name: String, cycle: Vec<String> },
    #[error("unknown indicator '{0}'")]
    UnknownIndicator(String),
    #[error("indicator '{indicator}' has no parameter '{param}'")]
    UnknownParameter { indicator: String, param: String },
    #[error("parameter '{param}' of '{indicator}' expects {expected}, got {actual}")]
    ParameterType { indicator: String, param: String, expected: &'static str, actual: &'static str },
    #[error("invalid definition '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },
}

/// Failures raised while evaluating one indicator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("{operation} expects {expected} input series, got {actual}")]
    Arity { operation: &'static str, expected: &'static str, actual: usize },
    #[error("missing parameter '{0}'")]
    MissingParameter(String),
    #[error("parameter '{name}' expects {expected}, got {actual}")]
    ParameterType { name: String, expected: &'static str, actual: &'static str },
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Failed(String),
}
