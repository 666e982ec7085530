//! Sea-ice climate indicator engine.
//!
//! A read-only store of monthly model and observation series feeds a registry
//! of named indicators. Each session owns a filter state (region, scenario,
//! date range) and a lazily computed dependency graph of indicator nodes.
//! Filter commits invalidate only the nodes that read a changed dimension,
//! and subscribed views receive recomputed values tagged with the filter
//! version they were computed under.

pub mod analysis;
pub mod binding;
pub mod compute;
pub mod config;
pub mod display;
pub mod error;
pub mod filter;
pub mod indicators;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod fixtures;

pub use binding::{Session, SessionHandle, SessionRuntime, ViewId, ViewRegistry};
pub use compute::{ComputationGraph, NodeKey, Publication};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use filter::{FilterPatch, FilterState};
pub use indicators::{standard_registry, IndicatorDefinition, IndicatorRegistry};
pub use store::{Series, SeriesStore};
