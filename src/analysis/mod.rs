//! analysis/mod.rs
//! Structural analysis of indicator dependencies.
pub mod topology;
