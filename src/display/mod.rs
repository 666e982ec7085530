//! display/mod.rs
//! Human-readable diagnostics.
pub mod trace;

pub use trace::format_trace;
