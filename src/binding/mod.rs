//! binding/mod.rs
//! Everything between a user's filter events and the views that display
//! indicator values.
pub mod coalesce;
pub mod runtime;
pub mod session;
pub mod views;

pub use coalesce::Coalescer;
pub use runtime::{SessionHandle, SessionRuntime};
pub use session::{refresh_views, RefreshSummary, Session};
pub use views::{ViewCallback, ViewId, ViewRegistry};
