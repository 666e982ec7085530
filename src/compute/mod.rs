//! compute/mod.rs
//! Lazily evaluated, selectively invalidated indicator graph.
pub mod error;
pub mod graph;
pub mod node;
pub mod publish;

pub use error::{Cause, ComputationError, GraphError};
pub use graph::{ComputationGraph, InputDescription, NodeDescription};
pub use node::{NodeKey, NodeState, NodeStatus};
pub use publish::{Publication, PublishSink};
