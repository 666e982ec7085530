//! publish.rs
//! Delivery of computed node values.

use super::error::ComputationError;
use super::node::NodeKey;
use crate::store::Series;
use std::sync::Arc;

/// What a subscribed view receives for one node.
#[derive(Debug, Clone, PartialEq)]
pub enum Publication {
    Ready(Arc<Series>),
    Unavailable(ComputationError),
}

impl Publication {
    pub fn series(&self) -> Option<&Arc<Series>> {
        match self {
            Publication::Ready(s) => Some(s),
            Publication::Unavailable(_) => None,
        }
    }
}

/// Receives every completed node value, tagged with the filter version it was
/// computed under.
pub trait PublishSink: Send + Sync {
    fn publish(&self, key: &NodeKey, version: u64, publication: Publication);
}
