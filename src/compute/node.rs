//! node.rs
//! Arena entries of the computation graph.

use super::error::ComputationError;
use crate::filter::DimensionSet;
use crate::indicators::{Params, ResolvedIndicator, SeriesSelector};
use crate::store::{Series, SeriesId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Identity of a node: the indicator and the fingerprint of its resolved
/// parameters. Filter values are not part of the key; nodes read them when
/// they compute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub indicator: String,
    pub fingerprint: String,
}

impl NodeKey {
    pub fn new(indicator: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self { indicator: indicator.into(), fingerprint: fingerprint.into() }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}#{}", self.indicator, self.fingerprint) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Uncomputed,
    Computing,
    Cached,
    Stale,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Uncomputed => "uncomputed",
            NodeState::Computing => "computing",
            NodeState::Cached => "cached",
            NodeState::Stale => "stale",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub state: NodeState,
    /// Filter version of the cached value, or of the last one if stale.
    pub last_computed_version: Option<u64>,
    /// Bumped on every invalidation; an in-flight result from an older epoch is dropped.
    pub epoch: u64,
    pub dependents: usize,
}

/// An input after the definition's references have been resolved.
#[derive(Debug, Clone)]
pub(crate) enum NodeInput {
    Node { key: NodeKey, name: String, params: Params },
    Series(SeriesId),
    Selection(SeriesSelector),
}

#[derive(Debug)]
pub(crate) struct ComputationNode {
    pub key: NodeKey,
    pub resolved: ResolvedIndicator,
    pub inputs: SmallVec<[NodeInput; 2]>,
    /// Filter dimensions this node reads itself.
    pub reads: DimensionSet,
    pub state: NodeState,
    pub value: Option<Arc<Series>>,
    pub last_computed_version: Option<u64>,
    pub epoch: u64,
    /// Incremented each time a computation starts.
    pub attempt: u64,
    pub last_failure: Option<(u64, ComputationError)>,
}

impl ComputationNode {
    pub fn new(key: NodeKey, resolved: ResolvedIndicator, inputs: SmallVec<[NodeInput; 2]>) -> Self {
        let reads = resolved.definition.direct_reads();
        Self {
            key,
            resolved,
            inputs,
            reads,
            state: NodeState::Uncomputed,
            value: None,
            last_computed_version: None,
            epoch: 0,
            attempt: 0,
            last_failure: None,
        }
    }

    /// Marks the node out of date. Returns whether it held or was producing a value.
    pub fn invalidate(&mut self) -> bool {
        self.epoch += 1;
        match self.state {
            NodeState::Cached => {
                self.state = NodeState::Stale;
                true
            }
            NodeState::Computing => true,
            NodeState::Uncomputed | NodeState::Stale => false,
        }
    }
}
