//! graph.rs
//! The per-session computation graph.
//!
//! Nodes live in a `StableDiGraph` arena with edges running from an input
//! node to the node that consumes it. All state transitions happen under one
//! mutex; operations run outside it so independent nodes compute in parallel
//! and a waiter on an in-flight node simply blocks on the condition variable.

use super::error::{Cause, ComputationError, GraphError};
use super::node::{ComputationNode, NodeInput, NodeKey, NodeState, NodeStatus};
use super::publish::{Publication, PublishSink};
use crate::filter::{intersects, FilterState};
use crate::indicators::{ComputeInput, IndicatorError, IndicatorRegistry, InputRef, Params, ResolvedIndicator};
use crate::store::{dims, Dimensions, Series, SeriesId, SeriesStore};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

pub struct ComputationGraph {
    store: Arc<SeriesStore>,
    registry: Arc<IndicatorRegistry>,
    inner: Mutex<GraphInner>,
    ready: Condvar,
    sink: Option<Arc<dyn PublishSink>>,
}

struct GraphInner {
    filter: Arc<FilterState>,
    nodes: StableDiGraph<ComputationNode, ()>,
    index: HashMap<NodeKey, NodeIndex>,
}

/// Everything a computation needs, captured when the node enters `Computing`.
struct Job {
    key: NodeKey,
    resolved: ResolvedIndicator,
    inputs: SmallVec<[NodeInput; 2]>,
    filter: Arc<FilterState>,
    epoch: u64,
    attempt: u64,
}

/// Read-only view of one node, for diagnostics.
#[derive(Debug, Clone)]
pub struct NodeDescription {
    pub key: NodeKey,
    pub operation: &'static str,
    pub status: NodeStatus,
    pub value: Option<Arc<Series>>,
    pub inputs: Vec<InputDescription>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputDescription {
    Node(NodeKey),
    Series(SeriesId),
    /// Store criteria under the current filter.
    Selection(Dimensions),
}

impl ComputationGraph {
    pub fn new(store: Arc<SeriesStore>, registry: Arc<IndicatorRegistry>, filter: Arc<FilterState>) -> Self {
        Self {
            store,
            registry,
            inner: Mutex::new(GraphInner { filter, nodes: StableDiGraph::new(), index: HashMap::new() }),
            ready: Condvar::new(),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn PublishSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn lock(&self) -> MutexGuard<'_, GraphInner> { self.inner.lock().unwrap_or_else(PoisonError::into_inner) }

    pub fn store(&self) -> &Arc<SeriesStore> { &self.store }
    pub fn registry(&self) -> &Arc<IndicatorRegistry> { &self.registry }
    pub fn filter(&self) -> Arc<FilterState> { Arc::clone(&self.lock().filter) }
    pub fn node_count(&self) -> usize { self.lock().nodes.node_count() }

    pub fn cached_count(&self) -> usize {
        self.lock().nodes.node_weights().filter(|n| n.state == NodeState::Cached).count()
    }

    /// Returns the key of `name` under `overrides`, creating the node and its
    /// upstream nodes on first reference.
    pub fn ensure(&self, name: &str, overrides: &Params) -> Result<NodeKey, GraphError> {
        let mut inner = self.lock();
        let idx = self.ensure_locked(&mut inner, name, overrides)?;
        Ok(inner.nodes[idx].key.clone())
    }

    fn ensure_locked(
        &self,
        inner: &mut GraphInner,
        name: &str,
        overrides: &Params,
    ) -> Result<NodeIndex, GraphError> {
        let resolved = self.registry.resolve(name, overrides)?;
        let key = NodeKey::new(name, resolved.fingerprint.clone());
        if let Some(&idx) = inner.index.get(&key) {
            return Ok(idx);
        }

        let mut inputs: SmallVec<[NodeInput; 2]> = SmallVec::new();
        let mut upstream: SmallVec<[NodeIndex; 2]> = SmallVec::new();
        for input in &resolved.definition.inputs {
            match input {
                InputRef::Indicator { name, params } => {
                    let params = resolved.definition.forwarded(params, &resolved.params);
                    let idx = self.ensure_locked(inner, name, &params)?;
                    upstream.push(idx);
                    inputs.push(NodeInput::Node { key: inner.nodes[idx].key.clone(), name: name.clone(), params });
                }
                InputRef::Series(id) => inputs.push(NodeInput::Series(id.clone())),
                InputRef::Selection(sel) => inputs.push(NodeInput::Selection(sel.clone())),
            }
        }

        let idx = inner.nodes.add_node(ComputationNode::new(key.clone(), resolved, inputs));
        for up in upstream {
            inner.nodes.add_edge(up, idx, ());
        }
        debug!(node = %key, "created node");
        inner.index.insert(key, idx);
        Ok(idx)
    }

    /// Ensures and computes in one step.
    pub fn request(&self, name: &str, overrides: &Params) -> Result<Arc<Series>, GraphError> {
        let key = self.ensure(name, overrides)?;
        Ok(self.get(&key)?)
    }

    /// The value of `key` at the current filter version.
    ///
    /// A cached value is returned as is. An uncomputed or stale node is
    /// computed by this caller; concurrent callers wait for that computation
    /// and share its outcome. A result invalidated while in flight is dropped
    /// and the node is computed again.
    pub fn get(&self, key: &NodeKey) -> Result<Arc<Series>, ComputationError> {
        loop {
            let job = self.claim(key)?;
            let job = match job {
                Claim::Done(series) => return Ok(series),
                Claim::Compute(job) => job,
            };

            let result = self.evaluate(&job);

            match self.commit(&job, result) {
                Committed::Ready(series) => {
                    self.notify(key, job.filter.version(), Publication::Ready(Arc::clone(&series)));
                    return Ok(series);
                }
                Committed::Failed(err) => {
                    self.notify(key, job.filter.version(), Publication::Unavailable(err.clone()));
                    return Err(err);
                }
                Committed::Cancelled => continue,
            }
        }
    }

    fn claim(&self, key: &NodeKey) -> Result<Claim, ComputationError> {
        let unknown = || ComputationError { key: key.clone(), cause: Cause::UnknownNode };
        let mut inner = self.lock();
        let mut waiting_on: Option<u64> = None;

        loop {
            {
                let GraphInner { filter, nodes, index } = &mut *inner;
                let idx = *index.get(key).ok_or_else(unknown)?;
                let node = &mut nodes[idx];

                if let (Some(attempt), Some((failed, err))) = (waiting_on, &node.last_failure) {
                    if *failed == attempt {
                        return Err(err.clone());
                    }
                }

                match node.state {
                    NodeState::Cached => {
                        if let Some(value) = &node.value {
                            return Ok(Claim::Done(Arc::clone(value)));
                        }
                        node.state = NodeState::Uncomputed;
                        continue;
                    }
                    NodeState::Computing => waiting_on = Some(node.attempt),
                    NodeState::Uncomputed | NodeState::Stale => {
                        node.state = NodeState::Computing;
                        node.attempt += 1;
                        let job = Job {
                            key: key.clone(),
                            resolved: node.resolved.clone(),
                            inputs: node.inputs.clone(),
                            epoch: node.epoch,
                            attempt: node.attempt,
                            filter: Arc::clone(filter),
                        };
                        debug!(node = %key, version = job.filter.version(), "computing");
                        return Ok(Claim::Compute(job));
                    }
                }
            }
            inner = self.ready.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn evaluate(&self, job: &Job) -> Result<Series, Cause> {
        let mut inputs: Vec<Arc<Series>> = Vec::with_capacity(job.inputs.len());
        for input in &job.inputs {
            match input {
                NodeInput::Node { key, name, params } => {
                    // Re-ensured so a garbage-collected input is rebuilt.
                    let current = self.ensure(name, params).map_err(|e| match e {
                        GraphError::Registry(r) => Cause::Registry(r),
                        other => Cause::Indicator(IndicatorError::Failed(other.to_string())),
                    })?;
                    debug_assert_eq!(&current, key);
                    let value = self.get(&current).map_err(|e| Cause::Upstream(Box::new(e)))?;
                    inputs.push(value);
                }
                NodeInput::Series(id) => inputs.push(self.store.get(id).map_err(IndicatorError::from)?),
                NodeInput::Selection(selector) => {
                    let criteria = selector.criteria(&job.filter, &job.resolved.params);
                    let matched = self.store.select(&criteria);
                    if matched.is_empty() {
                        return Err(Cause::Indicator(IndicatorError::Failed(format!(
                            "no series match {}",
                            describe_criteria(&criteria)
                        ))));
                    }
                    inputs.extend(matched);
                }
            }
        }

        let params = &job.resolved.params;
        let out = job.resolved.definition.operation.evaluate(&ComputeInput {
            inputs: &inputs,
            params,
            filter: &job.filter,
        })?;

        let mut dimensions = out.dimensions().clone();
        dimensions.insert(dims::INDICATOR.to_string(), job.key.indicator.clone());
        Ok(out.with_identity(job.key.to_string(), dimensions))
    }

    fn commit(&self, job: &Job, result: Result<Series, Cause>) -> Committed {
        let mut inner = self.lock();
        let Some(&idx) = inner.index.get(&job.key) else {
            // Collected while computing; hand the result to this caller only.
            return match result {
                Ok(series) => Committed::Ready(Arc::new(series)),
                Err(cause) => Committed::Failed(ComputationError { key: job.key.clone(), cause }),
            };
        };
        let node = &mut inner.nodes[idx];

        let outcome = if node.epoch != job.epoch {
            warn!(node = %job.key, version = job.filter.version(), "dropping result invalidated in flight");
            node.state = NodeState::Stale;
            Committed::Cancelled
        } else {
            match result {
                Ok(series) => {
                    let series = Arc::new(series);
                    node.state = NodeState::Cached;
                    node.value = Some(Arc::clone(&series));
                    node.last_computed_version = Some(job.filter.version());
                    node.last_failure = None;
                    debug!(node = %job.key, version = job.filter.version(), points = series.len(), "cached");
                    Committed::Ready(series)
                }
                Err(cause) => {
                    let err = ComputationError { key: job.key.clone(), cause };
                    warn!(node = %job.key, error = %err, "computation failed");
                    node.state = NodeState::Stale;
                    node.value = None;
                    node.last_failure = Some((job.attempt, err.clone()));
                    Committed::Failed(err)
                }
            }
        };
        drop(inner);
        self.ready.notify_all();
        outcome
    }

    fn notify(&self, key: &NodeKey, version: u64, publication: Publication) {
        if let Some(sink) = &self.sink {
            sink.publish(key, version, publication);
        }
    }

    /// Installs a newer filter and invalidates every node that reads a changed
    /// dimension, plus everything downstream of those nodes. Returns the keys
    /// of nodes that held or were producing a value.
    pub fn set_filter(&self, filter: Arc<FilterState>) -> Result<Vec<NodeKey>, GraphError> {
        let mut inner = self.lock();
        if filter.version() <= inner.filter.version() {
            return Err(GraphError::VersionRegression { current: inner.filter.version(), offered: filter.version() });
        }

        let changed = inner.filter.changed_dimensions(&filter);
        inner.filter = filter;
        if changed.is_empty() {
            return Ok(Vec::new());
        }

        let direct: Vec<NodeIndex> = inner
            .nodes
            .node_indices()
            .filter(|&i| intersects(&inner.nodes[i].reads, &changed))
            .collect();

        let mut dfs = Dfs::empty(&inner.nodes);
        dfs.stack.extend(direct);
        let mut affected = Vec::new();
        while let Some(i) = dfs.next(&inner.nodes) {
            affected.push(i);
        }

        let mut invalidated = Vec::new();
        for i in affected {
            let node = &mut inner.nodes[i];
            if node.invalidate() {
                invalidated.push(node.key.clone());
            }
        }
        debug!(
            version = inner.filter.version(),
            changed = ?changed,
            invalidated = invalidated.len(),
            "filter applied"
        );
        Ok(invalidated)
    }

    pub fn status(&self, key: &NodeKey) -> Option<NodeStatus> {
        let inner = self.lock();
        let idx = *inner.index.get(key)?;
        let node = &inner.nodes[idx];
        Some(NodeStatus {
            state: node.state,
            last_computed_version: node.last_computed_version,
            epoch: node.epoch,
            dependents: inner.nodes.neighbors_directed(idx, Direction::Outgoing).count(),
        })
    }

    pub fn describe(&self, key: &NodeKey) -> Option<NodeDescription> {
        let inner = self.lock();
        let idx = *inner.index.get(key)?;
        let node = &inner.nodes[idx];
        let inputs = node
            .inputs
            .iter()
            .map(|i| match i {
                NodeInput::Node { key, .. } => InputDescription::Node(key.clone()),
                NodeInput::Series(id) => InputDescription::Series(id.clone()),
                NodeInput::Selection(sel) => {
                    InputDescription::Selection(sel.criteria(&inner.filter, &node.resolved.params))
                }
            })
            .collect();
        Some(NodeDescription {
            key: node.key.clone(),
            operation: node.resolved.definition.operation.name(),
            status: NodeStatus {
                state: node.state,
                last_computed_version: node.last_computed_version,
                epoch: node.epoch,
                dependents: inner.nodes.neighbors_directed(idx, Direction::Outgoing).count(),
            },
            value: node.value.clone(),
            inputs,
        })
    }

    /// Removes every node that is neither upstream of one of `roots` nor in
    /// flight. Returns the number of nodes removed.
    pub fn collect_garbage(&self, roots: &[NodeKey]) -> usize {
        let mut inner = self.lock();

        let mut starts: Vec<NodeIndex> = roots.iter().filter_map(|k| inner.index.get(k).copied()).collect();
        starts.extend(inner.nodes.node_indices().filter(|&i| inner.nodes[i].state == NodeState::Computing));

        let mut keep = HashSet::new();
        {
            let upstream = Reversed(&inner.nodes);
            let mut dfs = Dfs::empty(upstream);
            dfs.stack.extend(starts);
            while let Some(i) = dfs.next(upstream) {
                keep.insert(i);
            }
        }

        let doomed: Vec<NodeIndex> = inner.nodes.node_indices().filter(|i| !keep.contains(i)).collect();
        for i in &doomed {
            if let Some(node) = inner.nodes.remove_node(*i) {
                inner.index.remove(&node.key);
            }
        }
        if !doomed.is_empty() {
            debug!(removed = doomed.len(), remaining = inner.nodes.node_count(), "collected unreachable nodes");
        }
        doomed.len()
    }
}

enum Claim {
    Done(Arc<Series>),
    Compute(Job),
}

enum Committed {
    Ready(Arc<Series>),
    Failed(ComputationError),
    Cancelled,
}

fn describe_criteria(criteria: &Dimensions) -> String {
    criteria.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(", ")
}
