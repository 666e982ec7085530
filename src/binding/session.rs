//! session.rs
//! One user's filter history, graph and views over the shared store and registry.

use super::coalesce::Coalescer;
use super::views::{ViewCallback, ViewId, ViewRegistry};
use crate::compute::{ComputationGraph, GraphError, NodeKey, Publication};
use crate::config::EngineConfig;
use crate::display;
use crate::error::Result;
use crate::filter::{validate, FilterCatalog, FilterError, FilterHistory, FilterPatch, FilterState};
use crate::indicators::{IndicatorRegistry, Params};
use crate::store::SeriesStore;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub ready: usize,
    pub unavailable: usize,
    /// Results withheld because a newer filter was committed during the refresh.
    pub superseded: usize,
}

pub struct Session {
    history: FilterHistory,
    graph: Arc<ComputationGraph>,
    views: Arc<ViewRegistry>,
    coalescer: Coalescer,
    catalog: FilterCatalog,
}

impl Session {
    /// Starts at the configured default region, scenario and date range.
    pub fn new(store: Arc<SeriesStore>, registry: Arc<IndicatorRegistry>, config: &EngineConfig) -> Self {
        let initial =
            FilterState::initial(&config.default_region, &config.default_scenario, config.default_date_range);
        let catalog = FilterCatalog::from_sources(&store, &registry);
        let history = FilterHistory::new(initial, config.history_limit);
        let graph = ComputationGraph::new(store, registry, Arc::clone(history.current()));
        Self {
            history,
            graph: Arc::new(graph),
            views: Arc::new(ViewRegistry::new()),
            coalescer: Coalescer::new(config.debounce(), config.max_delay()),
            catalog,
        }
    }

    pub fn filter(&self) -> Arc<FilterState> { Arc::clone(self.history.current()) }
    pub fn catalog(&self) -> &FilterCatalog { &self.catalog }
    pub fn graph(&self) -> &Arc<ComputationGraph> { &self.graph }
    pub fn views(&self) -> &Arc<ViewRegistry> { &self.views }
    pub fn deadline(&self) -> Option<Instant> { self.coalescer.deadline() }

    pub fn submit(&mut self, patch: FilterPatch) -> Result<(), FilterError> { self.submit_at(patch, Instant::now()) }

    /// Validates `patch` and queues it. A rejected patch leaves nothing queued.
    pub fn submit_at(&mut self, patch: FilterPatch, now: Instant) -> Result<(), FilterError> {
        validate(&patch, &self.catalog)?;
        self.coalescer.submit_at(patch, now);
        Ok(())
    }

    /// Commits the queued patch if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Result<Option<Arc<FilterState>>, GraphError> {
        match self.coalescer.take_due(now) {
            Some(patch) => self.commit(&patch).map(Some),
            None => Ok(None),
        }
    }

    /// Commits `patch`, together with anything still queued, and refreshes
    /// every subscribed view.
    pub fn apply_now(&mut self, patch: FilterPatch) -> Result<Arc<FilterState>> {
        validate(&patch, &self.catalog)?;
        let merged = match self.coalescer.flush() {
            Some(queued) => queued.merge(patch),
            None => patch,
        };
        let state = self.commit(&merged)?;
        self.refresh();
        Ok(state)
    }

    fn commit(&mut self, patch: &FilterPatch) -> Result<Arc<FilterState>, GraphError> {
        let next = self.history.commit(patch);
        self.install(next)
    }

    fn install(&mut self, state: Arc<FilterState>) -> Result<Arc<FilterState>, GraphError> {
        // Views stop accepting the old version before the graph moves on.
        self.views.advance(state.version());
        let invalidated = self.graph.set_filter(Arc::clone(&state))?;
        info!(
            version = state.version(),
            region = state.region(),
            scenario = state.scenario(),
            date_range = %state.date_range(),
            invalidated = invalidated.len(),
            "filter committed"
        );
        Ok(state)
    }

    pub fn undo(&mut self) -> Result<Option<Arc<FilterState>>, GraphError> {
        match self.history.undo() {
            Some(state) => self.install(state).map(Some),
            None => Ok(None),
        }
    }

    pub fn redo(&mut self) -> Result<Option<Arc<FilterState>>, GraphError> {
        match self.history.redo() {
            Some(state) => self.install(state).map(Some),
            None => Ok(None),
        }
    }

    /// Binds `view` to an indicator node. The view receives values from the
    /// next refresh on. Re-binding a view drops the nodes only its old binding
    /// needed.
    pub fn subscribe(
        &mut self,
        view: ViewId,
        indicator: &str,
        overrides: &Params,
        callback: ViewCallback,
    ) -> Result<NodeKey, GraphError> {
        let key = self.graph.ensure(indicator, overrides)?;
        let replaced = self.views.subscribe(view, key.clone(), self.graph.filter().version(), callback);
        if replaced.is_some() {
            self.graph.collect_garbage(&self.views.roots());
        }
        Ok(key)
    }

    /// Unbinds `view` and drops graph nodes no remaining view depends on.
    pub fn unsubscribe(&mut self, view: &ViewId) -> bool {
        let removed = self.views.unsubscribe(view);
        if removed {
            self.graph.collect_garbage(&self.views.roots());
        }
        removed
    }

    pub fn refresh(&self) -> RefreshSummary { refresh_views(&self.graph, &self.views) }

    pub fn trace(&self, key: &NodeKey) -> String { display::format_trace(&self.graph, key) }
}

/// Computes every subscribed node in parallel and publishes the outcomes,
/// stamped with the filter version current when the refresh started.
///
/// If a newer filter is committed while the refresh runs, nothing more is
/// published; the refresh that follows the commit delivers the new values.
pub fn refresh_views(graph: &ComputationGraph, views: &ViewRegistry) -> RefreshSummary {
    let version = graph.filter().version();
    let keys = views.roots();

    let results: Vec<(NodeKey, Publication)> = keys
        .into_par_iter()
        .map(|key| {
            let publication = match graph.get(&key) {
                Ok(series) => Publication::Ready(series),
                Err(err) => Publication::Unavailable(err),
            };
            (key, publication)
        })
        .collect();

    let mut summary = RefreshSummary::default();
    for (key, publication) in &results {
        let current = graph.filter().version();
        if current != version {
            debug!(node = %key, version, current, "withholding result of a superseded refresh");
            summary.superseded += 1;
            continue;
        }
        match publication {
            Publication::Ready(_) => summary.ready += 1,
            Publication::Unavailable(_) => summary.unavailable += 1,
        }
        views.publish(key, version, publication);
    }
    summary
}
