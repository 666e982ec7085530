//! history.rs
//! Committed filter states with undo/redo. Undo never rewinds the version
//! counter: returning to an older selection publishes it as a new state.

use super::state::{FilterPatch, FilterState};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FilterHistory {
    current: Arc<FilterState>,
    undo: Vec<Arc<FilterState>>,
    redo: Vec<Arc<FilterState>>,
    limit: usize,
}

impl FilterHistory {
    pub fn new(initial: FilterState, limit: usize) -> Self {
        Self { current: Arc::new(initial), undo: Vec::new(), redo: Vec::new(), limit: limit.max(1) }
    }

    pub fn current(&self) -> &Arc<FilterState> { &self.current }

    pub fn commit(&mut self, patch: &FilterPatch) -> Arc<FilterState> {
        let next = Arc::new(self.current.apply(patch));
        self.push_undo(Arc::clone(&self.current));
        self.redo.clear();
        self.current = Arc::clone(&next);
        next
    }

    pub fn undo(&mut self) -> Option<Arc<FilterState>> {
        let target = self.undo.pop()?;
        let next = Arc::new(self.current.restore(&target));
        self.redo.push(Arc::clone(&self.current));
        self.current = Arc::clone(&next);
        Some(next)
    }

    pub fn redo(&mut self) -> Option<Arc<FilterState>> {
        let target = self.redo.pop()?;
        let next = Arc::new(self.current.restore(&target));
        self.push_undo(Arc::clone(&self.current));
        self.current = Arc::clone(&next);
        Some(next)
    }

    pub fn can_undo(&self) -> bool { !self.undo.is_empty() }

    fn push_undo(&mut self, state: Arc<FilterState>) {
        if self.undo.len() == self.limit {
            self.undo.remove(0);
        }
        self.undo.push(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DateRange;
    use chrono::NaiveDate;

    fn history() -> FilterHistory {
        let r = DateRange {
            start: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2100, 12, 1).unwrap(),
        };
        FilterHistory::new(FilterState::initial("nh", "ssp126", r), 8)
    }

    #[test]
    fn test_undo_restores_values_with_new_version() {
        let mut h = history();
        h.commit(&FilterPatch::new().region("sh"));
        h.commit(&FilterPatch::new().scenario("ssp585"));
        assert_eq!(h.current().version(), 2);

        let back = h.undo().unwrap();
        assert_eq!(back.scenario(), "ssp126");
        assert_eq!(back.region(), "sh");
        assert_eq!(back.version(), 3);

        let fwd = h.redo().unwrap();
        assert_eq!(fwd.scenario(), "ssp585");
        assert_eq!(fwd.version(), 4);
    }

    #[test]
    fn test_commit_clears_redo_and_limit_applies() {
        let mut h = history();
        for region in ["a", "b", "c"] {
            h.commit(&FilterPatch::new().region(region));
        }
        h.undo();
        h.commit(&FilterPatch::new().region("z"));
        assert!(h.redo().is_none());

        let mut small = FilterHistory::new((**h.current()).clone(), 1);
        small.commit(&FilterPatch::new().region("x"));
        small.commit(&FilterPatch::new().region("y"));
        assert!(small.undo().is_some());
        assert!(small.undo().is_none());
    }
}
