//! coalesce.rs
//! Debounced merging of rapid filter patches.

use crate::filter::FilterPatch;
use std::time::{Duration, Instant};

enum Pending {
    Idle,
    Waiting { patch: FilterPatch, first_at: Instant, last_at: Instant },
}

/// Merges patches until input has been quiet for `debounce`, or `max_delay`
/// has passed since the first pending patch, whichever comes first.
pub struct Coalescer {
    debounce: Duration,
    max_delay: Duration,
    pending: Pending,
}

impl Coalescer {
    pub fn new(debounce: Duration, max_delay: Duration) -> Self {
        Self { debounce, max_delay: max_delay.max(debounce), pending: Pending::Idle }
    }

    pub fn is_pending(&self) -> bool { matches!(self.pending, Pending::Waiting { .. }) }

    pub fn submit(&mut self, patch: FilterPatch) { self.submit_at(patch, Instant::now()) }

    /// Later fields win over earlier ones.
    pub fn submit_at(&mut self, patch: FilterPatch, now: Instant) {
        self.pending = match std::mem::replace(&mut self.pending, Pending::Idle) {
            Pending::Idle => Pending::Waiting { patch, first_at: now, last_at: now },
            Pending::Waiting { patch: earlier, first_at, .. } => {
                Pending::Waiting { patch: earlier.merge(patch), first_at, last_at: now }
            }
        };
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.pending {
            Pending::Idle => None,
            Pending::Waiting { first_at, last_at, .. } => {
                Some((*last_at + self.debounce).min(*first_at + self.max_delay))
            }
        }
    }

    /// The merged patch, once its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<FilterPatch> {
        match self.deadline() {
            Some(deadline) if deadline <= now => self.flush(),
            _ => None,
        }
    }

    /// The merged patch regardless of the deadline.
    pub fn flush(&mut self) -> Option<FilterPatch> {
        match std::mem::replace(&mut self.pending, Pending::Idle) {
            Pending::Idle => None,
            Pending::Waiting { patch, .. } => Some(patch),
        }
    }
}
