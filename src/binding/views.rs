//! views.rs
//! Subscriptions of rendering views to graph nodes.

use crate::compute::{NodeKey, Publication, PublishSink};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(pub String);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for ViewId {
    fn from(s: &str) -> Self { ViewId(s.to_string()) }
}

/// Called with the node, the filter version and the publication.
pub type ViewCallback = Arc<dyn Fn(&NodeKey, u64, &Publication) + Send + Sync>;

struct Subscription {
    key: NodeKey,
    /// Filter version current when the view subscribed.
    since: u64,
    callback: ViewCallback,
}

#[derive(Default)]
struct Views {
    subscriptions: BTreeMap<ViewId, Subscription>,
    /// Highest version delivered per node.
    delivered: HashMap<NodeKey, u64>,
    /// Latest committed filter version. Anything computed under an older one is discarded.
    committed: u64,
}

/// Fans node publications out to subscribed views.
///
/// Callbacks run while the registry lock is held, so deliveries for one node
/// are never reordered. A callback must not call back into the registry.
#[derive(Default)]
pub struct ViewRegistry {
    inner: Mutex<Views>,
}

impl ViewRegistry {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, Views> { self.inner.lock().unwrap_or_else(PoisonError::into_inner) }

    /// Binds `view` to `key`, replacing any previous binding of the view.
    /// Returns the key the view was bound to before, if it differs.
    pub fn subscribe(&self, view: ViewId, key: NodeKey, since: u64, callback: ViewCallback) -> Option<NodeKey> {
        debug!(view = %view, node = %key, since, "view subscribed");
        let mut views = self.lock();
        let previous = views.subscriptions.insert(view, Subscription { key: key.clone(), since, callback })?;
        if previous.key == key {
            return None;
        }
        views.release(&previous.key);
        Some(previous.key)
    }

    /// Returns whether the view was subscribed.
    pub fn unsubscribe(&self, view: &ViewId) -> bool {
        let mut views = self.lock();
        let Some(sub) = views.subscriptions.remove(view) else {
            return false;
        };
        views.release(&sub.key);
        debug!(view = %view, node = %sub.key, "view unsubscribed");
        true
    }

    pub fn len(&self) -> usize { self.lock().subscriptions.len() }
    pub fn is_empty(&self) -> bool { self.lock().subscriptions.is_empty() }

    pub fn key_of(&self, view: &ViewId) -> Option<NodeKey> {
        self.lock().subscriptions.get(view).map(|s| s.key.clone())
    }

    /// Every node some view is bound to.
    pub fn roots(&self) -> Vec<NodeKey> {
        let keys: BTreeSet<NodeKey> = self.lock().subscriptions.values().map(|s| s.key.clone()).collect();
        keys.into_iter().collect()
    }

    /// Records that filter `version` has been committed. Publications stamped
    /// with an older version are dropped from now on.
    pub fn advance(&self, version: u64) {
        let mut views = self.lock();
        views.committed = views.committed.max(version);
    }

    pub fn committed(&self) -> u64 { self.lock().committed }

    /// Delivers to every subscriber of `key`. A publication older than the
    /// committed filter, or than the last one delivered for the node, is
    /// dropped. Returns the number of views reached.
    pub fn publish(&self, key: &NodeKey, version: u64, publication: &Publication) -> usize {
        let mut views = self.lock();
        if version < views.committed {
            debug!(node = %key, version, committed = views.committed, "dropping publication from a replaced filter");
            return 0;
        }
        if let Some(&last) = views.delivered.get(key) {
            if version < last {
                debug!(node = %key, version, last, "dropping outdated publication");
                return 0;
            }
        }
        views.delivered.insert(key.clone(), version);

        let mut reached = 0;
        for sub in views.subscriptions.values().filter(|s| &s.key == key && s.since <= version) {
            (sub.callback)(key, version, publication);
            reached += 1;
        }
        reached
    }
}

impl Views {
    /// Forgets delivery history for `key` once no view is bound to it.
    fn release(&mut self, key: &NodeKey) {
        if !self.subscriptions.values().any(|s| &s.key == key) {
            self.delivered.remove(key);
        }
    }
}

impl PublishSink for ViewRegistry {
    fn publish(&self, key: &NodeKey, version: u64, publication: Publication) {
        ViewRegistry::publish(self, key, version, &publication);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Dimensions, Series};
    use chrono::NaiveDate;

    type Log = Arc<Mutex<Vec<(String, u64)>>>;

    fn recorder(log: &Log, name: &str) -> ViewCallback {
        let log = Arc::clone(log);
        let name = name.to_string();
        Arc::new(move |_: &NodeKey, version: u64, _: &Publication| log.lock().unwrap().push((name.clone(), version)))
    }

    fn ready() -> Publication {
        let d = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        Publication::Ready(Arc::new(Series::new("x", Dimensions::new(), vec![d], vec![Some(1.0)]).unwrap()))
    }

    #[test]
    fn test_fan_out_and_ordering() {
        let views = ViewRegistry::new();
        let log: Log = Arc::default();
        let key = NodeKey::new("extent", "aa");
        let other = NodeKey::new("area", "bb");
        views.subscribe("plot".into(), key.clone(), 0, recorder(&log, "plot"));
        views.subscribe("table".into(), key.clone(), 0, recorder(&log, "table"));
        views.subscribe("area".into(), other.clone(), 0, recorder(&log, "area"));

        assert_eq!(views.publish(&key, 2, &ready()), 2);
        assert_eq!(views.publish(&key, 1, &ready()), 0);
        assert_eq!(views.publish(&key, 2, &ready()), 2);
        assert_eq!(views.roots(), vec![other, key]);
        assert_eq!(log.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_subscription_version_floor() {
        let views = ViewRegistry::new();
        let log: Log = Arc::default();
        let key = NodeKey::new("extent", "aa");
        views.subscribe("late".into(), key.clone(), 5, recorder(&log, "late"));
        assert_eq!(views.publish(&key, 4, &ready()), 0);
        assert_eq!(views.publish(&key, 5, &ready()), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let views = ViewRegistry::new();
        let log: Log = Arc::default();
        let key = NodeKey::new("extent", "aa");
        views.subscribe("plot".into(), key.clone(), 0, recorder(&log, "plot"));
        assert!(views.unsubscribe(&"plot".into()));
        assert!(!views.unsubscribe(&"plot".into()));
        assert_eq!(views.publish(&key, 0, &ready()), 0);
        assert!(views.roots().is_empty());
    }

    #[test]
    fn test_committed_version_floor() {
        let views = ViewRegistry::new();
        let log: Log = Arc::default();
        let key = NodeKey::new("extent", "aa");
        views.subscribe("plot".into(), key.clone(), 0, recorder(&log, "plot"));
        views.advance(3);
        views.advance(1);
        assert_eq!(views.committed(), 3);
        assert_eq!(views.publish(&key, 2, &ready()), 0);
        assert_eq!(views.publish(&key, 3, &ready()), 1);
    }

    #[test]
    fn test_rebinding_releases_old_key() {
        let views = ViewRegistry::new();
        let log: Log = Arc::default();
        let first = NodeKey::new("extent", "aa");
        let second = NodeKey::new("extent", "bb");
        views.subscribe("plot".into(), first.clone(), 0, recorder(&log, "plot"));
        assert_eq!(views.publish(&first, 5, &ready()), 1);

        assert_eq!(views.subscribe("plot".into(), second.clone(), 0, recorder(&log, "plot")), Some(first.clone()));
        assert_eq!(views.subscribe("plot".into(), second.clone(), 0, recorder(&log, "plot")), None);
        assert_eq!(views.roots(), vec![second.clone()]);

        // Bound again from scratch: earlier deliveries no longer gate it.
        views.subscribe("plot".into(), first.clone(), 0, recorder(&log, "plot"));
        assert_eq!(views.publish(&first, 3, &ready()), 1);
    }
}
