//! Application Cache (C2, §4.2).

use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::Application;

/// Concurrent map keyed by `(kubecontext, namespace)` of ordered
/// application sequences, with change detection so callers can skip a
/// snapshot rebuild when an update is a no-op (§8's idempotence
/// property).
///
/// Internally a single `RwLock`: many concurrent readers on
/// `get`/`get_all`, one exclusive writer at a time on `put`, matching
/// the teacher's single-`RwLock`-per-cache style in `xds::state::XdsState`.
#[derive(Debug, Default)]
pub struct ApplicationCache {
    entries: RwLock<HashMap<(String, String), Vec<Application>>>,
}

impl ApplicationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entry for `(kubecontext, namespace)` atomically.
    /// Returns `true` iff the new sequence differs element-wise from the
    /// prior value (an absent entry is treated as empty).
    pub fn put(
        &self,
        kubecontext: impl Into<String>,
        namespace: impl Into<String>,
        apps: Vec<Application>,
    ) -> bool {
        let key = (kubecontext.into(), namespace.into());
        let mut entries = self.entries.write().expect("application cache lock poisoned");
        let changed = match entries.get(&key) {
            Some(existing) => existing != &apps,
            None => !apps.is_empty(),
        };
        if apps.is_empty() {
            entries.remove(&key);
        } else {
            entries.insert(key, apps);
        }
        changed
    }

    /// Ordered application sequence for one `(kubecontext, namespace)` key.
    pub fn get(&self, kubecontext: &str, namespace: &str) -> Vec<Application> {
        let entries = self.entries.read().expect("application cache lock poisoned");
        entries.get(&(kubecontext.to_string(), namespace.to_string())).cloned().unwrap_or_default()
    }

    /// All applications across all keys. Order is unspecified but stable
    /// for a given map state.
    pub fn get_all(&self) -> Vec<Application> {
        let entries = self.entries.read().expect("application cache lock poisoned");
        entries.values().flat_map(|apps| apps.iter().cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Application;

    fn app(name: &str) -> Application {
        Application::new(name, "ns1", "/", 50051, None, vec![])
    }

    #[test]
    fn put_reports_changed_on_first_insert() {
        let cache = ApplicationCache::new();
        assert!(cache.put("ctx1", "ns1", vec![app("greeter-leaf")]));
    }

    #[test]
    fn put_reports_unchanged_for_identical_second_call() {
        let cache = ApplicationCache::new();
        assert!(cache.put("ctx1", "ns1", vec![app("greeter-leaf")]));
        assert!(!cache.put("ctx1", "ns1", vec![app("greeter-leaf")]));
    }

    #[test]
    fn put_reports_changed_when_set_shrinks_to_empty() {
        let cache = ApplicationCache::new();
        cache.put("ctx1", "ns1", vec![app("greeter-leaf")]);
        assert!(cache.put("ctx1", "ns1", vec![]));
        assert!(cache.get("ctx1", "ns1").is_empty());
    }

    #[test]
    fn get_all_spans_every_key() {
        let cache = ApplicationCache::new();
        cache.put("ctx1", "ns1", vec![app("a")]);
        cache.put("ctx1", "ns2", vec![app("b")]);
        let mut names: Vec<_> = cache.get_all().into_iter().map(|a| a.cluster_name).collect();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
