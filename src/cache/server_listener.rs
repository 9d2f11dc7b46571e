//! Server-Listener Cache (C3, §4.3).

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::RwLock;

use crate::model::EndpointAddress;

/// `nodeHash → set of EndpointAddress`, monotonic: once an address is
/// observed for a node hash it is never removed (§3 — nodes cannot
/// un-bootstrap within a session).
///
/// A `DashMap` of per-node-hash `RwLock<HashSet<..>>` gives the
/// concurrent-map-of-thread-safe-sets shape §4.3 asks for without a
/// single crate-wide lock, matching the teacher's `dashmap` usage for
/// registries accessed from many tasks concurrently.
#[derive(Debug, Default)]
pub struct ServerListenerCache {
    addresses: DashMap<String, RwLock<HashSet<EndpointAddress>>>,
}

impl ServerListenerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `addresses` into the set for `node_hash`. Returns `true`
    /// iff at least one address was previously absent — the "need
    /// rebuild" signal consumed by `xds::SnapshotCache::create_watch`.
    pub fn add(&self, node_hash: &str, addresses: impl IntoIterator<Item = EndpointAddress>) -> bool {
        let entry = self.addresses.entry(node_hash.to_string()).or_default();
        let mut set = entry.write().expect("server listener cache lock poisoned");
        let mut grew = false;
        for address in addresses {
            if set.insert(address) {
                grew = true;
            }
        }
        grew
    }

    /// Current address set for `node_hash`, empty if never observed.
    pub fn get(&self, node_hash: &str) -> HashSet<EndpointAddress> {
        self.addresses
            .get(node_hash)
            .map(|entry| entry.read().expect("server listener cache lock poisoned").clone())
            .unwrap_or_default()
    }
}
