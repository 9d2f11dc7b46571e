//! # Snapshot Cache (C6, §4.6)
//!
//! The ADS-facing watch-matching delegate: per-node-hash versioned
//! snapshots, the server-listener bootstrap protocol, and
//! `update_resources`'s aggregated rebuild sweep. Grounded on the
//! teacher's `xds::state::XdsState::apply_built_resources` (diff-based
//! cache update, version bump, `broadcast::Sender` publish per cached
//! table), generalized from one global cache to a map keyed by node
//! hash.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use envoy_types::pb::envoy::service::discovery::v3::DiscoveryRequest;
use tokio::sync::broadcast;

use crate::cache::{ApplicationCache, ServerListenerCache};
use crate::config::FeatureConfig;
use crate::errors::{AggregateError, Error, Result};
use crate::locality::{NodeHasher, PriorityMapper};
use crate::model::Application;
use crate::snapshot::{Snapshot, SnapshotBuilder, SnapshotBuilderOptions};

use super::bootstrap::parse_server_listener_names;
use super::response::build_response;
use super::types::LISTENER_TYPE_URL;

const SNAPSHOT_BROADCAST_CAPACITY: usize = 32;

impl From<&FeatureConfig> for SnapshotBuilderOptions {
    fn from(features: &FeatureConfig) -> Self {
        Self {
            enable_data_plane_tls: false,
            require_data_plane_client_certs: false,
            enable_rbac: features.enable_rbac,
            enable_federation: features.enable_federation,
            authority: features.authority.clone(),
            server_listener_uses_rds: features.server_listener_uses_rds,
            trust_domain: features.authority.clone(),
        }
    }
}

/// A per-node-hash broadcast of newly installed snapshots, subscribed to
/// by every ADS stream assigned to that node hash. The current snapshot
/// itself lives behind a `RwLock`: many concurrent readers, one writer
/// per install, matching §5's "Snapshot map... internal RW-lock" shared
/// resource policy.
struct NodeHashState {
    snapshot: std::sync::RwLock<Option<Arc<Snapshot>>>,
    updates: broadcast::Sender<Arc<Snapshot>>,
}

impl Default for NodeHashState {
    fn default() -> Self {
        let (updates, _) = broadcast::channel(SNAPSHOT_BROADCAST_CAPACITY);
        Self { snapshot: std::sync::RwLock::new(None), updates }
    }
}

impl NodeHashState {
    fn current(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    fn store(&self, snapshot: Arc<Snapshot>) {
        *self.snapshot.write().expect("snapshot lock poisoned") = Some(snapshot);
    }

    fn has_snapshot(&self) -> bool {
        self.snapshot.read().expect("snapshot lock poisoned").is_some()
    }
}

pub struct SnapshotCache {
    app_cache: Arc<ApplicationCache>,
    server_listener_cache: Arc<ServerListenerCache>,
    node_hasher: Arc<dyn NodeHasher>,
    priority_mapper: Arc<dyn PriorityMapper>,
    builder_options: SnapshotBuilderOptions,
    node_hashes: DashMap<String, Arc<NodeHashState>>,
}

impl SnapshotCache {
    pub fn new(
        node_hasher: Arc<dyn NodeHasher>,
        priority_mapper: Arc<dyn PriorityMapper>,
        builder_options: SnapshotBuilderOptions,
    ) -> Self {
        Self {
            app_cache: Arc::new(ApplicationCache::new()),
            server_listener_cache: Arc::new(ServerListenerCache::new()),
            node_hasher,
            priority_mapper,
            builder_options,
            node_hashes: DashMap::new(),
        }
    }

    pub fn node_hasher(&self) -> Arc<dyn NodeHasher> {
        self.node_hasher.clone()
    }

    /// §4.6's `createWatch` bootstrap side effects. Does not block on
    /// network I/O; on rebuild failure it logs and no-ops (the client
    /// retries per standard xDS semantics).
    pub fn create_watch(&self, request: &DiscoveryRequest) -> String {
        let node = request.node.clone().unwrap_or_default();
        let node_hash = self.node_hasher.hash(&node);
        let is_envoy = node.user_agent_name.eq_ignore_ascii_case("envoy");

        if request.type_url == LISTENER_TYPE_URL && (!request.resource_names.is_empty() || is_envoy) {
            let parsed = parse_server_listener_names(&request.resource_names);
            let grew = self.server_listener_cache.add(&node_hash, parsed);
            let exists = self.node_hashes.get(&node_hash).map(|s| s.has_snapshot()).unwrap_or(false);

            if !exists || grew {
                match self.rebuild(&node_hash) {
                    Ok(snapshot) => self.install(&node_hash, snapshot),
                    Err(error) => {
                        tracing::warn!(%node_hash, %error, "snapshot rebuild failed during create_watch, client will retry");
                    }
                }
            }
        }

        node_hash
    }

    /// Delta xDS is explicitly out of scope (spec.md §1's Non-goal); any
    /// delta request is rejected at the transport layer, not here.
    pub fn create_delta_watch(&self, _request: &DiscoveryRequest) -> Result<()> {
        Err(Error::transport("delta xDS is not supported; this core implements State-of-the-World only"))
    }

    /// Transparent delegation: builds a response from whatever snapshot
    /// currently exists for the request's node hash.
    pub fn fetch(&self, request: &DiscoveryRequest) -> Result<envoy_types::pb::envoy::service::discovery::v3::DiscoveryResponse> {
        let node = request.node.clone().unwrap_or_default();
        let node_hash = self.node_hasher.hash(&node);
        let snapshot = self.current_snapshot(&node_hash).ok_or_else(|| {
            Error::internal(format!("no snapshot installed yet for node hash '{node_hash}'"))
        })?;
        let requested: std::collections::HashSet<String> = request.resource_names.iter().cloned().collect();
        Ok(build_response(&snapshot, &request.type_url, &requested))
    }

    /// §4.6.2: replaces the application entry; if unchanged, returns
    /// immediately. Otherwise rebuilds every node hash that has ever had
    /// a snapshot installed, aggregating per-node-hash failures.
    pub fn update_resources(
        &self,
        kubecontext: &str,
        namespace: &str,
        applications: Vec<Application>,
    ) -> std::result::Result<(), AggregateError> {
        let changed = self.app_cache.put(kubecontext, namespace, applications);
        if !changed {
            return Ok(());
        }

        let mut aggregate = AggregateError::default();
        for node_hash in self.known_node_hashes() {
            match self.rebuild(&node_hash) {
                Ok(snapshot) => self.install(&node_hash, snapshot),
                Err(error) => aggregate.push(node_hash, error),
            }
        }

        if aggregate.is_empty() {
            Ok(())
        } else {
            Err(aggregate)
        }
    }

    pub fn current_snapshot(&self, node_hash: &str) -> Option<Arc<Snapshot>> {
        self.node_hashes.get(node_hash).and_then(|state| state.current())
    }

    /// Subscribes to every future snapshot install for `node_hash`,
    /// creating the broadcast channel if this is the first subscriber.
    pub fn subscribe(&self, node_hash: &str) -> broadcast::Receiver<Arc<Snapshot>> {
        self.node_hashes.entry(node_hash.to_string()).or_default().updates.subscribe()
    }

    fn known_node_hashes(&self) -> Vec<String> {
        self.node_hashes.iter().filter(|entry| entry.has_snapshot()).map(|entry| entry.key().clone()).collect()
    }

    fn install(&self, node_hash: &str, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        let state = self.node_hashes.entry(node_hash.to_string()).or_default();
        state.store(snapshot.clone());
        let _ = state.updates.send(snapshot);
    }

    fn rebuild(&self, node_hash: &str) -> Result<Snapshot> {
        let applications = self.app_cache.get_all();
        let addresses = self.server_listener_cache.get(node_hash);
        let namespaces: BTreeSet<String> = applications.iter().map(|app| app.namespace.clone()).collect();

        let mut builder =
            SnapshotBuilder::new(node_hash, self.priority_mapper.clone(), self.builder_options.clone());
        builder.add_applications(&applications)?;
        builder.add_server_listener_addresses(addresses, namespaces);
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locality::FixedNodeHasher;
    use crate::locality::FixedPriorityMapper;
    use crate::model::{ApplicationEndpoint, HealthStatus};
    use envoy_types::pb::envoy::config::core::v3::Node;

    fn cache() -> SnapshotCache {
        SnapshotCache::new(Arc::new(FixedNodeHasher), Arc::new(FixedPriorityMapper), SnapshotBuilderOptions::default())
    }

    fn app() -> Application {
        Application::new(
            "greeter-leaf",
            "ns1",
            "/",
            50051,
            None,
            vec![ApplicationEndpoint::new(
                "node-1",
                "us-central1-a",
                vec!["10.0.0.1".to_string()],
                HealthStatus::Healthy,
            )],
        )
    }

    fn listener_request(resource_names: Vec<String>) -> DiscoveryRequest {
        DiscoveryRequest {
            node: Some(Node::default()),
            resource_names,
            type_url: LISTENER_TYPE_URL.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn create_watch_installs_bootstrap_snapshot_on_first_request() {
        let cache = cache();
        let req = listener_request(vec!["grpc/server?xds.resource.listening_address=0.0.0.0:50051".to_string()]);
        let node_hash = cache.create_watch(&req);
        let snapshot = cache.current_snapshot(&node_hash).expect("snapshot installed");
        assert!(snapshot.listeners.contains_key("grpc/server?xds.resource.listening_address=0.0.0.0:50051"));
        assert!(snapshot.routes.contains_key("default_inbound_config"));
    }

    #[test]
    fn create_watch_does_not_rebuild_when_addresses_do_not_grow() {
        let cache = cache();
        let req = listener_request(vec!["grpc/server?xds.resource.listening_address=0.0.0.0:50051".to_string()]);
        let node_hash = cache.create_watch(&req);
        let first_version = cache.current_snapshot(&node_hash).unwrap().version.clone();
        cache.create_watch(&req);
        let second_version = cache.current_snapshot(&node_hash).unwrap().version.clone();
        assert_eq!(first_version, second_version);
    }

    #[test]
    fn update_resources_is_a_noop_on_identical_second_call() {
        let cache = cache();
        let req = listener_request(vec![]);
        cache.create_watch(&req); // no-op: no resource names, non-envoy agent

        assert!(cache.update_resources("ctx1", "ns1", vec![app()]).is_ok());
        assert!(cache.update_resources("ctx1", "ns1", vec![app()]).is_ok());
    }
}
