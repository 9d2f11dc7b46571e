//! `SnapshotBuilder`: accumulators keyed by resource name, consumed once
//! per rebuild and discarded (§4.5).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;

use crate::errors::{Error, Result};
use crate::locality::PriorityMapper;
use crate::model::{Application, ApplicationEndpoint, EndpointAddress};

use super::federation;
use super::resources;
use super::Snapshot;

/// Feature flags consulted by the snapshot builder (§6's configuration
/// table, minus the options that only affect the ADS server transport).
#[derive(Debug, Clone)]
pub struct SnapshotBuilderOptions {
    pub enable_data_plane_tls: bool,
    pub require_data_plane_client_certs: bool,
    pub enable_rbac: bool,
    pub enable_federation: bool,
    pub authority: String,
    pub server_listener_uses_rds: bool,
    pub trust_domain: String,
}

impl Default for SnapshotBuilderOptions {
    fn default() -> Self {
        Self {
            enable_data_plane_tls: false,
            require_data_plane_client_certs: false,
            enable_rbac: false,
            enable_federation: false,
            authority: "xds.cluster.local".to_string(),
            server_listener_uses_rds: true,
            trust_domain: "cluster.local".to_string(),
        }
    }
}

/// Accumulates LDS/RDS/CDS/EDS resources for one node hash across a
/// sequence of `add_applications`/`add_server_listener_addresses` calls,
/// then assembles an immutable [`Snapshot`] on `build()`. One builder
/// instance is used for exactly one rebuild; it is not reused.
pub struct SnapshotBuilder {
    node_hash: String,
    mapper: Arc<dyn PriorityMapper>,
    options: SnapshotBuilderOptions,

    listeners: HashMap<String, Listener>,
    routes: HashMap<String, RouteConfiguration>,
    clusters: HashMap<String, Cluster>,
    endpoints_by_cluster: HashMap<String, (String, u32, BTreeSet<ApplicationEndpoint>)>,
    server_listener_addresses: BTreeSet<EndpointAddress>,
    namespaces_with_server_listeners: BTreeSet<String>,
}

impl SnapshotBuilder {
    pub fn new(node_hash: impl Into<String>, mapper: Arc<dyn PriorityMapper>, options: SnapshotBuilderOptions) -> Self {
        Self {
            node_hash: node_hash.into(),
            mapper,
            options,
            listeners: HashMap::new(),
            routes: HashMap::new(),
            clusters: HashMap::new(),
            endpoints_by_cluster: HashMap::new(),
            server_listener_addresses: BTreeSet::new(),
            namespaces_with_server_listeners: BTreeSet::new(),
        }
    }

    /// For each application not already present in the builder by name,
    /// emits an API Listener, RouteConfiguration, Cluster, and (if
    /// federation is enabled) the `xdstp://` duplicate variants. Every
    /// application's endpoints are merged (set-union) into the
    /// accumulator for its cluster name, regardless of whether the
    /// cluster was already present — this is how endpoints from multiple
    /// `(kubecontext, namespace)` sources that happen to share a cluster
    /// name get combined before locality grouping (§4.5).
    pub fn add_applications(&mut self, apps: &[Application]) -> Result<&mut Self> {
        for app in apps {
            self.add_application(app)?;
        }
        Ok(self)
    }

    fn add_application(&mut self, app: &Application) -> Result<()> {
        if !self.listeners.contains_key(&app.listener_name) {
            let listener = resources::build_api_listener(app)
                .map_err(|e| Error::translation(&app.listener_name, e.to_string()))?;
            let route = resources::build_route_configuration(app)
                .map_err(|e| Error::translation(&app.route_config_name, e.to_string()))?;
            let cluster = resources::build_cluster(app, &self.options)
                .map_err(|e| Error::translation(&app.cluster_name, e.to_string()))?;

            if self.options.enable_federation {
                self.listeners.insert(
                    federation::listener_type(&self.options.authority, &app.listener_name),
                    listener.clone(),
                );
                self.routes.insert(
                    federation::route_type(&self.options.authority, &app.route_config_name),
                    route.clone(),
                );
                self.clusters.insert(
                    federation::cluster_type(&self.options.authority, &app.cluster_name),
                    cluster.clone(),
                );
            }

            self.listeners.insert(app.listener_name.clone(), listener);
            self.routes.insert(app.route_config_name.clone(), route);
            self.clusters.insert(app.cluster_name.clone(), cluster);
        }

        let entry = self
            .endpoints_by_cluster
            .entry(app.eds_service_name.clone())
            .or_insert_with(|| (app.cluster_name.clone(), app.port, BTreeSet::new()));
        entry.2.extend(app.endpoints.iter().cloned());

        Ok(())
    }

    /// Unions `addresses` into the builder's server-listener set (§4.5).
    pub fn add_server_listener_addresses(
        &mut self,
        addresses: impl IntoIterator<Item = EndpointAddress>,
        namespaces: impl IntoIterator<Item = String>,
    ) -> &mut Self {
        self.server_listener_addresses.extend(addresses);
        self.namespaces_with_server_listeners.extend(namespaces);
        self
    }

    /// Assembles the accumulated resources into an immutable [`Snapshot`]
    /// versioned by the current time (§4.5). No partial snapshot is ever
    /// returned: any resource-construction error aborts the whole build.
    pub fn build(self) -> Result<Snapshot> {
        let mut endpoints = HashMap::new();
        for (eds_service_name, (cluster_name, port, endpoint_set)) in &self.endpoints_by_cluster {
            let cla = resources::build_cluster_load_assignment(
                cluster_name,
                *port,
                endpoint_set,
                &self.node_hash,
                self.mapper.as_ref(),
            );
            endpoints.insert(eds_service_name.clone(), cla);

            if self.options.enable_federation {
                let federated_cla = resources::build_cluster_load_assignment(
                    &federation::cluster_type(&self.options.authority, cluster_name),
                    *port,
                    endpoint_set,
                    &self.node_hash,
                    self.mapper.as_ref(),
                );
                endpoints.insert(federation::endpoint_type(&self.options.authority, eds_service_name), federated_cla);
            }
        }

        let mut listeners = self.listeners;
        let mut routes = self.routes;

        if !self.server_listener_addresses.is_empty() {
            for address in &self.server_listener_addresses {
                let listener =
                    resources::build_server_listener(address, &self.namespaces_with_server_listeners, &self.options)
                        .map_err(|e| Error::translation(resources::server_listener_resource_name(address), e.to_string()))?;
                listeners.insert(listener.name.clone(), listener);
            }

            let default_inbound = resources::build_default_inbound_route_config(
                &self.namespaces_with_server_listeners,
                &self.options.trust_domain,
            )?;
            routes.insert("default_inbound_config".to_string(), default_inbound);
        }

        Ok(Snapshot {
            version: Snapshot::next_version(),
            listeners,
            routes,
            clusters: self.clusters,
            endpoints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locality::FixedPriorityMapper;
    use crate::model::{ApplicationEndpoint, HealthStatus};

    fn app_with_endpoints() -> Application {
        Application::new(
            "greeter-leaf",
            "ns1",
            "/",
            50051,
            None,
            vec![
                ApplicationEndpoint::new("node-1", "us-central1-a", vec!["10.0.0.1".to_string()], HealthStatus::Healthy),
                ApplicationEndpoint::new("node-2", "us-central1-b", vec!["10.0.0.2".to_string()], HealthStatus::Healthy),
            ],
        )
    }

    #[test]
    fn build_emits_cross_referenced_resources_for_one_application() {
        let mut builder =
            SnapshotBuilder::new("default", Arc::new(FixedPriorityMapper), SnapshotBuilderOptions::default());
        builder.add_applications(&[app_with_endpoints()]).unwrap();
        let snapshot = builder.build().unwrap();

        assert!(snapshot.listeners.contains_key("greeter-leaf"));
        assert!(snapshot.routes.contains_key("greeter-leaf"));
        assert!(snapshot.clusters.contains_key("greeter-leaf"));
        let cla = snapshot.endpoints.get("greeter-leaf").expect("cla present");
        assert_eq!(cla.endpoints.len(), 2);
    }

    #[test]
    fn build_merges_endpoints_for_same_cluster_name_across_calls() {
        let mut builder =
            SnapshotBuilder::new("default", Arc::new(FixedPriorityMapper), SnapshotBuilderOptions::default());
        let app = app_with_endpoints();
        builder.add_applications(std::slice::from_ref(&app)).unwrap();

        let mut second = app.clone();
        second.endpoints = vec![ApplicationEndpoint::new(
            "node-3",
            "us-central1-a",
            vec!["10.0.0.3".to_string()],
            HealthStatus::Healthy,
        )]
        .into_iter()
        .collect();
        builder.add_applications(&[second]).unwrap();

        let snapshot = builder.build().unwrap();
        let cla = snapshot.endpoints.get("greeter-leaf").unwrap();
        let total_lb_endpoints: usize = cla.endpoints.iter().map(|locality| locality.lb_endpoints.len()).sum();
        assert_eq!(total_lb_endpoints, 3);
    }

    #[test]
    fn build_emits_default_inbound_config_only_when_server_listeners_present() {
        let builder = SnapshotBuilder::new("default", Arc::new(FixedPriorityMapper), SnapshotBuilderOptions::default());
        let snapshot = builder.build().unwrap();
        assert!(!snapshot.routes.contains_key("default_inbound_config"));
    }

    #[test]
    fn build_emits_server_listener_and_default_inbound_config() {
        let mut builder = SnapshotBuilder::new("default", Arc::new(FixedPriorityMapper), SnapshotBuilderOptions::default());
        builder.add_server_listener_addresses(
            vec![EndpointAddress::new("0.0.0.0", 50051)],
            vec!["ns1".to_string()],
        );
        let snapshot = builder.build().unwrap();
        assert!(snapshot
            .listeners
            .contains_key("grpc/server?xds.resource.listening_address=0.0.0.0:50051"));
        assert!(snapshot.routes.contains_key("default_inbound_config"));
    }
}
