//! # Application Model (C1)
//!
//! Immutable value types for applications and their endpoints. Every
//! type here is a plain value with a total order — there are no mutation
//! APIs; builders return new values. This mirrors the teacher's
//! `xds::cluster::ClusterConfig`/`xds::listener::ListenerConfig` value-type
//! style, generalized from Envoy-proto-shaped config structs to the
//! domain model the snapshot builder consumes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// `{host, port}`. Used as a set element for server-listener addresses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointAddress {
    pub host: String,
    pub port: u32,
}

impl EndpointAddress {
    pub fn new(host: impl Into<String>, port: u32) -> Self {
        Self { host: host.into(), port }
    }
}

/// Health state of a single application endpoint, derived from
/// EndpointSlice conditions during translation (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Draining,
}

/// One data-plane endpoint backing an application. Canonical order
/// (`Ord`) is by `(zone, node, addresses)` only, per §3; `PartialEq`/`Eq`
/// are derived from the full struct, including `health_status`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationEndpoint {
    pub node: String,
    pub zone: String,
    pub addresses: Vec<String>,
    pub health_status: HealthStatus,
}

impl ApplicationEndpoint {
    pub fn new(
        node: impl Into<String>,
        zone: impl Into<String>,
        addresses: Vec<String>,
        health_status: HealthStatus,
    ) -> Self {
        Self { node: node.into(), zone: zone.into(), addresses, health_status }
    }

    fn order_key(&self) -> (&str, &str, &[String]) {
        (&self.zone, &self.node, &self.addresses)
    }
}

impl PartialOrd for ApplicationEndpoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ApplicationEndpoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

/// Health check configuration for an application's cluster (§4.5).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub protocol: String,
    pub port: u32,
    pub path_or_grpc_service: String,
}

/// An application's observed, cross-referenced xDS identity plus its
/// current endpoint set. Constructed once per EndpointSlice translation
/// pass, never mutated afterward; discarded with the `ApplicationCache`
/// entry that owned it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Application {
    pub namespace: String,
    pub service_account: String,
    pub listener_name: String,
    pub route_config_name: String,
    pub cluster_name: String,
    pub eds_service_name: String,
    pub path_prefix: String,
    pub port: u32,
    pub health_check: Option<HealthCheckConfig>,
    pub endpoints: BTreeSet<ApplicationEndpoint>,
}

impl Application {
    /// Convenience constructor: `listenerName = routeConfigName =
    /// clusterName = edsServiceName = serviceAccount = k8sServiceName`
    /// (§3).
    pub fn new(
        k8s_service_name: impl Into<String>,
        namespace: impl Into<String>,
        path_prefix: impl Into<String>,
        port: u32,
        health_check: Option<HealthCheckConfig>,
        endpoints: impl IntoIterator<Item = ApplicationEndpoint>,
    ) -> Self {
        let name = k8s_service_name.into();
        Self {
            namespace: namespace.into(),
            service_account: name.clone(),
            listener_name: name.clone(),
            route_config_name: name.clone(),
            cluster_name: name.clone(),
            eds_service_name: name,
            path_prefix: path_prefix.into(),
            port,
            health_check,
            endpoints: endpoints.into_iter().collect(),
        }
    }

    /// Field-by-field comparison per the declared struct order, matching
    /// §4.1's `compare`. Equivalent to `Ord::cmp` since the struct's
    /// derive order already follows the contract.
    pub fn compare(&self, other: &Self) -> std::cmp::Ordering {
        self.cmp(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(zone: &str, node: &str, addr: &str) -> ApplicationEndpoint {
        ApplicationEndpoint::new(node, zone, vec![addr.to_string()], HealthStatus::Healthy)
    }

    #[test]
    fn canonical_ordering_is_independent_of_input_order() {
        let a = Application::new(
            "greeter-leaf",
            "ns1",
            "/",
            50051,
            None,
            vec![endpoint("us-central1-a", "node-1", "10.0.0.1"), endpoint("us-central1-b", "node-2", "10.0.0.2")],
        );
        let b = Application::new(
            "greeter-leaf",
            "ns1",
            "/",
            50051,
            None,
            vec![endpoint("us-central1-b", "node-2", "10.0.0.2"), endpoint("us-central1-a", "node-1", "10.0.0.1")],
        );
        assert_eq!(a.compare(&b), std::cmp::Ordering::Equal);
        assert_eq!(a, b);
    }

    #[test]
    fn convenience_constructor_names_all_match_service_name() {
        let app = Application::new("greeter-leaf", "ns1", "/", 50051, None, vec![]);
        assert_eq!(app.listener_name, "greeter-leaf");
        assert_eq!(app.route_config_name, "greeter-leaf");
        assert_eq!(app.cluster_name, "greeter-leaf");
        assert_eq!(app.eds_service_name, "greeter-leaf");
        assert_eq!(app.service_account, "greeter-leaf");
    }

    #[test]
    fn endpoint_address_equality_is_structural() {
        assert_eq!(EndpointAddress::new("10.0.0.1", 50051), EndpointAddress::new("10.0.0.1", 50051));
        assert_ne!(EndpointAddress::new("10.0.0.1", 50051), EndpointAddress::new("10.0.0.1", 50052));
    }
}
