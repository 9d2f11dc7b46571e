//! xDS federation (`xdstp://`) resource naming (§3, §6).

/// `xdstp://<authority>/envoy.config.<kind>.v3.<Kind>/<name>`.
pub fn federated_name(authority: &str, kind: &str, name: &str) -> String {
    format!("xdstp://{authority}/envoy.config.{kind}/{name}")
}

pub fn listener_type(authority: &str, name: &str) -> String {
    federated_name(authority, "listener.v3.Listener", name)
}

pub fn route_type(authority: &str, name: &str) -> String {
    federated_name(authority, "route.v3.RouteConfiguration", name)
}

pub fn cluster_type(authority: &str, name: &str) -> String {
    federated_name(authority, "cluster.v3.Cluster", name)
}

pub fn endpoint_type(authority: &str, name: &str) -> String {
    federated_name(authority, "endpoint.v3.ClusterLoadAssignment", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_federated_listener_name() {
        assert_eq!(
            listener_type("xds.example.com", "greeter-leaf"),
            "xdstp://xds.example.com/envoy.config.listener.v3.Listener/greeter-leaf"
        );
    }
}
