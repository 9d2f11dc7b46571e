//! EndpointSlice → Application translation (§4.7, §6).
//!
//! Pure functions: no Kubernetes client, no caching. Kept separate from
//! [`super::watch`] so the translation rules are unit-testable without a
//! cluster.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::discovery::v1::{EndpointPort, EndpointSlice};

use crate::errors::{Error, Result};
use crate::model::{Application, ApplicationEndpoint, HealthCheckConfig, HealthStatus};

const HEALTH_PORT_NAMES: [&str; 4] = ["health", "healthz", "healthCheck", "healthcheck"];

/// Translates one `EndpointSlice` into an `Application`, or `Err` if the
/// slice is malformed (missing the owning service-name label, or no
/// usable serving port). Callers log and skip on `Err` (§7's IngestError).
pub fn translate_slice(slice: &EndpointSlice) -> Result<Application> {
    let slice_name = slice.metadata.name.clone().unwrap_or_default();
    let namespace = slice
        .metadata
        .namespace
        .clone()
        .ok_or_else(|| Error::ingest(slice_name.as_str(), "EndpointSlice has no namespace"))?;
    let service_name = slice
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get("kubernetes.io/service-name"))
        .cloned()
        .ok_or_else(|| Error::ingest(slice_name.as_str(), "missing kubernetes.io/service-name label"))?;

    let ports = slice.ports.as_deref().unwrap_or(&[]);
    let serving_port = select_serving_port(&slice_name, ports)?;
    let health_check = health_check_of(ports);

    let endpoints: BTreeSet<ApplicationEndpoint> = slice
        .endpoints
        .iter()
        .map(|endpoint| {
            let addresses = endpoint.addresses.clone();
            let node = endpoint.node_name.clone().unwrap_or_default();
            let zone = endpoint.zone.clone().unwrap_or_default();
            let health_status = health_status_of(endpoint.conditions.as_ref());
            ApplicationEndpoint::new(node, zone, addresses, health_status)
        })
        .collect();

    Ok(Application::new(service_name, namespace, "/", serving_port, health_check, endpoints))
}

/// Builds a [`HealthCheckConfig`] from the first health-aliased port, if
/// any, using [`detect_protocol`]'s precedence. `path_or_grpc_service`
/// stays empty: `EndpointPort` carries no health-check path or gRPC
/// service name, so only protocol and port are derivable from a slice.
fn health_check_of(ports: &[EndpointPort]) -> Option<HealthCheckConfig> {
    let health_port = ports.iter().find(|p| is_health_port_name(p.name.as_deref()))?;
    Some(HealthCheckConfig {
        protocol: detect_protocol(health_port),
        port: health_port.port? as u32,
        path_or_grpc_service: String::new(),
    })
}

/// `{serving, terminating, ready}` → `HealthStatus` (§4.7).
fn health_status_of(conditions: Option<&k8s_openapi::api::discovery::v1::EndpointConditions>) -> HealthStatus {
    let serving = conditions.and_then(|c| c.serving).unwrap_or(true);
    let ready = conditions.and_then(|c| c.ready).unwrap_or(true);
    let terminating = conditions.and_then(|c| c.terminating).unwrap_or(false);

    if serving && ready && !terminating {
        HealthStatus::Healthy
    } else if serving && terminating {
        HealthStatus::Draining
    } else {
        HealthStatus::Unhealthy
    }
}

/// Picks the serving port per §4.7: a port named one of the health
/// aliases is the health-check port; any other named port, or the sole
/// port regardless of name, is the serving port.
fn select_serving_port(slice_name: &str, ports: &[EndpointPort]) -> Result<u32> {
    let serving_candidates: Vec<&EndpointPort> =
        ports.iter().filter(|p| !is_health_port_name(p.name.as_deref())).collect();

    let port = match serving_candidates.as_slice() {
        [single] => single,
        [] if ports.len() == 1 => &ports[0],
        [] => return Err(Error::ingest(slice_name, "no serving port found (only health-named ports present)")),
        _ => serving_candidates[0],
    };

    port.port.map(|p| p as u32).ok_or_else(|| Error::ingest(slice_name, "serving port has no port number"))
}

fn is_health_port_name(name: Option<&str>) -> bool {
    name.map(|n| HEALTH_PORT_NAMES.contains(&n)).unwrap_or(false)
}

/// Protocol detection precedence: `appProtocol` (lowercased), then
/// `protocol` (lowercased), then `tcp` (§4.7).
fn detect_protocol(port: &EndpointPort) -> String {
    port.app_protocol
        .as_deref()
        .or(port.protocol.as_deref())
        .map(|p| p.to_lowercase())
        .unwrap_or_else(|| "tcp".to_string())
}

/// Merges per-slice `Application`s that share the same `(namespace,
/// listener_name)` into one `Application` with the union of endpoints,
/// handling Services backed by more than one `EndpointSlice`.
pub fn merge_applications(applications: Vec<Application>) -> Vec<Application> {
    let mut merged: BTreeMap<(String, String), Application> = BTreeMap::new();

    for app in applications {
        let key = (app.namespace.clone(), app.listener_name.clone());
        merged
            .entry(key)
            .and_modify(|existing| existing.endpoints.extend(app.endpoints.iter().cloned()))
            .or_insert(app);
    }

    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::discovery::v1::{Endpoint, EndpointConditions};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap as StdBTreeMap;

    fn labeled_slice(name: &str, service_name: &str, ports: Vec<EndpointPort>, endpoints: Vec<Endpoint>) -> EndpointSlice {
        let mut labels = StdBTreeMap::new();
        labels.insert("kubernetes.io/service-name".to_string(), service_name.to_string());
        EndpointSlice {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns1".to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            address_type: "IPv4".to_string(),
            endpoints,
            ports: Some(ports),
        }
    }

    fn endpoint(addresses: &[&str], serving: bool, ready: bool, terminating: bool) -> Endpoint {
        Endpoint {
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
            conditions: Some(EndpointConditions { serving: Some(serving), ready: Some(ready), terminating: Some(terminating) }),
            node_name: Some("node-1".to_string()),
            zone: Some("us-central1-a".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn translates_sole_port_regardless_of_name() {
        let slice = labeled_slice(
            "greeter-leaf-abcde",
            "greeter-leaf",
            vec![EndpointPort { name: Some("grpc".to_string()), port: Some(50051), protocol: Some("TCP".to_string()), app_protocol: None }],
            vec![endpoint(&["10.0.0.1"], true, true, false)],
        );
        let app = translate_slice(&slice).unwrap();
        assert_eq!(app.port, 50051);
        assert_eq!(app.namespace, "ns1");
        assert_eq!(app.listener_name, "greeter-leaf");
        assert_eq!(app.endpoints.len(), 1);
    }

    #[test]
    fn skips_health_named_port_when_selecting_serving_port() {
        let slice = labeled_slice(
            "greeter-leaf-abcde",
            "greeter-leaf",
            vec![
                EndpointPort { name: Some("healthz".to_string()), port: Some(9000), protocol: Some("TCP".to_string()), app_protocol: None },
                EndpointPort { name: Some("grpc".to_string()), port: Some(50051), protocol: Some("TCP".to_string()), app_protocol: None },
            ],
            vec![endpoint(&["10.0.0.1"], true, true, false)],
        );
        let app = translate_slice(&slice).unwrap();
        assert_eq!(app.port, 50051);

        let health_check = app.health_check.expect("health-named port produces a health_check");
        assert_eq!(health_check.protocol, "tcp");
        assert_eq!(health_check.port, 9000);
    }

    #[test]
    fn health_status_translation_matches_condition_table() {
        assert_eq!(
            health_status_of(Some(&EndpointConditions { serving: Some(true), ready: Some(true), terminating: Some(false) })),
            HealthStatus::Healthy
        );
        assert_eq!(
            health_status_of(Some(&EndpointConditions { serving: Some(true), ready: Some(false), terminating: Some(true) })),
            HealthStatus::Draining
        );
        assert_eq!(
            health_status_of(Some(&EndpointConditions { serving: Some(false), ready: Some(false), terminating: Some(false) })),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn missing_service_name_label_is_rejected() {
        let mut slice = labeled_slice(
            "orphan-abcde",
            "orphan",
            vec![EndpointPort { name: None, port: Some(80), protocol: None, app_protocol: None }],
            vec![],
        );
        slice.metadata.labels = None;
        assert!(translate_slice(&slice).is_err());
    }

    #[test]
    fn merges_endpoints_across_slices_for_same_service() {
        let slice_a = labeled_slice(
            "greeter-leaf-aaaaa",
            "greeter-leaf",
            vec![EndpointPort { name: None, port: Some(50051), protocol: None, app_protocol: None }],
            vec![endpoint(&["10.0.0.1"], true, true, false)],
        );
        let slice_b = labeled_slice(
            "greeter-leaf-bbbbb",
            "greeter-leaf",
            vec![EndpointPort { name: None, port: Some(50051), protocol: None, app_protocol: None }],
            vec![endpoint(&["10.0.0.2"], true, true, false)],
        );
        let apps = vec![translate_slice(&slice_a).unwrap(), translate_slice(&slice_b).unwrap()];
        let merged = merge_applications(apps);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].endpoints.len(), 2);
    }
}
