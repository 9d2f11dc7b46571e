//! End-to-end scenario tests exercising `SnapshotCache` as the ADS
//! server would: through `create_watch`/`update_resources`/`fetch`,
//! never reaching into the snapshot builder directly. Mirrors spec.md
//! §8's scenario table (S1 bootstrap, S2 IPv6 bootstrap, S3 endpoint
//! update, S4 locality priority, S5 no-op update, S6 federation).

use std::sync::Arc;

use envoy_types::pb::envoy::config::core::v3::{Locality, Node};
use envoy_types::pb::envoy::service::discovery::v3::DiscoveryRequest;
use meridian_xds::locality::{ByZoneNodeHasher, ByZonePriorityMapper, FixedNodeHasher, FixedPriorityMapper};
use meridian_xds::model::{Application, ApplicationEndpoint, HealthStatus};
use meridian_xds::snapshot::SnapshotBuilderOptions;
use meridian_xds::xds::{SnapshotCache, LISTENER_TYPE_URL};

fn greeter_app(endpoints: Vec<ApplicationEndpoint>) -> Application {
    Application::new("greeter-leaf", "ns1", "/", 50051, None, endpoints)
}

fn listener_request(node: Node, resource_names: Vec<String>) -> DiscoveryRequest {
    DiscoveryRequest { node: Some(node), resource_names, type_url: LISTENER_TYPE_URL.to_string(), ..Default::default() }
}

/// S1: the first LDS request from an xDS-enabled gRPC server, carrying
/// its own bootstrap resource name, installs a snapshot containing a
/// Server Listener for that address plus `default_inbound_config`.
#[test]
fn s1_bootstrap_installs_server_listener_and_default_inbound_config() {
    let cache = SnapshotCache::new(Arc::new(FixedNodeHasher), Arc::new(FixedPriorityMapper), SnapshotBuilderOptions::default());

    cache.update_resources("ctx1", "ns1", vec![greeter_app(vec![ApplicationEndpoint::new(
        "node-1",
        "us-central1-a",
        vec!["10.0.0.1".to_string()],
        HealthStatus::Healthy,
    )])]).expect("update succeeds");

    let request = listener_request(Node::default(), vec!["grpc/server?xds.resource.listening_address=0.0.0.0:50051".to_string()]);
    let node_hash = cache.create_watch(&request);

    let snapshot = cache.current_snapshot(&node_hash).expect("snapshot installed");
    assert!(snapshot.listeners.contains_key("grpc/server?xds.resource.listening_address=0.0.0.0:50051"));
    assert!(snapshot.routes.contains_key("default_inbound_config"));
    assert!(snapshot.listeners.contains_key("greeter-leaf"), "application listener still present");
}

/// S2: a bracketed IPv6 bootstrap address round-trips through
/// `create_watch` into a correctly-named Server Listener resource.
#[test]
fn s2_ipv6_bootstrap_address_round_trips() {
    let cache = SnapshotCache::new(Arc::new(FixedNodeHasher), Arc::new(FixedPriorityMapper), SnapshotBuilderOptions::default());
    let request = listener_request(Node::default(), vec!["grpc/server?xds.resource.listening_address=[::1]:50051".to_string()]);
    let node_hash = cache.create_watch(&request);

    let snapshot = cache.current_snapshot(&node_hash).expect("snapshot installed");
    assert!(snapshot.listeners.contains_key("grpc/server?xds.resource.listening_address=[::1]:50051"));
}

/// S3: an endpoint update for an application already being watched
/// rebuilds every node hash that has a snapshot, bumping its version and
/// publishing to subscribers.
#[test]
fn s3_endpoint_update_bumps_version_and_notifies_subscribers() {
    let cache = SnapshotCache::new(Arc::new(FixedNodeHasher), Arc::new(FixedPriorityMapper), SnapshotBuilderOptions::default());

    let request = listener_request(Node::default(), vec!["grpc/server?xds.resource.listening_address=0.0.0.0:50051".to_string()]);
    let node_hash = cache.create_watch(&request);
    let mut updates = cache.subscribe(&node_hash);
    let first_version = cache.current_snapshot(&node_hash).unwrap().version.clone();

    cache
        .update_resources("ctx1", "ns1", vec![greeter_app(vec![ApplicationEndpoint::new(
            "node-1",
            "us-central1-a",
            vec!["10.0.0.1".to_string()],
            HealthStatus::Healthy,
        )])])
        .expect("update succeeds");

    let second_version = cache.current_snapshot(&node_hash).unwrap().version.clone();
    assert_ne!(first_version, second_version);

    let published = updates.try_recv().expect("an update was published");
    assert_eq!(published.version, second_version);
}

/// S4: with a `ByZone` node hash and priority mapper, endpoints in the
/// requesting node's own zone are assigned the lowest (most-preferred)
/// priority, and priorities across the full endpoint set stay gap-free.
#[test]
fn s4_locality_priority_prefers_same_zone() {
    let cache = SnapshotCache::new(Arc::new(ByZoneNodeHasher), Arc::new(ByZonePriorityMapper), SnapshotBuilderOptions::default());

    cache
        .update_resources(
            "ctx1",
            "ns1",
            vec![greeter_app(vec![
                ApplicationEndpoint::new("node-1", "us-central1-a", vec!["10.0.0.1".to_string()], HealthStatus::Healthy),
                ApplicationEndpoint::new("node-2", "us-east1-b", vec!["10.0.0.2".to_string()], HealthStatus::Healthy),
            ])],
        )
        .expect("update succeeds");

    let node = Node {
        locality: Some(Locality { region: String::new(), zone: "us-central1-a".to_string(), sub_zone: String::new() }),
        ..Default::default()
    };
    let request = listener_request(node, vec!["grpc/server?xds.resource.listening_address=0.0.0.0:50051".to_string()]);
    let node_hash = cache.create_watch(&request);
    assert_eq!(node_hash, "us-central1-a");

    let snapshot = cache.current_snapshot(&node_hash).expect("snapshot installed");
    let cla = snapshot.endpoints.get("greeter-leaf").expect("cla present");

    let own_zone_priority = cla
        .endpoints
        .iter()
        .find(|locality| locality.locality.as_ref().map(|l| l.zone == "us-central1-a").unwrap_or(false))
        .map(|locality| locality.priority)
        .expect("own-zone locality present");
    assert_eq!(own_zone_priority, 0);

    let mut priorities: Vec<u32> = cla.endpoints.iter().map(|locality| locality.priority).collect();
    priorities.sort_unstable();
    priorities.dedup();
    assert_eq!(priorities, (0..priorities.len() as u32).collect::<Vec<_>>());
}

/// S5: calling `update_resources` twice with structurally identical
/// applications is a no-op — no version bump, no rebuild.
#[test]
fn s5_identical_update_resources_call_is_a_noop() {
    let cache = SnapshotCache::new(Arc::new(FixedNodeHasher), Arc::new(FixedPriorityMapper), SnapshotBuilderOptions::default());
    let app = greeter_app(vec![ApplicationEndpoint::new(
        "node-1",
        "us-central1-a",
        vec!["10.0.0.1".to_string()],
        HealthStatus::Healthy,
    )]);

    let request = listener_request(Node::default(), vec!["grpc/server?xds.resource.listening_address=0.0.0.0:50051".to_string()]);
    let node_hash = cache.create_watch(&request);
    cache.update_resources("ctx1", "ns1", vec![app.clone()]).expect("first update succeeds");
    let version_after_first = cache.current_snapshot(&node_hash).unwrap().version.clone();

    cache.update_resources("ctx1", "ns1", vec![app]).expect("second update succeeds");
    let version_after_second = cache.current_snapshot(&node_hash).unwrap().version.clone();

    assert_eq!(version_after_first, version_after_second);
}

/// S6: with federation enabled, every resource is additionally emitted
/// under its `xdstp://` federated name alongside the plain name.
#[test]
fn s6_federation_emits_both_plain_and_federated_resource_names() {
    let options = SnapshotBuilderOptions { enable_federation: true, authority: "xds.example.com".to_string(), ..SnapshotBuilderOptions::default() };
    let cache = SnapshotCache::new(Arc::new(FixedNodeHasher), Arc::new(FixedPriorityMapper), options);

    cache
        .update_resources("ctx1", "ns1", vec![greeter_app(vec![ApplicationEndpoint::new(
            "node-1",
            "us-central1-a",
            vec!["10.0.0.1".to_string()],
            HealthStatus::Healthy,
        )])])
        .expect("update succeeds");

    let request = listener_request(Node::default(), vec!["grpc/server?xds.resource.listening_address=0.0.0.0:50051".to_string()]);
    let node_hash = cache.create_watch(&request);
    let snapshot = cache.current_snapshot(&node_hash).expect("snapshot installed");

    assert!(snapshot.listeners.contains_key("greeter-leaf"));
    assert!(snapshot.listeners.contains_key("xdstp://xds.example.com/envoy.config.listener.v3.Listener/greeter-leaf"));
    assert!(snapshot.clusters.contains_key("xdstp://xds.example.com/envoy.config.cluster.v3.Cluster/greeter-leaf"));

    let response = cache.fetch(&request).unwrap();
    assert_eq!(response.resources.len(), snapshot.listeners.len());
}
