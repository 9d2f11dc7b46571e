//! Per-resource-type envoy-types construction, grounded on the teacher's
//! `xds::{listener, cluster, route}` conversion style: build the proto
//! struct field-by-field, pack typed configs via
//! `prost::Message::encode_to_vec` into `google::protobuf::Any`.

use std::collections::BTreeSet;

use envoy_types::pb::envoy::config::cluster::v3::{
    cluster::{ClusterDiscoveryType, DiscoveryType, EdsClusterConfig, LbPolicy},
    Cluster,
};
use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType, config_source::ConfigSourceSpecifier,
    health_status::HealthStatus as ProtoHealthStatus, socket_address::PortSpecifier,
    transport_socket::ConfigType as TransportSocketConfigType, AggregatedConfigSource, Address,
    ConfigSource, HealthStatus, Locality, SocketAddress, TransportSocket,
};
use envoy_types::pb::envoy::config::endpoint::v3::{
    Endpoint, ClusterLoadAssignment, LbEndpoint, LocalityLbEndpoints,
};
use envoy_types::pb::envoy::config::listener::v3::{Filter, FilterChain, Listener};
use envoy_types::pb::envoy::config::rbac::v3::{
    permission::Rule as PermissionRule, principal, principal::Identifier as PrincipalIdentifier,
    Permission, Policy, Principal, Rbac as RbacConfigProto,
};
use envoy_types::pb::envoy::config::route::v3::{
    route::Action as RouteActionKind, route_action::ClusterSpecifier, route_match::PathSpecifier,
    NonForwardingAction, Route, RouteAction, RouteConfiguration, RouteMatch, VirtualHost,
};
use envoy_types::pb::envoy::extensions::filters::http::rbac::v3::{
    Rbac as HttpRbac, RbacPerRoute,
};
use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router as RouterFilter;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::{
        ForwardClientCertDetails, RouteSpecifier, SetCurrentClientCertDetails,
    },
    http_filter::ConfigType as HttpFilterConfigType,
    HttpConnectionManager, HttpFilter, Rds,
};
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    common_tls_context, CertificateValidationContext, CommonTlsContext, DownstreamTlsContext,
    UpstreamTlsContext,
};
use envoy_types::pb::envoy::r#type::matcher::v3::{string_matcher::MatchPattern, StringMatcher};
use envoy_types::pb::google::protobuf::{Any as EnvoyAny, BoolValue, UInt32Value};
use prost::Message;

use crate::errors::Result;
use crate::locality::PriorityMapper;
use crate::model::{Application, ApplicationEndpoint, EndpointAddress, HealthStatus as ModelHealthStatus};

use super::builder::SnapshotBuilderOptions;

const ROUTER_FILTER_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router";
const HCM_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
const RBAC_FILTER_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.rbac.v3.RBAC";
const RBAC_PER_ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.rbac.v3.RBACPerRoute";
const UPSTREAM_TLS_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.UpstreamTlsContext";
const DOWNSTREAM_TLS_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.DownstreamTlsContext";

/// The bootstrap Listener resource-name template (§6), shared verbatim
/// with clients' xDS bootstrap files.
pub const SERVER_LISTENER_TEMPLATE_PREFIX: &str = "grpc/server?xds.resource.listening_address=";

fn any_of<M: Message>(type_url: &str, message: &M) -> EnvoyAny {
    EnvoyAny { type_url: type_url.to_string(), value: message.encode_to_vec() }
}

fn router_http_filter() -> HttpFilter {
    HttpFilter {
        name: "envoy.filters.http.router".to_string(),
        is_optional: false,
        disabled: false,
        config_type: Some(HttpFilterConfigType::TypedConfig(any_of(
            ROUTER_FILTER_TYPE_URL,
            &RouterFilter::default(),
        ))),
    }
}

fn fault_http_filter() -> HttpFilter {
    use envoy_types::pb::envoy::extensions::filters::http::fault::v3::HttpFault;
    HttpFilter {
        name: "envoy.filters.http.fault".to_string(),
        is_optional: false,
        disabled: false,
        config_type: Some(HttpFilterConfigType::TypedConfig(any_of(
            "type.googleapis.com/envoy.extensions.filters.http.fault.v3.HTTPFault",
            &HttpFault::default(),
        ))),
    }
}

fn rbac_http_filter(namespaces: &BTreeSet<String>, trust_domain: &str) -> HttpFilter {
    let rbac = build_rbac_config(namespaces, trust_domain);
    HttpFilter {
        name: "envoy.filters.http.rbac".to_string(),
        is_optional: false,
        disabled: false,
        config_type: Some(HttpFilterConfigType::TypedConfig(any_of(
            RBAC_FILTER_TYPE_URL,
            &HttpRbac { rules: Some(rbac), ..Default::default() },
        ))),
    }
}

/// Builds an allow-list RBAC policy admitting principals matching
/// `spiffe://[^/]+/ns/(ns1|ns2|…)/sa/.+` (§4.5). With no namespaces yet
/// known (bootstrap, before any `update_resources` call) the namespace
/// segment falls back to `[^/]+`, admitting any namespace until real
/// application data narrows the set.
fn build_rbac_config(namespaces: &BTreeSet<String>, trust_domain: &str) -> RbacConfigProto {
    let ns_segment = if namespaces.is_empty() {
        "[^/]+".to_string()
    } else {
        format!("({})", namespaces.iter().cloned().collect::<Vec<_>>().join("|"))
    };
    let pattern = format!("spiffe://[^/]+/ns/{ns_segment}/sa/.+");
    let _ = trust_domain; // trust domain is validated at the per-cluster SAN, not here.

    let principal = Principal {
        identifier: Some(PrincipalIdentifier::Authenticated(principal::Authenticated {
            principal_name: Some(StringMatcher {
                ignore_case: false,
                match_pattern: Some(MatchPattern::SafeRegex(
                    envoy_types::pb::envoy::r#type::matcher::v3::RegexMatcher {
                        engine_type: None,
                        regex: pattern,
                    },
                )),
            }),
        })),
    };

    let policy = Policy {
        permissions: vec![Permission { rule: Some(PermissionRule::Any(true)) }],
        principals: vec![principal],
        condition: None,
        checked_condition: None,
    };

    let mut policies = std::collections::HashMap::new();
    policies.insert("spiffe-allow".to_string(), policy);

    RbacConfigProto { action: 0 /* ALLOW */, policies, audit_logging_options: None, track_per_rule_stats: false }
}

/// The "fault, router" API-listener HTTP filter chain (§4.5).
fn http_connection_manager(route_specifier: RouteSpecifier, filters: Vec<HttpFilter>) -> HttpConnectionManager {
    HttpConnectionManager {
        route_specifier: Some(route_specifier),
        codec_type: envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::http_connection_manager::CodecType::Auto as i32,
        stat_prefix: "ingress_http".to_string(),
        http_filters: filters,
        ..Default::default()
    }
}

fn rds_route_specifier(route_config_name: &str) -> RouteSpecifier {
    RouteSpecifier::Rds(Rds {
        route_config_name: route_config_name.to_string(),
        config_source: Some(ConfigSource {
            config_source_specifier: Some(ConfigSourceSpecifier::Ads(AggregatedConfigSource::default())),
            ..Default::default()
        }),
    })
}

/// API Listener: an HCM `apiListener` with no socket address, used by
/// proxyless gRPC clients (§4.5, GLOSSARY).
pub fn build_api_listener(app: &Application) -> Result<Listener> {
    let hcm = http_connection_manager(
        rds_route_specifier(&app.route_config_name),
        vec![fault_http_filter(), router_http_filter()],
    );

    let api_listener = envoy_types::pb::envoy::config::listener::v3::ApiListener {
        api_listener: Some(any_of(HCM_TYPE_URL, &hcm)),
    };

    Ok(Listener {
        name: app.listener_name.clone(),
        api_listener: Some(api_listener),
        ..Default::default()
    })
}

/// One VirtualHost, one Route: domain `*`, prefix match on `pathPrefix`
/// or `/`, action `cluster = app.clusterName` (§4.5).
pub fn build_route_configuration(app: &Application) -> Result<RouteConfiguration> {
    let prefix = if app.path_prefix.is_empty() { "/".to_string() } else { app.path_prefix.clone() };

    let route = Route {
        name: app.cluster_name.clone(),
        r#match: Some(RouteMatch { path_specifier: Some(PathSpecifier::Prefix(prefix)), ..Default::default() }),
        action: Some(RouteActionKind::Route(RouteAction {
            cluster_specifier: Some(ClusterSpecifier::Cluster(app.cluster_name.clone())),
            ..Default::default()
        })),
        ..Default::default()
    };

    let virtual_host = VirtualHost {
        name: app.route_config_name.clone(),
        domains: vec!["*".to_string()],
        routes: vec![route],
        ..Default::default()
    };

    Ok(RouteConfiguration {
        name: app.route_config_name.clone(),
        virtual_hosts: vec![virtual_host],
        ..Default::default()
    })
}

/// EDS cluster over ADS, round-robin, 3s connect timeout, optional
/// UpstreamTlsContext with a SPIFFE SAN regex (§4.5).
pub fn build_cluster(app: &Application, options: &SnapshotBuilderOptions) -> Result<Cluster> {
    let eds_cluster_config = EdsClusterConfig {
        eds_config: Some(ConfigSource {
            config_source_specifier: Some(ConfigSourceSpecifier::Ads(AggregatedConfigSource::default())),
            ..Default::default()
        }),
        service_name: app.eds_service_name.clone(),
    };

    let transport_socket = if options.enable_data_plane_tls {
        Some(build_upstream_tls(app, options)?)
    } else {
        None
    };

    Ok(Cluster {
        name: app.cluster_name.clone(),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32)),
        eds_cluster_config: Some(eds_cluster_config),
        lb_policy: LbPolicy::RoundRobin as i32,
        connect_timeout: Some(envoy_types::pb::google::protobuf::Duration { seconds: 3, nanos: 0 }),
        transport_socket,
        ..Default::default()
    })
}

fn build_upstream_tls(app: &Application, options: &SnapshotBuilderOptions) -> Result<TransportSocket> {
    let spiffe_id = format!("spiffe://{}/ns/{}/sa/{}", options.trust_domain, app.namespace, app.service_account);

    let validation_context = CertificateValidationContext {
        match_typed_subject_alt_names: vec![
            envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::SubjectAltNameMatcher {
                san_type: envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::subject_alt_name_matcher::SanType::Uri as i32,
                matcher: Some(StringMatcher {
                    ignore_case: false,
                    match_pattern: Some(MatchPattern::Exact(spiffe_id)),
                }),
            },
        ],
        ..Default::default()
    };

    let common = CommonTlsContext {
        validation_context_type: Some(common_tls_context::ValidationContextType::ValidationContext(
            validation_context,
        )),
        ..Default::default()
    };

    let upstream = UpstreamTlsContext { common_tls_context: Some(common), ..Default::default() };

    Ok(TransportSocket {
        name: "envoy.transport_sockets.tls".to_string(),
        config_type: Some(TransportSocketConfigType::TypedConfig(any_of(UPSTREAM_TLS_TYPE_URL, &upstream))),
    })
}

fn health_status_of(status: ModelHealthStatus) -> i32 {
    match status {
        ModelHealthStatus::Healthy => ProtoHealthStatus::Healthy as i32,
        ModelHealthStatus::Unhealthy => ProtoHealthStatus::Unhealthy as i32,
        ModelHealthStatus::Draining => ProtoHealthStatus::Draining as i32,
    }
}

/// Groups endpoints by zone, assigns locality priorities via `mapper`,
/// and emits one `LbEndpoint` per address (§4.5's CLA construction
/// rules). Endpoints passed in are already the set-union across every
/// source that fed this cluster name within the current `build()` call.
pub fn build_cluster_load_assignment(
    cluster_name: &str,
    port: u32,
    endpoints: &BTreeSet<ApplicationEndpoint>,
    node_hash: &str,
    mapper: &dyn PriorityMapper,
) -> ClusterLoadAssignment {
    let zones: BTreeSet<String> = endpoints.iter().map(|e| e.zone.clone()).collect();
    let priorities = mapper.build_priority_map(node_hash, &zones);

    let mut by_zone: std::collections::BTreeMap<String, Vec<&ApplicationEndpoint>> = Default::default();
    for endpoint in endpoints {
        by_zone.entry(endpoint.zone.clone()).or_default().push(endpoint);
    }

    let locality_endpoints = by_zone
        .into_iter()
        .map(|(zone, endpoints)| {
            let lb_endpoints = endpoints
                .iter()
                .flat_map(|endpoint| {
                    endpoint.addresses.iter().map(move |address| build_lb_endpoint(address, port, endpoint.health_status))
                })
                .collect();

            LocalityLbEndpoints {
                locality: Some(Locality { zone: zone.clone(), ..Default::default() }),
                lb_endpoints,
                load_balancing_weight: Some(UInt32Value { value: 100_000 }),
                priority: priorities.get(&zone).copied().unwrap_or(0),
                ..Default::default()
            }
        })
        .collect();

    ClusterLoadAssignment { cluster_name: cluster_name.to_string(), endpoints: locality_endpoints, ..Default::default() }
}

fn build_lb_endpoint(address: &str, port: u32, health_status: ModelHealthStatus) -> LbEndpoint {
    let socket_address =
        SocketAddress { address: address.to_string(), port_specifier: Some(PortSpecifier::PortValue(port)), ..Default::default() };
    let endpoint = Endpoint {
        address: Some(Address { address: Some(AddressType::SocketAddress(socket_address)) }),
        ..Default::default()
    };

    LbEndpoint {
        host_identifier: Some(envoy_types::pb::envoy::config::endpoint::v3::lb_endpoint::HostIdentifier::Endpoint(endpoint)),
        health_status: health_status_of(health_status),
        load_balancing_weight: Some(UInt32Value { value: 1 }),
        ..Default::default()
    }
}

/// `grpc/server?xds.resource.listening_address=<host>:<port>` with the
/// host bracketed for IPv6 in the resource *name* (but unbracketed in
/// the SocketAddress itself) (§3, §6, S2).
pub fn server_listener_resource_name(address: &EndpointAddress) -> String {
    let host = if address.host.contains(':') { format!("[{}]", address.host) } else { address.host.clone() };
    format!("{SERVER_LISTENER_TEMPLATE_PREFIX}{host}:{port}", port = address.port)
}

/// Server Listener: socket listener, one filter chain, HCM with `router`
/// (and `rbac` prepended under mTLS), optional DownstreamTlsContext
/// (§4.5).
pub fn build_server_listener(
    address: &EndpointAddress,
    namespaces: &BTreeSet<String>,
    options: &SnapshotBuilderOptions,
) -> Result<Listener> {
    let name = server_listener_resource_name(address);

    let mut filters = Vec::new();
    if options.enable_rbac {
        filters.push(rbac_http_filter(namespaces, &options.trust_domain));
    }
    filters.push(router_http_filter());

    let route_specifier = if options.server_listener_uses_rds {
        rds_route_specifier("default_inbound_config")
    } else {
        RouteSpecifier::RouteConfig(build_default_inbound_route_config(namespaces, &options.trust_domain)?)
    };

    let mut hcm = http_connection_manager(route_specifier, filters);
    hcm.forward_client_cert_details = ForwardClientCertDetails::AppendForward as i32;
    hcm.set_current_client_cert_details = Some(SetCurrentClientCertDetails {
        subject: Some(BoolValue { value: true }),
        dns: true,
        uri: true,
        ..Default::default()
    });

    let filter = Filter {
        name: "envoy.filters.network.http_connection_manager".to_string(),
        config_type: Some(envoy_types::pb::envoy::config::listener::v3::filter::ConfigType::TypedConfig(any_of(
            HCM_TYPE_URL,
            &hcm,
        ))),
    };

    let transport_socket = if options.enable_data_plane_tls {
        Some(build_downstream_tls(options)?)
    } else {
        None
    };

    let socket_address = SocketAddress {
        address: address.host.clone(),
        port_specifier: Some(PortSpecifier::PortValue(address.port)),
        ..Default::default()
    };

    Ok(Listener {
        name,
        address: Some(Address { address: Some(AddressType::SocketAddress(socket_address)) }),
        filter_chains: vec![FilterChain { filters: vec![filter], transport_socket, ..Default::default() }],
        ..Default::default()
    })
}

fn build_downstream_tls(options: &SnapshotBuilderOptions) -> Result<TransportSocket> {
    let validation_context_type = if options.require_data_plane_client_certs {
        Some(common_tls_context::ValidationContextType::ValidationContext(CertificateValidationContext::default()))
    } else {
        None
    };

    let common = CommonTlsContext { validation_context_type, ..Default::default() };

    let mut downstream = DownstreamTlsContext { common_tls_context: Some(common), ..Default::default() };
    if options.require_data_plane_client_certs {
        downstream.require_client_certificate = Some(BoolValue { value: true });
    }

    Ok(TransportSocket {
        name: "envoy.transport_sockets.tls".to_string(),
        config_type: Some(TransportSocketConfigType::TypedConfig(any_of(DOWNSTREAM_TLS_TYPE_URL, &downstream))),
    })
}

/// The single `default_inbound_config` RouteConfiguration emitted once
/// any server listeners exist: a `nonForwardingAction` route with a
/// per-route RBAC config admitting the configured namespaces (§4.5). An
/// empty namespace set (bootstrap, before any application data has
/// arrived) still produces a config, admitting any namespace via
/// [`build_rbac_config`]'s wildcard fallback — S1/S2's bootstrap
/// snapshot must install with zero prior `update_resources` calls.
pub fn build_default_inbound_route_config(
    namespaces: &BTreeSet<String>,
    trust_domain: &str,
) -> Result<RouteConfiguration> {
    let rbac_per_route = RbacPerRoute { rbac: Some(build_rbac_config(namespaces, trust_domain)) };

    let mut typed_per_filter_config = std::collections::HashMap::new();
    typed_per_filter_config
        .insert("envoy.filters.http.rbac".to_string(), any_of(RBAC_PER_ROUTE_TYPE_URL, &rbac_per_route));

    let route = Route {
        name: "default_inbound_config".to_string(),
        r#match: Some(RouteMatch { path_specifier: Some(PathSpecifier::Prefix(String::new())), ..Default::default() }),
        action: Some(RouteActionKind::NonForwardingAction(NonForwardingAction::default())),
        typed_per_filter_config,
        ..Default::default()
    };

    let virtual_host = VirtualHost {
        name: "default_inbound_config".to_string(),
        domains: vec!["*".to_string()],
        routes: vec![route],
        ..Default::default()
    };

    Ok(RouteConfiguration {
        name: "default_inbound_config".to_string(),
        virtual_hosts: vec![virtual_host],
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_listener_name_brackets_ipv6_host() {
        let address = EndpointAddress::new("::", 50051);
        assert_eq!(
            server_listener_resource_name(&address),
            "grpc/server?xds.resource.listening_address=[::]:50051"
        );
    }

    #[test]
    fn server_listener_name_leaves_ipv4_unbracketed() {
        let address = EndpointAddress::new("0.0.0.0", 50051);
        assert_eq!(
            server_listener_resource_name(&address),
            "grpc/server?xds.resource.listening_address=0.0.0.0:50051"
        );
    }
}
