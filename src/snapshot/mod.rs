//! # Snapshot Builder (C5, §4.5)
//!
//! Deterministic assembly of LDS/RDS/CDS/EDS resources from applications,
//! server-listener addresses, and feature flags. Grounded on the
//! teacher's `xds::{listener, cluster, route}` envoy-types construction
//! style (`envoy_types::pb::...` structs built field-by-field, typed
//! configs packed via `prost::Message::encode_to_vec` into
//! `google::protobuf::Any`), generalized from REST-API-shaped config
//! structs to this crate's `model::Application` domain type.

mod builder;
mod federation;
mod resources;

pub use builder::{SnapshotBuilder, SnapshotBuilderOptions};
pub use resources::SERVER_LISTENER_TEMPLATE_PREFIX;

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;

/// Versioned, immutable bundle of xDS resources (§3). Once built, a
/// `Snapshot` is never mutated — callers keep no references into its
/// internals; rebuilds are cheap because `Application` endpoints are
/// shared by value going in.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub version: String,
    pub listeners: HashMap<String, Listener>,
    pub routes: HashMap<String, RouteConfiguration>,
    pub clusters: HashMap<String, Cluster>,
    pub endpoints: HashMap<String, ClusterLoadAssignment>,
}

impl Snapshot {
    /// A string version that is a monotonically non-decreasing decimal
    /// integer across calls from the same process (§3). Nanosecond
    /// timestamps are unique in practice within one process's lifetime;
    /// ties (possible on some clock resolutions) are broken by the
    /// caller serializing snapshot installs per node hash (§5).
    pub fn next_version() -> String {
        let nanos =
            SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_nanos();
        nanos.to_string()
    }
}
