//! # Locality Priority Mapper (C4, §4.4) and NodeHash plug-point (§3, §9)
//!
//! Both plug-points are expressed as small capability traits with two
//! swappable implementations each, matching the teacher's pattern of a
//! trait-plus-registry for pluggable backends (e.g.
//! `secrets::backends::SecretBackend`).

use std::collections::{BTreeSet, HashMap};

use envoy_types::pb::envoy::config::core::v3::Node as EnvoyNode;
use once_cell::sync::Lazy;
use regex::Regex;

/// `hash(node) -> String` (§3, §9). Implementations must be pure and
/// deterministic for the same `Node` contents.
pub trait NodeHasher: Send + Sync {
    fn hash(&self, node: &EnvoyNode) -> String;
}

/// All data-plane clients share one snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedNodeHasher;

impl NodeHasher for FixedNodeHasher {
    fn hash(&self, _node: &EnvoyNode) -> String {
        "default".to_string()
    }
}

/// Keys snapshots on the client's reported zone, enabling locality-aware
/// priority assignment via [`ByZonePriorityMapper`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ByZoneNodeHasher;

impl NodeHasher for ByZoneNodeHasher {
    fn hash(&self, node: &EnvoyNode) -> String {
        node.locality.as_ref().map(|locality| locality.zone.clone()).unwrap_or_default()
    }
}

/// `buildPriorityMap(nodeHash, zones) -> map<zone, priority>` (§4.4).
/// Pure and deterministic.
pub trait PriorityMapper: Send + Sync {
    fn build_priority_map(&self, node_hash: &str, zones: &BTreeSet<String>) -> HashMap<String, u32>;
}

/// All localities equal; consumers interpret an absent key as priority 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedPriorityMapper;

impl PriorityMapper for FixedPriorityMapper {
    fn build_priority_map(&self, _node_hash: &str, _zones: &BTreeSet<String>) -> HashMap<String, u32> {
        HashMap::new()
    }
}

static REGION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]+-[a-z]+-?[0-9]+").unwrap());
static SUPER_REGION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]+-[a-z]+").unwrap());
static MULTI_REGION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]+").unwrap());

/// Assigns priorities 0..K with no gaps, grouping zones by locality-match
/// bucket relative to the requesting node's zone: (0) exact zone, (1)
/// same region, (2) same super-region, (3) same multi-region, (4) other.
/// Empty buckets are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByZonePriorityMapper;

impl ByZonePriorityMapper {
    fn bucket(node_zone: &str, zone: &str) -> u32 {
        if zone == node_zone {
            return 0;
        }
        if prefix_match(&REGION_RE, node_zone, zone) {
            return 1;
        }
        if prefix_match(&SUPER_REGION_RE, node_zone, zone) {
            return 2;
        }
        if prefix_match(&MULTI_REGION_RE, node_zone, zone) {
            return 3;
        }
        4
    }
}

fn prefix_match(re: &Regex, a: &str, b: &str) -> bool {
    match (re.find(a), re.find(b)) {
        (Some(a_match), Some(b_match)) => a_match.as_str() == b_match.as_str(),
        _ => false,
    }
}

impl PriorityMapper for ByZonePriorityMapper {
    fn build_priority_map(&self, node_hash: &str, zones: &BTreeSet<String>) -> HashMap<String, u32> {
        let mut buckets: [Vec<&String>; 5] = Default::default();
        for zone in zones {
            let bucket = Self::bucket(node_hash, zone) as usize;
            buckets[bucket].push(zone);
        }

        let mut result = HashMap::new();
        let mut priority = 0u32;
        for bucket in buckets {
            if bucket.is_empty() {
                continue;
            }
            for zone in bucket {
                result.insert(zone.clone(), priority);
            }
            priority += 1;
        }
        result
    }
}
