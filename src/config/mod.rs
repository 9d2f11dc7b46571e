//! # Configuration types
//!
//! Typed shapes for every configuration option this core consumes.
//! Loading (YAML/env/CLI) is an external collaborator's concern — this
//! module only defines what a loader deserializes into, mirroring the
//! teacher's separation of config *shape* from config *loading*.

use std::time::Duration;

use serde::Deserialize;

/// NodeHash strategy selection (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHashMode {
    /// All nodes collapse onto a single snapshot keyed `"default"`.
    Fixed,
    /// Nodes are keyed by the zone/locality they report.
    ByZone,
}

impl Default for NodeHashMode {
    fn default() -> Self {
        Self::Fixed
    }
}

/// Locality priority mapper strategy selection (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityMapperMode {
    /// Every endpoint gets priority 0 (no locality-aware prioritization).
    Fixed,
    /// Priorities assigned by locality-match bucket relative to the
    /// requesting node's reported zone/region.
    ByZone,
}

impl Default for PriorityMapperMode {
    fn default() -> Self {
        Self::Fixed
    }
}

/// Top-level configuration for the control-plane core (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub server: ServerConfig,
    pub tls: TlsConfig,
    pub features: FeatureConfig,
    pub node_hash: NodeHashMode,
    pub priority_mapper: PriorityMapperMode,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            tls: TlsConfig::default(),
            features: FeatureConfig::default(),
            node_hash: NodeHashMode::default(),
            priority_mapper: PriorityMapperMode::default(),
        }
    }
}

/// ADS gRPC server bind address and keepalive settings (§5, SPEC_FULL §C.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    #[serde(with = "duration_secs")]
    pub tcp_keepalive: Duration,
    #[serde(with = "duration_secs")]
    pub http2_keepalive_interval: Duration,
    #[serde(with = "duration_secs")]
    pub http2_keepalive_timeout: Duration,
    pub concurrency_limit_per_connection: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 18000,
            tcp_keepalive: Duration::from_secs(30),
            http2_keepalive_interval: Duration::from_secs(30),
            http2_keepalive_timeout: Duration::from_secs(5),
            concurrency_limit_per_connection: 1_000_000,
        }
    }
}

/// `enableControlPlaneTLS` / `requireControlPlaneClientCerts` and the
/// data-plane equivalents (§6). Disk I/O (or a secret store fetch) to
/// produce these bytes is an external collaborator's concern (spec.md
/// §1) — this core only consumes already-loaded PEM material.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enable_control_plane_tls: bool,
    pub require_control_plane_client_certs: bool,
    pub control_plane_cert_pem: Option<Vec<u8>>,
    pub control_plane_key_pem: Option<Vec<u8>>,
    pub control_plane_client_ca_pem: Option<Vec<u8>>,
    pub enable_data_plane_tls: bool,
    pub require_data_plane_client_certs: bool,
}

/// Feature flags from §6's configuration table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub enable_rbac: bool,
    pub enable_federation: bool,
    pub authority: String,
    pub server_listener_uses_rds: bool,
    pub allow_partial_requests: bool,
    /// Inert hook for a future Envoy-shaped listener template (SPEC_FULL §E).
    /// No code path in this core reads it yet.
    pub emit_envoy_listener: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            enable_rbac: false,
            enable_federation: false,
            authority: "xds.cluster.local".to_string(),
            server_listener_uses_rds: true,
            allow_partial_requests: true,
            emit_envoy_listener: false,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = ControlPlaneConfig::default();
        assert_eq!(config.server.port, 18000);
        assert_eq!(config.server.tcp_keepalive, Duration::from_secs(30));
        assert!(config.features.allow_partial_requests);
        assert!(!config.features.enable_rbac);
        assert_eq!(config.node_hash, NodeHashMode::Fixed);
    }

    #[test]
    fn deserializes_partial_yaml_over_defaults() {
        let yaml = "features:\n  enable_rbac: true\n";
        let config: ControlPlaneConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.features.enable_rbac);
        assert_eq!(config.server.port, 18000);
    }
}
