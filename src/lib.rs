//! # meridian-xds
//!
//! An xDS control-plane core for proxyless gRPC services and Envoy
//! proxies on Kubernetes. Watches Kubernetes `EndpointSlice` objects
//! across one or more clusters, translates them into a small
//! [`model::Application`] domain model, and serves LDS/RDS/CDS/EDS over
//! ADS to whatever xDS clients connect.
//!
//! ## Architecture
//!
//! ```text
//! EndpointSlice watch (informer) → Application domain model → Snapshot builder
//!                                                                    ↓
//!                          xDS ADS server  ←  per-node-hash Snapshot cache
//! ```
//!
//! ## Core components
//!
//! - [`model`]: the `Application`/`ApplicationEndpoint` domain model.
//! - [`cache`]: `ApplicationCache` (ingest-side) and `ServerListenerCache`
//!   (bootstrap-protocol side).
//! - [`locality`]: the `NodeHasher` and `PriorityMapper` plug-points.
//! - [`snapshot`]: deterministic LDS/RDS/CDS/EDS resource assembly.
//! - [`xds`]: the ADS gRPC server and the per-node-hash snapshot cache.
//! - [`informer`]: Kubernetes `EndpointSlice` watch fan-in.

pub mod cache;
pub mod config;
pub mod errors;
pub mod informer;
pub mod locality;
pub mod model;
pub mod observability;
pub mod snapshot;
pub mod utils;
pub mod xds;

pub use config::ControlPlaneConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
