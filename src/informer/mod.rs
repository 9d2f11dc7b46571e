//! # Endpoint Informer Fan-in (C7, §4.7)
//!
//! Watches Kubernetes `EndpointSlice` objects across one or more
//! `(kubecontext, namespace, serviceNames)` targets and feeds the
//! translated [`crate::model::Application`] set into
//! [`crate::xds::SnapshotCache::update_resources`]. Building the
//! `kube::Client` per kubecontext is the caller's concern (spec.md §1's
//! Non-goal: "the Kubernetes API client... [is an] external
//! collaborator"); this module only consumes already-constructed
//! clients.

mod translate;
mod watch;

pub use translate::{merge_applications, translate_slice};
pub use watch::InformerTarget;

use std::sync::Arc;

use kube::Client;

use crate::xds::SnapshotCache;

/// Spawns one watch task per `(client, target)` pair and returns
/// immediately; each task runs until its watch stream ends (normally
/// only on an unrecoverable client error, logged by [`watch::run_target`]).
pub fn spawn_all(targets: Vec<(Client, InformerTarget)>, cache: Arc<SnapshotCache>) -> Vec<tokio::task::JoinHandle<()>> {
    targets
        .into_iter()
        .map(|(client, target)| {
            let cache = cache.clone();
            tokio::spawn(watch::run_target(client, target, cache))
        })
        .collect()
}
