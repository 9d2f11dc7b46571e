use std::sync::Arc;

use meridian_xds::config::ControlPlaneConfig;
use meridian_xds::{observability, xds, Result, APP_NAME, VERSION};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing(false)?;

    info!(app_name = APP_NAME, version = VERSION, "starting xDS control plane");

    // Configuration loading (YAML/env/CLI) is an external collaborator's
    // concern (spec.md §1); this core only consumes the typed shape.
    let config = ControlPlaneConfig::default();
    info!(
        xds_port = config.server.port,
        xds_bind_address = %config.server.bind_address,
        "using control-plane configuration"
    );

    let cache = xds::build_snapshot_cache(&config);

    // Kubernetes client construction and informer targets are likewise
    // external collaborators; a real deployment wires `informer::spawn_all`
    // here with one `kube::Client` per configured kubecontext.

    let shutdown_signal = async {
        signal::ctrl_c().await.expect("failed to install CTRL+C signal handler");
        info!("shutdown signal received");
    };

    if let Err(error) = xds::start_server(&config, cache, shutdown_signal).await {
        error!(%error, "xDS server failed");
        std::process::exit(1);
    }

    info!("xDS server shutdown completed");
    Ok(())
}
