//! Register a service in the discovery registry, keep its TTL check alive and
//! deregister it on shutdown.
use envconfig::Envconfig;
use tokio::signal;
use tracing::info;

use discovery_sidecar::config::Config;
use discovery_sidecar::error::SidecarError;
use service_discovery::metrics::setup_metrics_recorder;
use service_discovery::{consul, enabled_from_env};

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> Result<(), SidecarError> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env()?;

    let enabled = enabled_from_env();
    if !enabled {
        info!("no consul environment found, discovery disabled");
    }
    let backend = consul::backend(enabled, &config.consul)?;
    let recorder = setup_metrics_recorder()?;

    let discovery =
        discovery_sidecar::discovery(&config, enabled, backend)?.with_metrics_recorder(recorder);

    discovery_sidecar::run(&config, discovery, shutdown()).await
}
