use std::future::Future;
use std::sync::Arc;

use tracing::{error, warn};

use service_discovery::metrics::MetricsTask;
use service_discovery::{heartbeat, Discovery, MetricsError, RegistryBackend};

use crate::config::Config;
use crate::error::SidecarError;

pub mod config;
pub mod error;
pub mod probe;

/// Build the facade for `config`, strict or lenient about the listen address
/// as `REQUIRE_SERVICE_PORT` asks.
pub fn discovery(
    config: &Config,
    enabled: bool,
    backend: Arc<dyn RegistryBackend>,
) -> Result<Discovery, SidecarError> {
    if config.require_service_port {
        Ok(Discovery::new(
            enabled,
            &config.listen_address,
            backend,
            &config.service_name,
            config.service_id(),
        )?)
    } else {
        Ok(Discovery::new_lenient(
            enabled,
            &config.listen_address,
            backend,
            &config.service_name,
            config.service_id(),
        ))
    }
}

/// Resolve only if the metrics listener dies, which is fatal to the sidecar.
async fn supervise(task: Option<&mut MetricsTask>) -> MetricsError {
    let Some(task) = task else {
        return std::future::pending().await;
    };

    match task.finished().await {
        Ok(()) => MetricsError::Shutdown,
        Err(err) => err,
    }
}

fn stop_listener(task: Option<&mut MetricsTask>) {
    if let Some(task) = task {
        task.shutdown();
    }
}

/// Run the whole registration lifecycle: start metrics, register, report
/// health until `shutdown` resolves or the metrics listener dies, then
/// deregister and stop metrics.
///
/// Whatever was set up before a failure is torn down before the error is
/// returned, so a rejected registration does not leave the metrics endpoint
/// registered or listening.
pub async fn run<F>(config: &Config, mut discovery: Discovery, shutdown: F) -> Result<(), SidecarError>
where
    F: Future<Output = ()>,
{
    let interval = heartbeat::check_interval(config.health_check_interval.0)?;

    let started = discovery
        .start_metrics(config.monitor_port, &config.metrics_service_id())
        .await;
    let mut metrics_task = discovery.take_metrics_task();
    if let Err(err) = started {
        stop_listener(metrics_task.as_mut());
        return Err(err.into());
    }

    if let Err(err) = discovery
        .register(config.tags(), &config.service_version)
        .await
    {
        if let Err(cleanup) = discovery.stop_metrics().await {
            warn!("failed to clean up after registration failure: {}", cleanup);
        }
        stop_listener(metrics_task.as_mut());
        return Err(err.into());
    }

    let target = probe::target(&config.listen_address);
    let target = target.as_str();

    let outcome: Result<(), SidecarError> = tokio::select! {
        result = heartbeat::run(&discovery, interval, move || probe::tcp(target, interval), shutdown) => {
            result.map_err(SidecarError::from)
        }
        err = supervise(metrics_task.as_mut()) => {
            error!("{}, shutting down", err);
            Err(err.into())
        }
    };

    let deregistered = discovery.deregister().await;
    let metrics_stopped = discovery.stop_metrics().await;
    stop_listener(metrics_task.as_mut());

    outcome?;
    deregistered?;
    metrics_stopped?;

    Ok(())
}
