use metrics_exporter_prometheus::BuildError;
use service_discovery::{BackendError, ConfigError, MetricsError, RegistryError};
use thiserror::Error;

/// Enumeration of errors that stop the sidecar.
#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("invalid configuration: {0}")]
    Config(#[from] envconfig::Error),
    #[error("invalid service configuration: {0}")]
    Service(#[from] ConfigError),
    #[error("failed to create registry client: {0}")]
    Backend(#[from] BackendError),
    #[error("failed to install metrics recorder: {0}")]
    Recorder(#[from] BuildError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("metrics endpoint failed: {0}")]
    Metrics(#[from] MetricsError),
}
