pub mod address;
pub mod backend;
pub mod consul;
pub mod discovery;
pub mod enablement;
pub mod error;
pub mod heartbeat;
pub mod metrics;

pub use backend::{HealthCheck, HealthSignal, NoopBackend, RegistryBackend, ServiceRegistration};
pub use discovery::{Discovery, PRIMARY_CHECK_TTL};
pub use enablement::enabled_from_env;
pub use error::{BackendError, ConfigError, MetricsError, Operation, RegistryError};
