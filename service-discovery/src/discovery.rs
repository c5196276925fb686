//! Lifecycle facade over a registry backend.
//!
//! Every registry-facing operation is a successful no-op when discovery is
//! disabled, so callers can drive the full lifecycle unconditionally:
//! start metrics, register, report health repeatedly, deregister, stop metrics.
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{debug, info, warn};

use crate::address::parse_port;
use crate::backend::{HealthCheck, HealthSignal, RegistryBackend, ServiceRegistration};
use crate::error::{BackendError, ConfigError, Operation, RegistryError};
use crate::metrics::{app, MetricsTask};

/// TTL of the primary service check. Health must be reported more often than this.
pub const PRIMARY_CHECK_TTL: Duration = Duration::from_secs(5);

/// Tag carried by the metrics endpoint registration.
pub const METRICS_TAG: &str = "prom";

struct MetricsRegistration {
    id: String,
    port: u16,
}

pub struct Discovery {
    enabled: bool,
    service_name: String,
    service_id: String,
    service_port: Option<u16>,
    backend: Arc<dyn RegistryBackend>,
    recorder: Option<PrometheusHandle>,
    metrics: Option<MetricsRegistration>,
    metrics_task: Option<MetricsTask>,
}

impl Discovery {
    /// Build a facade, failing if no port can be read from `listen_address`.
    pub fn new(
        enabled: bool,
        listen_address: &str,
        backend: Arc<dyn RegistryBackend>,
        service_name: &str,
        service_id: &str,
    ) -> Result<Self, ConfigError> {
        let port = parse_port(listen_address)?;

        Ok(Self::with_port(
            enabled,
            Some(port),
            backend,
            service_name,
            service_id,
        ))
    }

    /// Build a facade even if `listen_address` carries no usable port.
    ///
    /// Without a port the primary service can't be registered: `register`,
    /// `deregister` and `send_health_check` then succeed without doing anything.
    /// The metrics registration uses its own port and is unaffected.
    pub fn new_lenient(
        enabled: bool,
        listen_address: &str,
        backend: Arc<dyn RegistryBackend>,
        service_name: &str,
        service_id: &str,
    ) -> Self {
        let port = match parse_port(listen_address) {
            Ok(port) => Some(port),
            Err(err) => {
                warn!("{}, service {} will not be registered", err, service_id);
                None
            }
        };

        Self::with_port(enabled, port, backend, service_name, service_id)
    }

    fn with_port(
        enabled: bool,
        service_port: Option<u16>,
        backend: Arc<dyn RegistryBackend>,
        service_name: &str,
        service_id: &str,
    ) -> Self {
        Self {
            enabled,
            service_name: service_name.to_owned(),
            service_id: service_id.to_owned(),
            service_port,
            backend,
            recorder: None,
            metrics: None,
            metrics_task: None,
        }
    }

    /// Render this recorder on the `/metrics` route of the metrics endpoint.
    pub fn with_metrics_recorder(mut self, recorder: PrometheusHandle) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn service_port(&self) -> Option<u16> {
        self.service_port
    }

    /// Start serving metrics on `0.0.0.0:monitor_port` and register that
    /// endpoint as its own service.
    ///
    /// The listener runs in a background task: a bind failure is not returned
    /// here but published through the task handle, see [`Self::take_metrics_task`].
    pub async fn start_metrics(
        &mut self,
        monitor_port: u16,
        metrics_service_id: &str,
    ) -> Result<(), RegistryError> {
        if !self.enabled {
            return Ok(());
        }
        if metrics_service_id == self.service_id {
            return Err(RegistryError::DuplicateServiceId(
                metrics_service_id.to_owned(),
            ));
        }

        let router = app(&self.service_name, self.recorder.clone());
        let bind = SocketAddr::from(([0, 0, 0, 0], monitor_port));
        self.metrics_task = Some(MetricsTask::spawn(router, bind));

        self.metrics = Some(MetricsRegistration {
            id: metrics_service_id.to_owned(),
            port: monitor_port,
        });

        let registration = ServiceRegistration {
            name: self.service_name.clone(),
            id: metrics_service_id.to_owned(),
            port: monitor_port,
            tags: vec![METRICS_TAG.to_owned()],
            check: None,
        };
        let result = self.backend.register(&registration).await;
        self.observe(Operation::Register, metrics_service_id, result)?;

        info!(
            "registered metrics service {} on port {}",
            metrics_service_id, monitor_port
        );
        Ok(())
    }

    /// Hand the metrics listener over to whoever supervises the process.
    pub fn take_metrics_task(&mut self) -> Option<MetricsTask> {
        self.metrics_task.take()
    }

    /// Deregister the metrics endpoint. Does nothing if metrics were never started.
    pub async fn stop_metrics(&self) -> Result<(), RegistryError> {
        if !self.enabled {
            return Ok(());
        }
        let Some(metrics) = &self.metrics else {
            debug!("metrics were not started, nothing to deregister");
            return Ok(());
        };

        let result = self.backend.deregister(&metrics.id).await;
        self.observe(Operation::Deregister, &metrics.id, result)?;

        info!(
            "deregistered metrics service {} on port {}",
            metrics.id, metrics.port
        );
        Ok(())
    }

    /// Register the primary service with a TTL check. `version`, when not
    /// empty, is appended after the caller's tags.
    pub async fn register(&self, mut tags: Vec<String>, version: &str) -> Result<(), RegistryError> {
        if !self.enabled {
            return Ok(());
        }
        let Some(port) = self.service_port else {
            debug!("no service port, not registering {}", self.service_id);
            return Ok(());
        };

        if !version.is_empty() {
            tags.push(version.to_owned());
        }

        let registration = ServiceRegistration {
            name: self.service_name.clone(),
            id: self.service_id.clone(),
            port,
            tags,
            check: Some(HealthCheck::Ttl(PRIMARY_CHECK_TTL)),
        };
        let result = self.backend.register(&registration).await;
        self.observe(Operation::Register, &self.service_id, result)?;

        info!(
            "registered service {} ({}) on port {} with tags {:?}",
            self.service_id, self.service_name, port, registration.tags
        );
        Ok(())
    }

    /// Deregister the primary service. A second call surfaces whatever the
    /// backend answers for an unknown id.
    pub async fn deregister(&self) -> Result<(), RegistryError> {
        if !self.enabled || self.service_port.is_none() {
            return Ok(());
        }

        let result = self.backend.deregister(&self.service_id).await;
        self.observe(Operation::Deregister, &self.service_id, result)?;

        info!("deregistered service {}", self.service_id);
        Ok(())
    }

    /// Feed the TTL check: passing when `observed` is `None`, failing with the
    /// error text otherwise. Must be called more often than [`PRIMARY_CHECK_TTL`].
    pub async fn send_health_check(
        &self,
        observed: Option<&dyn Error>,
    ) -> Result<(), RegistryError> {
        if !self.enabled || self.service_port.is_none() {
            return Ok(());
        }

        let signal = match observed {
            Some(err) => HealthSignal::Failing(err.to_string()),
            None => HealthSignal::Passing,
        };
        let result = self.backend.report_health(&self.service_id, &signal).await;
        self.observe(Operation::HealthCheck, &self.service_id, result)?;

        match signal {
            HealthSignal::Passing => debug!("service {} is passing", self.service_id),
            HealthSignal::Failing(ref message) => {
                warn!("service {} reported failing: {}", self.service_id, message)
            }
        }
        Ok(())
    }

    fn observe(
        &self,
        operation: Operation,
        service_id: &str,
        result: Result<(), BackendError>,
    ) -> Result<(), RegistryError> {
        let outcome = if result.is_ok() { "success" } else { "error" };
        let labels = [
            ("operation", operation.as_str().to_owned()),
            ("outcome", outcome.to_owned()),
        ];
        metrics::counter!("discovery_registry_calls_total", &labels).increment(1);

        result.map_err(|source| {
            let err = RegistryError::Backend {
                operation,
                service_id: service_id.to_owned(),
                source,
            };
            warn!("{}", err);
            err
        })
    }
}
