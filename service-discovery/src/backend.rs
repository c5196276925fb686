use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackendError;

/// How the registry decides whether a registered service is alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthCheck {
    /// The service must report within the window or it is marked critical.
    Ttl(Duration),
    /// The registry polls the url itself.
    Http { url: String, interval: Duration },
}

/// A service record as handed to the registry. Built per call, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistration {
    pub name: String,
    pub id: String,
    pub port: u16,
    /// Order matters: caller tags first, the version tag last.
    pub tags: Vec<String>,
    pub check: Option<HealthCheck>,
}

/// Outcome reported for a TTL check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthSignal {
    Passing,
    Failing(String),
}

impl HealthSignal {
    /// Diagnostic text attached to the signal, empty when passing.
    pub fn message(&self) -> &str {
        match self {
            HealthSignal::Passing => "",
            HealthSignal::Failing(message) => message,
        }
    }

    pub fn is_passing(&self) -> bool {
        matches!(self, HealthSignal::Passing)
    }
}

impl fmt::Display for HealthSignal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HealthSignal::Passing => write!(f, "passing"),
            HealthSignal::Failing(message) => write!(f, "failing: {}", message),
        }
    }
}

/// The three operations the lifecycle facade needs from a discovery backend.
///
/// Implementations are shared behind an `Arc` and must tolerate concurrent
/// calls, even though the facade itself issues them sequentially.
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    async fn register(&self, registration: &ServiceRegistration) -> Result<(), BackendError>;
    async fn deregister(&self, service_id: &str) -> Result<(), BackendError>;
    async fn report_health(
        &self,
        service_id: &str,
        signal: &HealthSignal,
    ) -> Result<(), BackendError>;
}

/// Backend used when discovery is disabled: accepts everything, sends nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

#[async_trait]
impl RegistryBackend for NoopBackend {
    async fn register(&self, registration: &ServiceRegistration) -> Result<(), BackendError> {
        tracing::debug!("discovery disabled, not registering {}", registration.id);
        Ok(())
    }

    async fn deregister(&self, service_id: &str) -> Result<(), BackendError> {
        tracing::debug!("discovery disabled, not deregistering {}", service_id);
        Ok(())
    }

    async fn report_health(
        &self,
        _service_id: &str,
        _signal: &HealthSignal,
    ) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Render a duration the way the registry parses it, e.g. `5s` or `250ms`.
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_signal_messages() {
        assert_eq!(HealthSignal::Passing.message(), "");
        assert!(HealthSignal::Passing.is_passing());

        let failing = HealthSignal::Failing("connection refused".to_owned());
        assert_eq!(failing.message(), "connection refused");
        assert!(!failing.is_passing());
        assert_eq!(failing.to_string(), "failing: connection refused");
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
    }

    #[tokio::test]
    async fn noop_backend_accepts_everything() {
        let backend = NoopBackend;
        let registration = ServiceRegistration {
            name: "api".to_owned(),
            id: "api-1".to_owned(),
            port: 8080,
            tags: vec![],
            check: None,
        };

        assert!(backend.register(&registration).await.is_ok());
        assert!(backend
            .report_health("api-1", &HealthSignal::Failing("down".to_owned()))
            .await
            .is_ok());
        assert!(backend.deregister("api-1").await.is_ok());
    }
}
