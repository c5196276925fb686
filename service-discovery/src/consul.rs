//! Registry backend speaking the Consul agent HTTP API.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use envconfig::Envconfig;
use reqwest::RequestBuilder;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::backend::{
    format_duration, HealthCheck, HealthSignal, NoopBackend, RegistryBackend, ServiceRegistration,
};
use crate::error::BackendError;

const TOKEN_HEADER: &str = "X-Consul-Token";
const PASSING_NOTE: &str = "ok";

#[derive(Envconfig, Clone, Debug)]
pub struct ConsulConfig {
    #[envconfig(from = "CONSUL_HTTP_ADDR", default = "127.0.0.1:8500")]
    pub address: String,

    #[envconfig(from = "CONSUL_HTTP_TOKEN")]
    pub token: Option<String>,

    #[envconfig(from = "CONSUL_HTTP_SSL", default = "false")]
    pub ssl: bool,

    #[envconfig(from = "CONSUL_REQUEST_TIMEOUT_MS", default = "5000")]
    pub request_timeout_ms: u64,
}

impl ConsulConfig {
    /// The agent base url. A bare `host:port` gets a scheme picked from `ssl`.
    pub fn base_url(&self) -> Result<Url, BackendError> {
        let address = if self.address.contains("://") {
            self.address.clone()
        } else {
            let scheme = if self.ssl { "https" } else { "http" };
            format!("{}://{}", scheme, self.address)
        };

        let url = Url::parse(&address)?;
        if url.cannot_be_a_base() {
            return Err(BackendError::InvalidAddress(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }
        Ok(url)
    }
}

/// Build the backend matching the enablement flag: Consul when enabled, a
/// backend that does nothing otherwise.
pub fn backend(
    enabled: bool,
    config: &ConsulConfig,
) -> Result<Arc<dyn RegistryBackend>, BackendError> {
    if !enabled {
        return Ok(Arc::new(NoopBackend));
    }

    Ok(Arc::new(ConsulClient::new(config)?))
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    name: &'a str,
    #[serde(rename = "ID")]
    id: &'a str,
    port: u16,
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    check: Option<AgentServiceCheck>,
}

#[derive(Serialize, Default)]
struct AgentServiceCheck {
    #[serde(rename = "HTTP", skip_serializing_if = "Option::is_none")]
    http: Option<String>,
    #[serde(rename = "Interval", skip_serializing_if = "Option::is_none")]
    interval: Option<String>,
    #[serde(rename = "TTL", skip_serializing_if = "Option::is_none")]
    ttl: Option<String>,
}

impl From<&HealthCheck> for AgentServiceCheck {
    fn from(check: &HealthCheck) -> Self {
        match check {
            HealthCheck::Ttl(ttl) => AgentServiceCheck {
                ttl: Some(format_duration(*ttl)),
                ..Default::default()
            },
            HealthCheck::Http { url, interval } => AgentServiceCheck {
                http: Some(url.clone()),
                interval: Some(format_duration(*interval)),
                ..Default::default()
            },
        }
    }
}

impl<'a> From<&'a ServiceRegistration> for AgentServiceRegistration<'a> {
    fn from(registration: &'a ServiceRegistration) -> Self {
        AgentServiceRegistration {
            name: &registration.name,
            id: &registration.id,
            port: registration.port,
            tags: &registration.tags,
            check: registration.check.as_ref().map(AgentServiceCheck::from),
        }
    }
}

pub struct ConsulClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl ConsulClient {
    pub fn new(config: &ConsulConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url()?,
            token: config.token.clone().filter(|token| !token.is_empty()),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // base_url is validated as a base url when the client is built.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<(), BackendError> {
        let request = match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Rejected { status, body })
    }
}

#[async_trait]
impl RegistryBackend for ConsulClient {
    async fn register(&self, registration: &ServiceRegistration) -> Result<(), BackendError> {
        let url = self.endpoint(&["v1", "agent", "service", "register"]);
        debug!("registering {} at {}", registration.id, url);

        let body = AgentServiceRegistration::from(registration);
        self.send(self.client.put(url).json(&body)).await
    }

    async fn deregister(&self, service_id: &str) -> Result<(), BackendError> {
        let url = self.endpoint(&["v1", "agent", "service", "deregister", service_id]);
        debug!("deregistering {} at {}", service_id, url);

        self.send(self.client.put(url)).await
    }

    async fn report_health(
        &self,
        service_id: &str,
        signal: &HealthSignal,
    ) -> Result<(), BackendError> {
        let check_id = format!("service:{}", service_id);
        let (action, note) = match signal {
            HealthSignal::Passing => ("pass", PASSING_NOTE),
            HealthSignal::Failing(message) => ("fail", message.as_str()),
        };
        let url = self.endpoint(&["v1", "agent", "check", action, &check_id]);

        self.send(self.client.put(url).query(&[("note", note)])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(address: &str) -> ConsulConfig {
        ConsulConfig {
            address: address.to_owned(),
            token: None,
            ssl: false,
            request_timeout_ms: 1000,
        }
    }

    #[test]
    fn base_url_adds_scheme() {
        let url = config("127.0.0.1:8500").base_url().unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8500/");

        let mut ssl = config("consul.internal:8501");
        ssl.ssl = true;
        assert_eq!(
            ssl.base_url().unwrap().as_str(),
            "https://consul.internal:8501/"
        );
    }

    #[test]
    fn base_url_keeps_explicit_scheme() {
        let url = config("https://consul.internal/prefix").base_url().unwrap();
        assert_eq!(url.as_str(), "https://consul.internal/prefix");
    }

    #[test]
    fn base_url_rejects_garbage() {
        assert!(matches!(
            config("http://[::1").base_url(),
            Err(BackendError::InvalidAddress(_))
        ));
    }

    #[test]
    fn endpoints_are_appended_to_base_path() {
        let client = ConsulClient::new(&config("https://consul.internal/prefix/")).unwrap();
        assert_eq!(
            client
                .endpoint(&["v1", "agent", "check", "pass", "service:api-1"])
                .as_str(),
            "https://consul.internal/prefix/v1/agent/check/pass/service:api-1"
        );
    }

    #[test]
    fn ttl_check_serialization() {
        let registration = ServiceRegistration {
            name: "api".to_owned(),
            id: "api-1".to_owned(),
            port: 8080,
            tags: vec!["a".to_owned(), "v1".to_owned()],
            check: Some(HealthCheck::Ttl(Duration::from_secs(5))),
        };

        let json = serde_json::to_value(AgentServiceRegistration::from(&registration)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Name": "api",
                "ID": "api-1",
                "Port": 8080,
                "Tags": ["a", "v1"],
                "Check": {"TTL": "5s"},
            })
        );
    }

    #[test]
    fn registration_without_check_omits_it() {
        let registration = ServiceRegistration {
            name: "api".to_owned(),
            id: "api-prom".to_owned(),
            port: 9100,
            tags: vec!["prom".to_owned()],
            check: None,
        };

        let json = serde_json::to_value(AgentServiceRegistration::from(&registration)).unwrap();
        assert!(json.get("Check").is_none());
    }

    #[test]
    fn http_check_serialization() {
        let check = AgentServiceCheck::from(&HealthCheck::Http {
            url: "http://localhost:8080/health".to_owned(),
            interval: Duration::from_secs(10),
        });

        assert_eq!(
            serde_json::to_value(check).unwrap(),
            serde_json::json!({"HTTP": "http://localhost:8080/health", "Interval": "10s"})
        );
    }

    #[test]
    fn disabled_factory_returns_noop() {
        // An unusable address is fine: nothing is built when disabled.
        assert!(backend(false, &config("http://[::1")).is_ok());
        assert!(backend(true, &config("http://[::1")).is_err());
    }
}
