use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use service_discovery::consul::ConsulConfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "LISTEN_ADDRESS", default = "0.0.0.0:3300")]
    pub listen_address: String,

    #[envconfig(from = "SERVICE_NAME")]
    pub service_name: String,

    #[envconfig(from = "SERVICE_ID")]
    pub service_id: Option<String>,

    #[envconfig(from = "SERVICE_TAGS", default = "")]
    pub service_tags: CommaSeparated,

    #[envconfig(from = "SERVICE_VERSION", default = "")]
    pub service_version: String,

    #[envconfig(from = "MONITOR_PORT", default = "9100")]
    pub monitor_port: u16,

    #[envconfig(from = "METRICS_SERVICE_ID")]
    pub metrics_service_id: Option<String>,

    #[envconfig(from = "HEALTH_CHECK_INTERVAL_MS", default = "2000")]
    pub health_check_interval: EnvMsDuration,

    /// Refuse to start when no port can be read from the listen address.
    #[envconfig(from = "REQUIRE_SERVICE_PORT", default = "true")]
    pub require_service_port: bool,

    #[envconfig(nested = true)]
    pub consul: ConsulConfig,
}

impl Config {
    /// The registration id, defaulting to the service name.
    pub fn service_id(&self) -> &str {
        self.service_id.as_deref().unwrap_or(&self.service_name)
    }

    pub fn metrics_service_id(&self) -> String {
        match &self.metrics_service_id {
            Some(id) => id.clone(),
            None => format!("{}-prom", self.service_id()),
        }
    }

    pub fn tags(&self) -> Vec<String> {
        self.service_tags.0.clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

/// A comma separated list, blanks dropped, order kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommaSeparated(pub Vec<String>);

impl FromStr for CommaSeparated {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CommaSeparated(
            s.split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = Config::init_from_hashmap(&env(&[("SERVICE_NAME", "billing")])).unwrap();

        assert_eq!(config.listen_address, "0.0.0.0:3300");
        assert_eq!(config.service_id(), "billing");
        assert_eq!(config.metrics_service_id(), "billing-prom");
        assert!(config.tags().is_empty());
        assert_eq!(config.service_version, "");
        assert_eq!(config.monitor_port, 9100);
        assert_eq!(
            config.health_check_interval.0,
            time::Duration::from_millis(2000)
        );
        assert!(config.require_service_port);
        assert_eq!(config.consul.address, "127.0.0.1:8500");
        assert_eq!(config.consul.token, None);
    }

    #[test]
    fn overrides() {
        let config = Config::init_from_hashmap(&env(&[
            ("SERVICE_NAME", "billing"),
            ("SERVICE_ID", "billing-7"),
            ("SERVICE_TAGS", "api, eu-west ,,canary"),
            ("SERVICE_VERSION", "v1.2.0"),
            ("METRICS_SERVICE_ID", "billing-metrics"),
            ("HEALTH_CHECK_INTERVAL_MS", "1500"),
            ("REQUIRE_SERVICE_PORT", "false"),
            ("CONSUL_HTTP_ADDR", "consul.internal:8500"),
            ("CONSUL_HTTP_TOKEN", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.service_id(), "billing-7");
        assert_eq!(config.metrics_service_id(), "billing-metrics");
        assert_eq!(config.tags(), vec!["api", "eu-west", "canary"]);
        assert_eq!(
            config.health_check_interval.0,
            time::Duration::from_millis(1500)
        );
        assert!(!config.require_service_port);
        assert_eq!(config.consul.address, "consul.internal:8500");
        assert_eq!(config.consul.token.as_deref(), Some("secret"));
    }

    #[test]
    fn service_name_is_required() {
        assert!(Config::init_from_hashmap(&env(&[])).is_err());
    }

    #[test]
    fn parse_ms_duration() {
        assert_eq!(
            "250".parse::<EnvMsDuration>().unwrap().0,
            time::Duration::from_millis(250)
        );
        assert_eq!(
            "two seconds".parse::<EnvMsDuration>().unwrap_err(),
            ParseEnvMsDurationError
        );
    }
}
