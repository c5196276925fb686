use std::fmt;
use std::net::SocketAddr;
use std::num::ParseIntError;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while turning local configuration into a service identity.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("can't parse service port: no ':' found in listen address {0:?}")]
    MissingPort(String),
    #[error("can't parse service port from listen address {address:?}: {source}")]
    InvalidPort {
        address: String,
        source: ParseIntError,
    },
    #[error("health check interval {interval:?} must be shorter than the check TTL {ttl:?}")]
    HealthCheckInterval { interval: Duration, ttl: Duration },
}

/// Errors returned by a registry backend for a single call.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("registry rejected the request with {status}: {body}")]
    Rejected {
        status: http::StatusCode,
        body: String,
    },
    #[error("invalid registry address: {0}")]
    InvalidAddress(#[from] url::ParseError),
}

/// The registry-facing operations of the lifecycle facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Register,
    Deregister,
    HealthCheck,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Register => "register",
            Operation::Deregister => "deregister",
            Operation::HealthCheck => "health_check",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors surfaced by the lifecycle facade. Never retried locally.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{operation} failed for service {service_id}: {source}")]
    Backend {
        operation: Operation,
        service_id: String,
        source: BackendError,
    },
    #[error("metrics service id {0} is already used by the primary service")]
    DuplicateServiceId(String),
}

impl RegistryError {
    pub fn service_id(&self) -> &str {
        match self {
            RegistryError::Backend { service_id, .. } => service_id,
            RegistryError::DuplicateServiceId(service_id) => service_id,
        }
    }
}

/// Terminal outcomes of the metrics listener task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricsError {
    #[error("fail start http prometheus interface on {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },
    #[error("http prometheus interface on {addr} stopped serving: {reason}")]
    Serve { addr: SocketAddr, reason: String },
    #[error("metrics listener was shut down")]
    Shutdown,
    #[error("metrics listener task ended without reporting its outcome")]
    Vanished,
}
